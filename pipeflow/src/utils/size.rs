//! Human-readable byte sizes such as `30MB`.

use crate::errors::ConfigurationError;

const KB: u64 = 1024;
const MB: u64 = KB * 1024;
const GB: u64 = MB * 1024;

/// Parses a size like `512`, `64KB`, `30MB` or `1GB` into bytes.
///
/// Units are binary multiples and case-insensitive; a trailing `B` is optional.
///
/// # Errors
///
/// Returns a [`ConfigurationError`] if the value is not a valid size.
pub fn parse_size(value: &str) -> Result<u64, ConfigurationError> {
    let trimmed = value.trim();
    let upper = trimmed.to_ascii_uppercase();
    let split = upper
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(upper.len());
    let (digits, unit) = upper.split_at(split);

    let number: u64 = digits
        .parse()
        .map_err(|_| ConfigurationError::new(format!("invalid size [{trimmed}]")))?;

    let multiplier = match unit.trim() {
        "" | "B" => 1,
        "K" | "KB" => KB,
        "M" | "MB" => MB,
        "G" | "GB" => GB,
        other => {
            return Err(ConfigurationError::new(format!(
                "invalid size unit [{other}] in [{trimmed}]"
            )))
        }
    };

    number
        .checked_mul(multiplier)
        .ok_or_else(|| ConfigurationError::new(format!("size [{trimmed}] is too large")))
}

/// Formats a byte count with the largest unit that divides it.
#[must_use]
pub fn format_size(bytes: u64) -> String {
    match bytes {
        0 => "0B".to_string(),
        b if b % GB == 0 => format!("{}GB", b / GB),
        b if b % MB == 0 => format!("{}MB", b / MB),
        b if b % KB == 0 => format!("{}KB", b / KB),
        b => format!("{b}B"),
    }
}
