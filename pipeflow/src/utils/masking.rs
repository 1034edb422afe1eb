//! Masking of sensitive content in logged messages.

use regex::Regex;

/// Replaces every match of `pattern` in `text` with asterisks of the same length.
#[must_use]
pub fn hide(text: &str, pattern: &Regex) -> String {
    pattern
        .replace_all(text, |caps: &regex::Captures<'_>| "*".repeat(caps[0].chars().count()))
        .into_owned()
}

/// Masks `text` if a pattern is given, otherwise returns it unchanged.
#[must_use]
pub fn hide_opt(text: &str, pattern: Option<&Regex>) -> String {
    pattern.map_or_else(|| text.to_string(), |p| hide(text, p))
}
