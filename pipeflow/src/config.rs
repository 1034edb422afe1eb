//! Engine-wide configuration.

use serde::{Deserialize, Deserializer, Serialize};
use std::time::Duration;

use crate::errors::ConfigurationError;
use crate::utils::parse_size;

/// Prefix of the environment variables read by [`EngineConfig::from_env`].
pub const ENV_PREFIX: &str = "PIPEFLOW_";

/// Settings shared by every pipeline an engine runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Log the message passed to every pipe at info level.
    #[serde(default)]
    pub log_intermediary_results: bool,
    /// Messages larger than this many bytes are reported.
    #[serde(default = "default_message_size_warn", deserialize_with = "deserialize_size")]
    pub message_size_warn: u64,
    /// Record input and output size distributions for every pipe.
    #[serde(default)]
    pub size_statistics: bool,
    /// Timeout for transactions that do not declare one, in seconds.
    #[serde(default)]
    pub default_transaction_timeout_seconds: Option<u64>,
}

fn default_message_size_warn() -> u64 {
    30 * 1024 * 1024 // 30MB
}

fn deserialize_size<'de, D>(deserializer: D) -> Result<u64, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Size {
        Bytes(u64),
        Text(String),
    }

    match Size::deserialize(deserializer)? {
        Size::Bytes(bytes) => Ok(bytes),
        Size::Text(text) => parse_size(&text).map_err(serde::de::Error::custom),
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            log_intermediary_results: false,
            message_size_warn: default_message_size_warn(),
            size_statistics: false,
            default_transaction_timeout_seconds: None,
        }
    }
}

impl EngineConfig {
    /// Creates a configuration with defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Parses a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or a size cannot be parsed.
    pub fn from_json(json: &str) -> Result<Self, ConfigurationError> {
        serde_json::from_str(json)
            .map_err(|e| ConfigurationError::new(format!("invalid engine configuration: {e}")))
    }

    /// Reads overrides from `PIPEFLOW_*` environment variables on top of the defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to an invalid value.
    pub fn from_env() -> Result<Self, ConfigurationError> {
        Self::default().with_overrides(|key| std::env::var(key).ok())
    }

    /// Applies overrides from a lookup function, keyed by full variable name.
    ///
    /// # Errors
    ///
    /// Returns an error if a value cannot be parsed.
    pub fn with_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigurationError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let var = |name: &str| lookup(&format!("{ENV_PREFIX}{name}"));

        if let Some(value) = var("LOG_INTERMEDIARY_RESULTS") {
            self.log_intermediary_results = parse_bool("LOG_INTERMEDIARY_RESULTS", &value)?;
        }
        if let Some(value) = var("MESSAGE_SIZE_WARN") {
            self.message_size_warn = parse_size(&value)?;
        }
        if let Some(value) = var("SIZE_STATISTICS") {
            self.size_statistics = parse_bool("SIZE_STATISTICS", &value)?;
        }
        if let Some(value) = var("DEFAULT_TRANSACTION_TIMEOUT") {
            let seconds = value.trim().parse::<u64>().map_err(|_| {
                ConfigurationError::new(format!(
                    "{ENV_PREFIX}DEFAULT_TRANSACTION_TIMEOUT must be a number of seconds, got [{value}]"
                ))
            })?;
            self.default_transaction_timeout_seconds = (seconds > 0).then_some(seconds);
        }
        Ok(self)
    }

    /// Enables logging of intermediary results.
    #[must_use]
    pub fn with_log_intermediary_results(mut self, enabled: bool) -> Self {
        self.log_intermediary_results = enabled;
        self
    }

    /// Sets the message size warning threshold in bytes.
    #[must_use]
    pub fn with_message_size_warn(mut self, bytes: u64) -> Self {
        self.message_size_warn = bytes;
        self
    }

    /// Enables size statistics for all pipes.
    #[must_use]
    pub fn with_size_statistics(mut self, enabled: bool) -> Self {
        self.size_statistics = enabled;
        self
    }

    /// Sets the default transaction timeout.
    #[must_use]
    pub fn with_default_transaction_timeout(mut self, timeout: Duration) -> Self {
        self.default_transaction_timeout_seconds = Some(timeout.as_secs());
        self
    }

    /// Returns the default transaction timeout.
    #[must_use]
    pub fn default_transaction_timeout(&self) -> Option<Duration> {
        self.default_transaction_timeout_seconds
            .map(Duration::from_secs)
    }
}

fn parse_bool(name: &str, value: &str) -> Result<bool, ConfigurationError> {
    match value.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Ok(true),
        "0" | "false" | "no" | "off" => Ok(false),
        _ => Err(ConfigurationError::new(format!(
            "{ENV_PREFIX}{name} must be a boolean, got [{value}]"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_defaults() {
        let config = EngineConfig::default();
        assert!(!config.log_intermediary_results);
        assert_eq!(config.message_size_warn, 30 * 1024 * 1024);
        assert!(!config.size_statistics);
        assert_eq!(config.default_transaction_timeout(), None);
    }

    #[test]
    fn test_from_json_with_size_string() {
        let config = EngineConfig::from_json(
            r#"{"message_size_warn": "1KB", "size_statistics": true, "default_transaction_timeout_seconds": 5}"#,
        )
        .unwrap();

        assert_eq!(config.message_size_warn, 1024);
        assert!(config.size_statistics);
        assert_eq!(config.default_transaction_timeout(), Some(Duration::from_secs(5)));
    }

    #[test]
    fn test_from_json_with_size_number() {
        let config = EngineConfig::from_json(r#"{"message_size_warn": 10}"#).unwrap();
        assert_eq!(config.message_size_warn, 10);
    }

    #[test]
    fn test_from_json_rejects_bad_size() {
        assert!(EngineConfig::from_json(r#"{"message_size_warn": "lots"}"#).is_err());
    }

    #[test]
    fn test_overrides() {
        let vars: HashMap<&str, &str> = [
            ("PIPEFLOW_LOG_INTERMEDIARY_RESULTS", "true"),
            ("PIPEFLOW_MESSAGE_SIZE_WARN", "2MB"),
            ("PIPEFLOW_DEFAULT_TRANSACTION_TIMEOUT", "30"),
        ]
        .into_iter()
        .collect();

        let config = EngineConfig::default()
            .with_overrides(|k| vars.get(k).map(|v| (*v).to_string()))
            .unwrap();

        assert!(config.log_intermediary_results);
        assert_eq!(config.message_size_warn, 2 * 1024 * 1024);
        assert_eq!(config.default_transaction_timeout(), Some(Duration::from_secs(30)));
        assert!(!config.size_statistics);
    }

    #[test]
    fn test_overrides_reject_invalid_bool() {
        let result = EngineConfig::default().with_overrides(|k| {
            (k == "PIPEFLOW_SIZE_STATISTICS").then(|| "maybe".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_builders() {
        let config = EngineConfig::new()
            .with_log_intermediary_results(true)
            .with_message_size_warn(100)
            .with_size_statistics(true)
            .with_default_transaction_timeout(Duration::from_secs(3));

        assert!(config.log_intermediary_results);
        assert_eq!(config.message_size_warn, 100);
        assert_eq!(config.default_transaction_timeout_seconds, Some(3));
    }
}
