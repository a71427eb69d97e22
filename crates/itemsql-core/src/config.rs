//! Engine configuration

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Limits and settings shared by tables and the select executor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    /// Maximum number of rows a single join may produce
    pub max_join_rows: usize,

    /// Maximum number of rows a select may return (unlimited if None)
    pub max_result_rows: Option<usize>,

    /// Log level used when RUST_LOG is not set
    pub log_level: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            max_join_rows: 1_000_000,
            max_result_rows: None,
            log_level: "info".to_string(),
        }
    }
}

impl EngineConfig {
    /// Create a new configuration
    pub fn new() -> Self {
        Self::default()
    }

    /// Create configuration for development
    pub fn for_development() -> Self {
        Self {
            log_level: "debug".to_string(),
            ..Default::default()
        }
    }

    /// Create configuration for testing
    pub fn for_testing() -> Self {
        Self {
            max_join_rows: 10_000,
            max_result_rows: Some(10_000),
            log_level: "warn".to_string(),
        }
    }

    /// Set the join row limit
    pub fn with_max_join_rows(mut self, max_join_rows: usize) -> Self {
        self.max_join_rows = max_join_rows;
        self
    }

    /// Set the result row limit
    pub fn with_max_result_rows(mut self, max_result_rows: usize) -> Self {
        self.max_result_rows = Some(max_result_rows);
        self
    }

    /// Set the default log level
    pub fn with_log_level(mut self, log_level: impl Into<String>) -> Self {
        self.log_level = log_level.into();
        self
    }

    /// Check that the limits are usable
    pub fn validate(&self) -> Result<()> {
        if self.max_join_rows == 0 {
            return Err(Error::Configuration(
                "max_join_rows must be greater than zero".to_string(),
            ));
        }
        if self.max_result_rows == Some(0) {
            return Err(Error::Configuration(
                "max_result_rows must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }

    /// Parse and validate a JSON configuration
    pub fn from_json_str(json: &str) -> Result<Self> {
        let config: EngineConfig = serde_json::from_str(json)
            .map_err(|e| Error::Configuration(format!("Invalid configuration: {}", e)))?;
        config.validate()?;
        Ok(config)
    }

    /// Load and validate a JSON configuration file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        Self::from_json_str(&json)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_default_config() {
        let config = EngineConfig::default();
        assert_eq!(config.max_join_rows, 1_000_000);
        assert_eq!(config.max_result_rows, None);
        assert_eq!(config.log_level, "info");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_builder() {
        let config = EngineConfig::new()
            .with_max_join_rows(100)
            .with_max_result_rows(10)
            .with_log_level("trace");
        assert_eq!(config.max_join_rows, 100);
        assert_eq!(config.max_result_rows, Some(10));
        assert_eq!(config.log_level, "trace");
    }

    #[test]
    fn test_validate_rejects_zero_limits() {
        assert!(EngineConfig::new().with_max_join_rows(0).validate().is_err());
        assert!(EngineConfig::new().with_max_result_rows(0).validate().is_err());
    }

    #[test]
    fn test_from_json_str_fills_defaults() {
        let config = EngineConfig::from_json_str(r#"{"max_join_rows": 50}"#).unwrap();
        assert_eq!(config.max_join_rows, 50);
        assert_eq!(config.log_level, "info");

        let err = EngineConfig::from_json_str("{not json").unwrap_err();
        assert!(matches!(err, Error::Configuration(_)));
    }

    #[test]
    fn test_from_file() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, r#"{{"max_result_rows": 3, "log_level": "debug"}}"#).unwrap();

        let config = EngineConfig::from_file(file.path()).unwrap();
        assert_eq!(config.max_result_rows, Some(3));
        assert_eq!(config.log_level, "debug");

        let err = EngineConfig::from_file("/nonexistent/itemsql.json").unwrap_err();
        assert!(matches!(err, Error::Io(_)));
    }
}
