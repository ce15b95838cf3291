//! Error types for the core crate
//!
//! Covers configuration loading and value parsing. Component-specific
//! failures (schema, metric, contract) live in their own crates.

use thiserror::Error;

/// Main error type for core operations
#[derive(Error, Debug)]
pub enum CoreError {
    /// Configuration file could not be read
    #[error("File error: {0}")]
    FileError(String),

    /// Configuration content could not be parsed
    #[error("Parse error: {0}")]
    ParseError(String),

    /// Configuration parsed but is semantically invalid
    #[error("Invalid configuration: {0}")]
    InvalidConfig(String),

    /// A textual value could not be interpreted
    #[error("Invalid value: {0}")]
    InvalidValue(String),

    /// Prometheus registry error
    #[error("Metrics error: {0}")]
    MetricsError(#[from] prometheus::Error),
}

impl CoreError {
    /// Create an invalid configuration error
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        CoreError::InvalidConfig(msg.into())
    }

    /// Create an invalid value error
    pub fn invalid_value(msg: impl Into<String>) -> Self {
        CoreError::InvalidValue(msg.into())
    }

    /// Check if this error was caused by user-supplied input
    pub fn is_user_error(&self) -> bool {
        matches!(
            self,
            CoreError::FileError(_)
                | CoreError::ParseError(_)
                | CoreError::InvalidConfig(_)
                | CoreError::InvalidValue(_)
        )
    }
}

impl From<std::io::Error> for CoreError {
    fn from(err: std::io::Error) -> Self {
        CoreError::FileError(err.to_string())
    }
}

impl From<serde_json::Error> for CoreError {
    fn from(err: serde_json::Error) -> Self {
        CoreError::ParseError(format!("JSON error: {}", err))
    }
}

impl From<serde_yaml::Error> for CoreError {
    fn from(err: serde_yaml::Error) -> Self {
        CoreError::ParseError(format!("YAML error: {}", err))
    }
}

impl From<toml::de::Error> for CoreError {
    fn from(err: toml::de::Error) -> Self {
        CoreError::ParseError(format!("TOML error: {}", err))
    }
}

/// Result type alias for core operations
pub type Result<T> = std::result::Result<T, CoreError>;
