//! Configuration errors

use std::path::PathBuf;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Configuration error
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// File could not be read
    #[error("failed to read config file {path}: {source}")]
    Io {
        /// Offending path
        path: PathBuf,
        /// Underlying error
        #[source]
        source: std::io::Error,
    },

    /// File extension is not a known format
    #[error("unsupported config format: {0}")]
    UnsupportedFormat(String),

    /// Document could not be parsed
    #[error("failed to parse {format}: {message}")]
    Parse {
        /// Format being parsed
        format: &'static str,
        /// Parser message
        message: String,
    },

    /// `${VAR}` without a default and the variable is unset
    #[error("environment variable '{0}' not set and no default provided")]
    UnsetVariable(String),

    /// Configuration failed validation
    #[error("invalid configuration: {0}")]
    Invalid(String),

    /// Nothing to load
    #[error("no configuration files provided")]
    Empty,
}

impl ConfigError {
    /// Create a validation error
    pub fn invalid(message: impl Into<String>) -> Self {
        ConfigError::Invalid(message.into())
    }
}
