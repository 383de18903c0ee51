//! Configuration error types.

use portcullis_authz::ConditionError;

/// Result type alias for config operations.
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur while loading or validating configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read a config file.
    #[error("failed to read config file '{path}': {source}")]
    ReadFile {
        path: String,
        source: std::io::Error,
    },

    /// Failed to parse TOML.
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Missing required field.
    #[error("missing required field '{field}' in {context}")]
    MissingField { field: String, context: String },

    /// A field holds a value that cannot be used.
    #[error("invalid value for '{field}': {reason}")]
    Invalid { field: String, reason: String },

    /// A `[[rule]]` entry does not build a valid condition.
    #[error("rule #{index}: {source}")]
    Rule {
        index: usize,
        source: ConditionError,
    },
}
