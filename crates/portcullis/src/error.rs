//! Error types for the service provider facade.

use chrono::{DateTime, Utc};
use portcullis_config::ConfigError;

/// Result type alias for facade operations.
pub type Result<T> = std::result::Result<T, GateError>;

/// Errors from the service provider facade.
#[derive(Debug, thiserror::Error)]
pub enum GateError {
    /// Session cache failure.
    #[error(transparent)]
    Session(#[from] portcullis_session::Error),

    /// Configuration could not be used.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The assertion lacks something a session needs.
    #[error("assertion has no {0}")]
    IncompleteAssertion(&'static str),

    /// The assertion's SessionNotOnOrAfter is already in the past.
    #[error("assertion session ended at {0}")]
    AssertionExpired(DateTime<Utc>),

    /// The configured user attribute is not in the assertion.
    #[error("assertion has no value for user attribute '{0}'")]
    MissingUser(String),
}
