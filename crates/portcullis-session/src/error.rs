//! Error types for session cache operations.

use crate::store::StoreError;

/// Error type for session cache operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Session was not found, or was found but has expired.
    #[error("Session not found: {0}")]
    NotFound(String),

    /// Stored bytes could not be decoded into a session record.
    #[error("Malformed session record: {0}")]
    MalformedRecord(String),

    /// Error from the store backend (I/O, capacity, lock timeout).
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// A record could not be encoded for storage.
    #[error("Encode error: {0}")]
    Encode(String),
}

impl Error {
    /// Whether this error means "no usable session" rather than a failure.
    pub fn is_not_found(&self) -> bool {
        matches!(self, Error::NotFound(_))
    }
}

/// Result type for session cache operations.
pub type Result<T> = std::result::Result<T, Error>;
