//! Configuration for the session cache.

use std::time::Duration;

/// Default maximum encoded size of one session entry.
pub const DEFAULT_MAX_ENTRY_SIZE: usize = 65_536;

/// Default bound on waiting for the store lock.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Default lifetime of a new session (24 hours).
pub const DEFAULT_SESSION_LENGTH: Duration = Duration::from_secs(86_400);

/// Configuration for the session cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Entity id of this service provider, substituted for missing
    /// name qualifiers before identity keys are derived.
    pub sp_entity_id: String,

    /// Lifetime given to placeholder sessions.
    pub session_length: Duration,

    /// How long a writer waits for the store lock before giving up.
    pub lock_timeout: Duration,

    /// Largest encoded record the cache will write.
    pub max_entry_size: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            sp_entity_id: String::new(),
            session_length: DEFAULT_SESSION_LENGTH,
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            max_entry_size: DEFAULT_MAX_ENTRY_SIZE,
        }
    }
}

impl CacheConfig {
    /// Create a new configuration with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Set the service provider entity id.
    pub fn with_sp_entity_id(mut self, entity_id: impl Into<String>) -> Self {
        self.sp_entity_id = entity_id.into();
        self
    }

    /// Set the lifetime of placeholder sessions.
    pub fn with_session_length(mut self, length: Duration) -> Self {
        self.session_length = length;
        self
    }

    /// Set the lock acquisition timeout.
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    /// Set the maximum encoded entry size.
    pub fn with_max_entry_size(mut self, size: usize) -> Self {
        self.max_entry_size = size;
        self
    }
}
