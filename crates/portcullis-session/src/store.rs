//! Store adapter contract and an in-process implementation.
//!
//! The session cache is decoupled from the physical storage through the
//! [`StoreAdapter`] trait: a key/value byte store with per-entry TTL plus one
//! process-wide lock. Whether the backend is shared memory, a distributed
//! cache or disk is the host's business.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::{Condvar, Mutex};
use tracing::{debug, trace};

use crate::expiry::{Clock, SystemClock};

/// Errors raised by a store backend.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Backend I/O or protocol failure.
    #[error("backend failure: {0}")]
    Backend(String),

    /// The store lock could not be acquired in time.
    #[error("timed out after {0:?} waiting for the store lock")]
    LockTimeout(Duration),

    /// The entry exceeds what the backend accepts.
    #[error("entry of {size} bytes exceeds the backend limit of {max} bytes")]
    EntryTooLarge { size: usize, max: usize },

    /// The backend has no room for another entry.
    #[error("store is full ({capacity} entries)")]
    Full { capacity: usize },
}

/// Result type for store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;

/// Contract over the host's shared key/value store.
///
/// Single-key reads must be at least snapshot consistent. The lock guards
/// writers only; readers never take it.
pub trait StoreAdapter: Send + Sync {
    /// Write `value` under `key`, to be evicted after `ttl`.
    fn put(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()>;

    /// Read the value under `key`, if present and not evicted.
    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Remove `key`. Removing an absent key is not an error.
    fn delete(&self, key: &str) -> StoreResult<()>;

    /// Acquire the process-wide store lock, waiting at most `timeout`.
    fn acquire(&self, timeout: Duration) -> StoreResult<()>;

    /// Release the store lock.
    fn release(&self);
}

impl<S: StoreAdapter + ?Sized> StoreAdapter for Arc<S> {
    fn put(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        (**self).put(key, value, ttl)
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        (**self).get(key)
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        (**self).delete(key)
    }

    fn acquire(&self, timeout: Duration) -> StoreResult<()> {
        (**self).acquire(timeout)
    }

    fn release(&self) {
        (**self).release()
    }
}

/// Entry stored in the in-memory map.
#[derive(Debug, Clone)]
struct MemoryEntry {
    value: Vec<u8>,
    expires_at: DateTime<Utc>,
}

/// In-process [`StoreAdapter`] for tests and single-process hosts.
pub struct MemoryStore {
    entries: Mutex<HashMap<String, MemoryEntry>>,
    held: Mutex<bool>,
    released: Condvar,
    clock: Arc<dyn Clock>,
    capacity: Option<usize>,
    max_value_size: Option<usize>,
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::with_clock(Arc::new(SystemClock))
    }
}

impl MemoryStore {
    /// Create an empty store reading time from `clock`.
    pub fn with_clock(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: Mutex::new(HashMap::new()),
            held: Mutex::new(false),
            released: Condvar::new(),
            clock,
            capacity: None,
            max_value_size: None,
        }
    }

    /// Limit the number of live entries.
    pub fn with_capacity_limit(mut self, capacity: usize) -> Self {
        self.capacity = Some(capacity);
        self
    }

    /// Limit the size of one value.
    pub fn with_max_value_size(mut self, size: usize) -> Self {
        self.max_value_size = Some(size);
        self
    }

    /// Number of live (unexpired) entries.
    pub fn len(&self) -> usize {
        let now = self.clock.now();
        self.entries
            .lock()
            .values()
            .filter(|e| e.expires_at > now)
            .count()
    }

    /// Whether there are no live entries.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether the store lock is currently held.
    pub fn is_locked(&self) -> bool {
        *self.held.lock()
    }

    /// Drop every entry whose TTL has run out. Returns how many were dropped.
    ///
    /// This is the out-of-band sweep a host runs periodically; reads already
    /// ignore expired entries.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut entries = self.entries.lock();
        let before = entries.len();
        entries.retain(|_, e| e.expires_at > now);
        let purged = before - entries.len();
        if purged > 0 {
            debug!(count = purged, "Purged expired store entries");
        }
        purged
    }
}

impl StoreAdapter for MemoryStore {
    fn put(&self, key: &str, value: &[u8], ttl: Duration) -> StoreResult<()> {
        if let Some(max) = self.max_value_size
            && value.len() > max
        {
            return Err(StoreError::EntryTooLarge {
                size: value.len(),
                max,
            });
        }

        let now = self.clock.now();
        let ttl = chrono::Duration::from_std(ttl)
            .map_err(|e| StoreError::Backend(format!("invalid ttl: {e}")))?;
        let expires_at = now.checked_add_signed(ttl).unwrap_or(DateTime::<Utc>::MAX_UTC);

        let mut entries = self.entries.lock();
        if let Some(capacity) = self.capacity
            && !entries.contains_key(key)
        {
            entries.retain(|_, e| e.expires_at > now);
            if entries.len() >= capacity {
                return Err(StoreError::Full { capacity });
            }
        }

        entries.insert(
            key.to_string(),
            MemoryEntry {
                value: value.to_vec(),
                expires_at,
            },
        );
        trace!(key = %key, bytes = value.len(), "Stored entry");
        Ok(())
    }

    fn get(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        let now = self.clock.now();
        let entries = self.entries.lock();
        Ok(entries
            .get(key)
            .filter(|e| e.expires_at > now)
            .map(|e| e.value.clone()))
    }

    fn delete(&self, key: &str) -> StoreResult<()> {
        self.entries.lock().remove(key);
        Ok(())
    }

    fn acquire(&self, timeout: Duration) -> StoreResult<()> {
        let deadline = std::time::Instant::now() + timeout;
        let mut held = self.held.lock();
        while *held {
            if self.released.wait_until(&mut held, deadline).timed_out() && *held {
                return Err(StoreError::LockTimeout(timeout));
            }
        }
        *held = true;
        Ok(())
    }

    fn release(&self) {
        let mut held = self.held.lock();
        *held = false;
        self.released.notify_one();
    }
}
