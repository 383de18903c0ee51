//! Session cache with dual-key indexing and expiry.

use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use tracing::{debug, trace, warn};

use crate::codec;
use crate::config::CacheConfig;
use crate::error::{Error, Result};
use crate::expiry::{Clock, SystemClock, ttl_until};
use crate::id::{SessionId, tokens_match};
use crate::record::{NameId, SessionRecord, identity_key, session_key};
use crate::store::{StoreAdapter, StoreResult};
use crate::time;

/// Holds the store lock for the lifetime of the guard.
struct LockGuard<'a, S: StoreAdapter + ?Sized> {
    store: &'a S,
}

impl<'a, S: StoreAdapter + ?Sized> LockGuard<'a, S> {
    fn acquire(store: &'a S, timeout: std::time::Duration) -> StoreResult<Self> {
        store.acquire(timeout)?;
        Ok(Self { store })
    }
}

impl<S: StoreAdapter + ?Sized> Drop for LockGuard<'_, S> {
    fn drop(&mut self) {
        self.store.release();
    }
}

/// Session cache over a [`StoreAdapter`].
///
/// Every record is written under two keys: its session id, and (once the
/// identity is known) a key derived from the normalized name-id and issuer.
/// Both writes happen inside one critical section on the store lock, so a
/// reader never sees one index updated without the other for longer than
/// the lock is held. Reads take no lock.
///
/// Expiry is only ever moved by [`update_expiry`](Self::update_expiry) and
/// [`update_idle_timeout`](Self::update_idle_timeout); reads never extend it.
pub struct SessionCache<S: StoreAdapter> {
    store: S,
    config: CacheConfig,
    clock: Arc<dyn Clock>,
}

impl<S: StoreAdapter> SessionCache<S> {
    /// Create a session cache over `store`.
    pub fn new(store: S, config: CacheConfig) -> Self {
        Self::with_clock(store, config, Arc::new(SystemClock))
    }

    /// Create a session cache reading time from `clock`.
    pub fn with_clock(store: S, config: CacheConfig, clock: Arc<dyn Clock>) -> Self {
        Self {
            store,
            config,
            clock,
        }
    }

    /// Get the cache configuration.
    pub fn config(&self) -> &CacheConfig {
        &self.config
    }

    /// The underlying store.
    pub fn backend(&self) -> &S {
        &self.store
    }

    /// Current time as seen by the cache.
    pub fn now(&self) -> DateTime<Utc> {
        self.clock.now()
    }

    /// Apply the name-qualifier normalization rule.
    pub fn normalize(&self, name_id: &NameId) -> NameId {
        name_id.clone().normalized(&self.config.sp_entity_id)
    }

    /// Create and store a placeholder session (not logged in).
    pub fn create_session(&self) -> Result<SessionRecord> {
        let length = Duration::from_std(self.config.session_length)
            .map_err(|e| Error::Encode(format!("session length out of range: {e}")))?;
        let record = SessionRecord::new(self.now() + length);
        self.store(&record)?;
        debug!(session_id = %record.session_id, "Created session");
        Ok(record)
    }

    /// Store a record under both of its keys.
    pub fn store(&self, record: &SessionRecord) -> Result<()> {
        let bytes = codec::encode(record)?;
        if bytes.len() > self.config.max_entry_size {
            return Err(Error::Encode(format!(
                "session state is {} bytes, limit is {}",
                bytes.len(),
                self.config.max_entry_size
            )));
        }

        let ttl = ttl_until(record.effective_expires(), self.now());
        let id_key = session_key(&record.session_id);
        let name_key = record
            .identity()
            .map(|(name_id, issuer)| identity_key(&self.normalize(name_id), &self.normalize(issuer)));

        {
            let _guard = LockGuard::acquire(&self.store, self.config.lock_timeout)?;
            self.store.put(&id_key, &bytes, ttl)?;
            if let Some(name_key) = &name_key {
                self.store.put(name_key, &bytes, ttl)?;
            }
        }

        trace!(
            session_id = %record.session_id,
            bytes = bytes.len(),
            ttl_secs = ttl.as_secs(),
            indexed_by_identity = name_key.is_some(),
            "Session stored"
        );
        Ok(())
    }

    /// Look a session up by its id.
    pub fn load_by_session_id(&self, session_id: &str) -> Result<SessionRecord> {
        let Some(id) = SessionId::from_hex(session_id) else {
            debug!("Malformed session id presented");
            return Err(Error::NotFound(session_id.to_string()));
        };
        let record = self.load_key(&session_key(&id), session_id)?;
        if record.session_id != id {
            warn!(session_id = %id, stored = %record.session_id, "Session entry stored under the wrong key");
            return Err(Error::NotFound(session_id.to_string()));
        }
        Ok(record)
    }

    /// Look a session up by id and check the cookie token bound to it.
    ///
    /// A mismatching token is reported as not found, so a copied or guessed
    /// session id alone is never enough.
    pub fn load_for_request(&self, session_id: &str, cookie_token: &str) -> Result<SessionRecord> {
        let record = self.load_by_session_id(session_id)?;
        if !tokens_match(&record.cookie_token, cookie_token) {
            warn!(session_id = %record.session_id, "Cookie token mismatch");
            return Err(Error::NotFound(session_id.to_string()));
        }
        Ok(record)
    }

    /// Look a session up by the name-id and issuer of its subject.
    pub fn load_by_identity(&self, name_id: &NameId, issuer: &NameId) -> Result<SessionRecord> {
        let name_id = self.normalize(name_id);
        let issuer = self.normalize(issuer);
        let label = format!("{name_id} ({issuer})");
        let record = self.load_key(&identity_key(&name_id, &issuer), &label)?;

        let matches = record.identity().is_some_and(|(n, i)| {
            self.normalize(n) == name_id && self.normalize(i) == issuer
        });
        if !matches {
            warn!(identity = %label, "Identity entry holds a different subject");
            return Err(Error::NotFound(label));
        }
        Ok(record)
    }

    /// Remove a session from both indices. Absent entries are not an error.
    pub fn delete(
        &self,
        session_id: &SessionId,
        name_id: Option<&NameId>,
        issuer: Option<&NameId>,
    ) -> Result<()> {
        let name_key = match (name_id, issuer) {
            (Some(n), Some(i)) => Some(identity_key(&self.normalize(n), &self.normalize(i))),
            _ => None,
        };

        let _guard = LockGuard::acquire(&self.store, self.config.lock_timeout)?;
        self.store.delete(&session_key(session_id))?;
        if let Some(name_key) = &name_key {
            self.unindex_identity(name_key, session_id)?;
        }
        debug!(session_id = %session_id, "Session deleted");
        Ok(())
    }

    /// Remove a record from both indices.
    pub fn delete_record(&self, record: &SessionRecord) -> Result<()> {
        self.delete(&record.session_id, record.name_id.as_ref(), record.issuer.as_ref())
    }

    /// Drop the identity index entry of `record`, leaving the session itself
    /// in place. Used when a session changes subject.
    pub fn release_identity(&self, record: &SessionRecord) -> Result<()> {
        let Some((name_id, issuer)) = record.identity() else {
            return Ok(());
        };
        let name_key = identity_key(&self.normalize(name_id), &self.normalize(issuer));

        let _guard = LockGuard::acquire(&self.store, self.config.lock_timeout)?;
        self.unindex_identity(&name_key, &record.session_id)?;
        Ok(())
    }

    /// Set a new absolute expiry and re-store the record.
    pub fn update_expiry(&self, record: &mut SessionRecord, new_expires: DateTime<Utc>) -> Result<()> {
        record.expires = time::clamp(new_expires);
        self.store(record)
    }

    /// Push the idle deadline to `now + seconds` and re-store the record.
    ///
    /// The absolute expiry is left alone.
    pub fn update_idle_timeout(&self, record: &mut SessionRecord, seconds: u64) -> Result<()> {
        let idle = Duration::try_seconds(seconds as i64)
            .ok_or_else(|| Error::Encode(format!("idle timeout of {seconds}s out of range")))?;
        record.idle_timeout = Some(time::clamp(
            self.now()
                .checked_add_signed(idle)
                .unwrap_or(DateTime::<Utc>::MAX_UTC),
        ));
        self.store(record)
    }

    /// Delete the identity entry under `name_key` if it still points at
    /// `session_id`. A newer session of the same subject keeps its entry.
    /// The caller holds the store lock.
    fn unindex_identity(&self, name_key: &str, session_id: &SessionId) -> StoreResult<()> {
        let Some(bytes) = self.store.get(name_key)? else {
            return Ok(());
        };
        match codec::decode(&bytes) {
            Ok(indexed) if indexed.session_id != *session_id => {
                trace!(
                    session_id = %session_id,
                    indexed = %indexed.session_id,
                    "Identity entry belongs to a newer session, keeping it"
                );
                Ok(())
            }
            _ => self.store.delete(name_key),
        }
    }

    /// Read, decode and expiry-check one key.
    fn load_key(&self, key: &str, label: &str) -> Result<SessionRecord> {
        let Some(bytes) = self.store.get(key)? else {
            trace!(session = %label, "Session cache miss");
            return Err(Error::NotFound(label.to_string()));
        };

        let record = match codec::decode(&bytes) {
            Ok(record) => record,
            Err(e) => {
                warn!(session = %label, error = %e, "Discarding unreadable session entry");
                return Err(Error::NotFound(label.to_string()));
            }
        };

        if record.is_expired_at(self.now()) {
            debug!(session_id = %record.session_id, "Session expired, removing");
            if let Err(e) = self.delete_record(&record) {
                debug!(session_id = %record.session_id, error = %e, "Failed to remove expired session");
            }
            return Err(Error::NotFound(label.to_string()));
        }

        Ok(record)
    }
}
