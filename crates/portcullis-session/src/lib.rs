//! Session state cache for a SAML2 service provider.
//!
//! This crate owns everything that happens to a session once an assertion
//! has been validated:
//! - [`SessionRecord`]: the identity, attribute bag and expiry of one session
//! - [`codec`]: the versioned document a record is persisted as
//! - [`StoreAdapter`]: the contract over the host's shared key/value store
//! - [`SessionCache`]: dual-key (session id, name-id + issuer) indexing with
//!   expiry and idle-timeout handling
//!
//! # Example
//!
//! ```rust,ignore
//! use portcullis_session::{CacheConfig, MemoryStore, SessionCache};
//!
//! let config = CacheConfig::new()
//!     .with_sp_entity_id("https://sp.example.com")
//!     .with_lock_timeout(Duration::from_secs(2));
//!
//! let cache = SessionCache::new(MemoryStore::default(), config);
//! let session = cache.create_session()?;
//! ```

mod cache;
pub mod codec;
mod config;
mod error;
mod expiry;
mod id;
mod record;
mod store;
pub mod time;

pub use cache::SessionCache;
pub use config::CacheConfig;
pub use error::{Error, Result};
pub use expiry::{Clock, ManualClock, SystemClock, effective_expires, is_expired};
pub use id::{SessionId, generate_token, tokens_match};
pub use record::{Attributes, NameId, OpaqueBlob, SessionRecord};
pub use store::{MemoryStore, StoreAdapter, StoreError, StoreResult};
