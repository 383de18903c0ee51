//! Session core of a SAML2 service provider.
//!
//! Given assertions that the SAML library has already validated, this crate
//! keeps the resulting sessions, answers "which session is this request
//! part of", decides whether the session may see a protected location and
//! describes its attributes as environment variables.
//!
//! # Example
//!
//! ```rust,ignore
//! use portcullis::{Assertion, ServiceProvider};
//! use portcullis_config::load_config_file;
//! use portcullis_session::{MemoryStore, NameId};
//!
//! let config = load_config_file(Path::new("/etc/portcullis.toml"))?;
//! let sp = ServiceProvider::from_config(&config, MemoryStore::default())?;
//!
//! let assertion = Assertion::new(NameId::new("alice"), NameId::new(idp))
//!     .with_attribute("role", ["admin"]);
//! let session = sp.apply_assertion(None, &assertion)?;
//!
//! let allowed = sp.authorize(
//!     session.session_id.as_str(),
//!     &session.cookie_token,
//!     &RequestContext::new(),
//! );
//! ```

mod assertion;
mod error;
pub mod export;
mod gate;

pub use assertion::Assertion;
pub use error::{GateError, Result};
pub use export::{ExportSettings, export_env};
pub use gate::ServiceProvider;

pub use portcullis_authz as authz;
pub use portcullis_config as config;
pub use portcullis_session as session;
