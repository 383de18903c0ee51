//! Configuration for the portcullis SAML session core.
//!
//! One TOML file describes:
//! - the session cache (`[session]`)
//! - attribute handling and environment export (`[attributes]`)
//! - the ordered authorization rules of a protected location (`[[rule]]`)
//!
//! Loading only parses; call [`PortcullisConfig::validate`] before use so
//! that bad rules are reported at startup rather than on the first request.

pub mod error;
mod load;
pub mod types;

pub use error::{ConfigError, Result};
pub use load::load_config_file;
pub use types::*;
