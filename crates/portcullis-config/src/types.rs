//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [session]
//! sp_entity_id = "https://sp.example.com"
//! idle_timeout_secs = 900
//!
//! [attributes]
//! env_prefix = "SAML_"
//! merge_separator = ";"
//!
//! [attributes.set_env]
//! "urn:oid:0.9.2342.19200300.100.1.3" = { name = "MAIL" }
//!
//! [[rule]]
//! name = "dept"
//! value = "^eng"
//! options = "[REG]"
//!
//! [[rule]]
//! require = "role"
//! values = ["admin", "staff"]
//! ```

use std::collections::HashMap;
use std::time::Duration;

use portcullis_authz::{Alias, AliasTable, Condition, RuleSet};
use portcullis_session::CacheConfig;
use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, Result};

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct PortcullisConfig {
    /// Session cache settings.
    pub session: SessionSection,

    /// Attribute handling and export settings.
    pub attributes: AttributesSection,

    /// Ordered authorization rules (`[[rule]]`).
    #[serde(rename = "rule")]
    pub rules: Vec<RuleEntry>,
}

impl PortcullisConfig {
    /// Create a config with default values.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Check values that parse but cannot be used, including every rule.
    pub fn validate(&self) -> Result<()> {
        if self.session.sp_entity_id.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "sp_entity_id".to_string(),
                context: "[session]".to_string(),
            });
        }
        if self.session.session_length_secs == 0 {
            return Err(invalid("session_length_secs", "must be greater than zero"));
        }
        if self.session.idle_timeout_secs == Some(0) {
            return Err(invalid("idle_timeout_secs", "must be greater than zero when set"));
        }
        if self.session.max_entry_size == 0 {
            return Err(invalid("max_entry_size", "must be greater than zero"));
        }
        if self.attributes.user_attribute.trim().is_empty() {
            return Err(invalid("user_attribute", "must not be empty"));
        }
        self.build_rules()?;
        Ok(())
    }

    /// Build the rule set from the `[[rule]]` entries, in order.
    pub fn build_rules(&self) -> Result<RuleSet> {
        let mut rules = RuleSet::new();
        for (index, entry) in self.rules.iter().enumerate() {
            let built = match entry {
                RuleEntry::Require { require, values } => rules.push_require(require, values),
                RuleEntry::Cond {
                    name,
                    value,
                    options,
                } => Condition::parse(name, value, options).map(|c| rules.push(c)),
            };
            built.map_err(|source| ConfigError::Rule { index, source })?;
        }
        Ok(rules)
    }

    /// The `[attributes.set_env]` table as an alias table.
    pub fn alias_table(&self) -> AliasTable {
        self.attributes
            .set_env
            .iter()
            .map(|(stored, alias)| (stored.clone(), alias.clone()))
            .collect()
    }

    /// Settings for the session cache.
    pub fn cache_config(&self) -> CacheConfig {
        CacheConfig::new()
            .with_sp_entity_id(self.session.sp_entity_id.clone())
            .with_session_length(Duration::from_secs(self.session.session_length_secs))
            .with_lock_timeout(Duration::from_millis(self.session.lock_timeout_ms))
            .with_max_entry_size(self.session.max_entry_size)
    }
}

fn invalid(field: &str, reason: &str) -> ConfigError {
    ConfigError::Invalid {
        field: field.to_string(),
        reason: reason.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Session
// ─────────────────────────────────────────────────────────────────────────────

/// `[session]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionSection {
    /// Entity id of this service provider.
    pub sp_entity_id: String,

    /// Longest a session may live, in seconds. The assertion's
    /// SessionNotOnOrAfter can only shorten it.
    pub session_length_secs: u64,

    /// Idle timeout in seconds; unset disables it.
    pub idle_timeout_secs: Option<u64>,

    /// Bound on waiting for the store lock, in milliseconds.
    pub lock_timeout_ms: u64,

    /// Largest encoded session entry, in bytes.
    pub max_entry_size: usize,
}

impl Default for SessionSection {
    fn default() -> Self {
        Self {
            sp_entity_id: String::new(),
            session_length_secs: 86_400,
            idle_timeout_secs: None,
            lock_timeout_ms: 5_000,
            max_entry_size: 65_536,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Attributes
// ─────────────────────────────────────────────────────────────────────────────

/// `[attributes]` section.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AttributesSection {
    /// Attribute whose first value becomes the session's user.
    pub user_attribute: String,

    /// Prefix for exported environment variables.
    pub env_prefix: String,

    /// When set, `NAME` carries all values joined by this separator instead
    /// of only the first one.
    pub merge_separator: Option<String>,

    /// Index of the first `NAME_i` variable.
    pub index_start: usize,

    /// Also export the value count as `NAME_N`.
    pub count_in_n: bool,

    /// Alternative names for stored attributes.
    pub set_env: HashMap<String, Alias>,
}

impl Default for AttributesSection {
    fn default() -> Self {
        Self {
            user_attribute: "NAME_ID".to_string(),
            env_prefix: "SAML_".to_string(),
            merge_separator: None,
            index_start: 0,
            count_in_n: false,
            set_env: HashMap::new(),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Rules
// ─────────────────────────────────────────────────────────────────────────────

/// One `[[rule]]` entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RuleEntry {
    /// `require = "name"`, `values = [...]`: the attribute must have one of
    /// the values.
    Require { require: String, values: Vec<String> },

    /// `name`, `value` and an optional bracketed `options` list.
    Cond {
        name: String,
        value: String,
        #[serde(default)]
        options: String,
    },
}
