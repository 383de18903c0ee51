//! Session record types.

use std::collections::BTreeMap;

use chrono::{DateTime, Duration, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::expiry;
use crate::time;
use crate::id::{SessionId, generate_token};

/// Attribute bag: name to ordered values.
///
/// A name mapped to an empty list is distinct from a name that is absent.
pub type Attributes = BTreeMap<String, Vec<String>>;

/// A SAML name identifier as handed over by the SAML library.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NameId {
    /// The identifier itself.
    pub value: String,

    /// NameID format URI.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub format: Option<String>,

    /// Security domain of the identifier.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name_qualifier: Option<String>,

    /// Service provider the identifier was issued to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sp_name_qualifier: Option<String>,
}

impl NameId {
    /// Create a name identifier with only a value.
    pub fn new(value: impl Into<String>) -> Self {
        Self {
            value: value.into(),
            format: None,
            name_qualifier: None,
            sp_name_qualifier: None,
        }
    }

    /// Set the format.
    pub fn with_format(mut self, format: impl Into<String>) -> Self {
        self.format = Some(format.into());
        self
    }

    /// Set the name qualifier.
    pub fn with_name_qualifier(mut self, qualifier: impl Into<String>) -> Self {
        self.name_qualifier = Some(qualifier.into());
        self
    }

    /// Fill in a missing name qualifier with `default_qualifier` (the SP
    /// entity id).
    pub fn normalized(mut self, default_qualifier: &str) -> Self {
        if self.name_qualifier.is_none() {
            self.name_qualifier = Some(default_qualifier.to_string());
        }
        self
    }

    /// Unambiguous textual form used for key derivation.
    ///
    /// Each component is length-prefixed so that no two distinct name ids
    /// share a canonical form.
    pub fn canonical(&self) -> String {
        let mut out = String::new();
        for part in [
            Some(self.value.as_str()),
            self.format.as_deref(),
            self.name_qualifier.as_deref(),
            self.sp_name_qualifier.as_deref(),
        ] {
            match part {
                Some(p) => out.push_str(&format!("{}:{};", p.len(), p)),
                None => out.push_str("-;"),
            }
        }
        out
    }
}

impl std::fmt::Display for NameId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.value)
    }
}

/// Store key for the identity index.
pub(crate) fn identity_key(name_id: &NameId, issuer: &NameId) -> String {
    let mut hasher = Sha256::new();
    hasher.update(name_id.canonical().as_bytes());
    hasher.update(b"|");
    hasher.update(issuer.canonical().as_bytes());
    format!("nameid:{}", hex::encode(hasher.finalize()))
}

/// Store key for the session id index.
pub(crate) fn session_key(session_id: &SessionId) -> String {
    format!("session:{}", session_id)
}

/// Provider-specific payload carried through unmodified.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OpaqueBlob(String);

impl OpaqueBlob {
    /// Wrap a payload.
    pub fn new(text: impl Into<String>) -> Self {
        Self(text.into())
    }

    /// The payload, exactly as it was handed in.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Payload length in bytes.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the payload is empty.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

/// One authenticated (or placeholder) session.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionRecord {
    /// Session ID. Never changes once assigned.
    pub session_id: SessionId,

    /// Secret bound into the client cookie.
    pub cookie_token: String,

    /// Subject identifier from the assertion.
    pub name_id: Option<NameId>,

    /// Authority that issued the assertion.
    pub issuer: Option<NameId>,

    /// Attribute values by name.
    pub attributes: Attributes,

    /// Principal exposed to the application.
    pub user: Option<String>,

    /// Absolute expiry.
    pub expires: DateTime<Utc>,

    /// Last-activity deadline, when idle timeouts are in effect.
    pub idle_timeout: Option<DateTime<Utc>>,

    /// Whether the session carries a usable identity.
    pub logged_in: bool,

    /// Identity dump from the SAML library.
    pub identity_dump: Option<OpaqueBlob>,

    /// Protocol session dump from the SAML library.
    pub session_dump: Option<OpaqueBlob>,

    /// Last SAML response, when configured to keep it.
    pub saml_response: Option<OpaqueBlob>,
}

impl SessionRecord {
    /// Create a placeholder session: fresh id and cookie token, not logged in.
    ///
    /// `expires` is truncated to whole seconds, the precision it is stored
    /// with.
    pub fn new(expires: DateTime<Utc>) -> Self {
        Self {
            session_id: SessionId::new(),
            cookie_token: generate_token(),
            name_id: None,
            issuer: None,
            attributes: Attributes::new(),
            user: None,
            expires: time::clamp(expires),
            idle_timeout: None,
            logged_in: false,
            identity_dump: None,
            session_dump: None,
            saml_response: None,
        }
    }

    /// Create a placeholder session that expires `ttl_secs` after `now`.
    pub fn with_ttl(now: DateTime<Utc>, ttl_secs: u64) -> Self {
        Self::new(now + Duration::seconds(ttl_secs as i64))
    }

    /// The earlier of `expires` and the idle deadline.
    pub fn effective_expires(&self) -> DateTime<Utc> {
        expiry::effective_expires(self.expires, self.idle_timeout)
    }

    /// Whether the session is no longer usable at `now`.
    pub fn is_expired_at(&self, now: DateTime<Utc>) -> bool {
        expiry::is_expired(self.effective_expires(), now)
    }

    /// The (name-id, issuer) pair, when both are known.
    pub fn identity(&self) -> Option<(&NameId, &NameId)> {
        Some((self.name_id.as_ref()?, self.issuer.as_ref()?))
    }

    /// Mark the session as logged in as `user`.
    ///
    /// Replaces any previous principal outright.
    pub fn set_logged_in(&mut self, user: impl Into<String>) {
        self.user = Some(user.into());
        self.logged_in = true;
    }

    /// Drop the identity, keeping the record for replay suppression.
    pub fn set_logged_out(&mut self) {
        self.user = None;
        self.logged_in = false;
    }

    /// All values of an attribute.
    pub fn values(&self, name: &str) -> Option<&[String]> {
        self.attributes.get(name).map(Vec::as_slice)
    }

    /// First value of an attribute.
    pub fn first_value(&self, name: &str) -> Option<&str> {
        self.attributes
            .get(name)
            .and_then(|values| values.first())
            .map(String::as_str)
    }

    /// Whether an attribute carries `value` (exact match).
    pub fn has_value(&self, name: &str, value: &str) -> bool {
        self.attributes
            .get(name)
            .is_some_and(|values| values.iter().any(|v| v == value))
    }

    /// Declare an attribute present, with no values yet.
    pub fn declare_attribute(&mut self, name: impl Into<String>) {
        self.attributes.entry(name.into()).or_default();
    }

    /// Append a value to an attribute, unless it is already present.
    ///
    /// Returns whether the value was added.
    pub fn add_value(&mut self, name: impl Into<String>, value: impl Into<String>) -> bool {
        let value = value.into();
        let values = self.attributes.entry(name.into()).or_default();
        if values.contains(&value) {
            false
        } else {
            values.push(value);
            true
        }
    }

    /// Replace the values of an attribute, preserving duplicates and order.
    pub fn set_values(&mut self, name: impl Into<String>, values: Vec<String>) {
        self.attributes.insert(name.into(), values);
    }

    /// Merge incoming attribute data into this record.
    ///
    /// For a name already present, incoming values not yet present are
    /// appended (exact string match). A new name is added with its full value
    /// list in arrival order, duplicates included.
    pub fn merge_attributes<I>(&mut self, incoming: I)
    where
        I: IntoIterator<Item = (String, Vec<String>)>,
    {
        for (name, values) in incoming {
            match self.attributes.get_mut(&name) {
                Some(existing) => {
                    for value in values {
                        if !existing.contains(&value) {
                            existing.push(value);
                        }
                    }
                }
                None => {
                    self.attributes.insert(name, values);
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record() -> SessionRecord {
        SessionRecord::with_ttl(Utc::now(), 3600)
    }

    fn strings(values: &[&str]) -> Vec<String> {
        values.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_new_record_is_placeholder() {
        let r = record();
        assert!(!r.logged_in);
        assert!(r.user.is_none());
        assert!(r.identity().is_none());
        assert_ne!(r.session_id.as_str(), r.cookie_token);
    }

    #[test]
    fn test_merge_appends_new_values_only() {
        let mut r = record();
        r.set_values("role", strings(&["user"]));

        r.merge_attributes(vec![("role".to_string(), strings(&["user", "admin"]))]);

        assert_eq!(r.values("role").unwrap(), strings(&["user", "admin"]).as_slice());
    }

    #[test]
    fn test_merge_new_name_keeps_duplicates() {
        let mut r = record();
        r.merge_attributes(vec![("tag".to_string(), strings(&["a", "b", "a"]))]);
        assert_eq!(r.values("tag").unwrap(), strings(&["a", "b", "a"]).as_slice());
    }

    #[test]
    fn test_merge_is_case_sensitive() {
        let mut r = record();
        r.set_values("role", strings(&["Admin"]));
        r.merge_attributes(vec![("role".to_string(), strings(&["admin"]))]);
        assert_eq!(r.values("role").unwrap().len(), 2);
    }

    #[test]
    fn test_merge_twice_is_idempotent() {
        let incoming = vec![
            ("role".to_string(), strings(&["user", "admin"])),
            ("mail".to_string(), strings(&["a@example.com"])),
        ];
        let mut once = record();
        once.merge_attributes(incoming.clone());
        let mut twice = once.clone();
        twice.merge_attributes(incoming);
        assert_eq!(once.attributes, twice.attributes);
    }

    #[test]
    fn test_empty_vs_absent() {
        let mut r = record();
        r.declare_attribute("groups");
        assert_eq!(r.values("groups"), Some(&[][..]));
        assert_eq!(r.values("missing"), None);
        assert_eq!(r.first_value("groups"), None);
    }

    #[test]
    fn test_add_value() {
        let mut r = record();
        assert!(r.add_value("mail", "a@example.com"));
        assert!(!r.add_value("mail", "a@example.com"));
        assert!(r.has_value("mail", "a@example.com"));
        assert!(!r.has_value("mail", "b@example.com"));
    }

    #[test]
    fn test_login_replaces_user() {
        let mut r = record();
        r.set_logged_in("alice");
        r.set_logged_in("bob");
        assert_eq!(r.user.as_deref(), Some("bob"));
        r.set_logged_out();
        assert!(r.user.is_none());
        assert!(!r.logged_in);
    }

    #[test]
    fn test_normalize_fills_missing_qualifier() {
        let n = NameId::new("alice").normalized("https://sp.example.com");
        assert_eq!(n.name_qualifier.as_deref(), Some("https://sp.example.com"));

        let n = NameId::new("alice")
            .with_name_qualifier("https://idp.example.com")
            .normalized("https://sp.example.com");
        assert_eq!(n.name_qualifier.as_deref(), Some("https://idp.example.com"));
    }

    #[test]
    fn test_identity_key_scoped_by_issuer() {
        let name = NameId::new("alice");
        let idp_a = NameId::new("https://idp-a.example.com");
        let idp_b = NameId::new("https://idp-b.example.com");
        assert_ne!(identity_key(&name, &idp_a), identity_key(&name, &idp_b));
        assert_eq!(identity_key(&name, &idp_a), identity_key(&name, &idp_a.clone()));
    }

    #[test]
    fn test_canonical_is_unambiguous() {
        let a = NameId::new("a;b").with_format("c");
        let b = NameId::new("a").with_format("b;c");
        assert_ne!(a.canonical(), b.canonical());
    }
}

#[cfg(test)]
mod proptests {
    use super::*;
    use proptest::prelude::*;

    fn attributes_strategy() -> impl Strategy<Value = Vec<(String, Vec<String>)>> {
        prop::collection::vec(
            ("[a-c]{1,2}", prop::collection::vec("[x-z]{0,2}", 0..4)),
            0..6,
        )
    }

    proptest! {
        /// Property: merging the same data twice changes nothing the second time.
        #[test]
        fn merge_is_idempotent(base in attributes_strategy(), incoming in attributes_strategy()) {
            let mut record = SessionRecord::with_ttl(Utc::now(), 60);
            record.merge_attributes(base);
            record.merge_attributes(incoming.clone());
            let once = record.attributes.clone();
            record.merge_attributes(incoming);
            prop_assert_eq!(record.attributes, once);
        }
    }
}
