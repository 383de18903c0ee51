//! Validated assertion data handed over by the SAML library.

use chrono::{DateTime, Utc};
use portcullis_session::{Attributes, NameId, OpaqueBlob};

/// What a validated SAML assertion contributes to a session.
///
/// Signature checks, audience restrictions and the rest of protocol
/// validation happen before a value of this type is built.
#[derive(Debug, Clone, Default)]
pub struct Assertion {
    /// Subject of the assertion.
    pub name_id: Option<NameId>,

    /// Identity provider that issued it.
    pub issuer: Option<NameId>,

    /// Attribute statements, values in document order.
    pub attributes: Attributes,

    /// `SessionNotOnOrAfter` from the authentication statement.
    pub session_not_on_or_after: Option<DateTime<Utc>>,

    /// Identity dump from the SAML library.
    pub identity_dump: Option<OpaqueBlob>,

    /// Protocol session dump from the SAML library.
    pub session_dump: Option<OpaqueBlob>,

    /// The raw response, when it should be kept with the session.
    pub saml_response: Option<OpaqueBlob>,
}

impl Assertion {
    /// Create an assertion about `name_id`, issued by `issuer`.
    pub fn new(name_id: NameId, issuer: NameId) -> Self {
        Self {
            name_id: Some(name_id),
            issuer: Some(issuer),
            ..Self::default()
        }
    }

    /// Add values to an attribute.
    pub fn with_attribute<I, V>(mut self, name: impl Into<String>, values: I) -> Self
    where
        I: IntoIterator<Item = V>,
        V: Into<String>,
    {
        self.attributes
            .entry(name.into())
            .or_default()
            .extend(values.into_iter().map(Into::into));
        self
    }

    /// Set `SessionNotOnOrAfter`.
    pub fn with_session_not_on_or_after(mut self, at: DateTime<Utc>) -> Self {
        self.session_not_on_or_after = Some(at);
        self
    }
}
