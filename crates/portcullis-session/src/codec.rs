//! Persisted form of a session record.
//!
//! A record is stored as a small JSON document:
//!
//! ```json
//! { "SessionState": {
//!     "version": "1.0",
//!     "session_id": "…", "cookie_token": "…",
//!     "expires": "2024-03-01T12:30:45Z",
//!     "attributes": { "role": ["user", "admin"], "groups": [] },
//!     "identity_dump": { "length": 5, "text": "<xml>" },
//!     … } }
//! ```
//!
//! Decoding requires the root key and a version marker with major version 1;
//! fields a later minor version adds are ignored. An attribute present with no
//! values is written as an empty array, an absent attribute is not written.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};
use crate::id::SessionId;
use crate::record::{Attributes, NameId, OpaqueBlob, SessionRecord};
use crate::time::{format_timestamp, parse_timestamp};

/// Root key of every session document.
pub const ROOT_TAG: &str = "SessionState";

/// Version written by this encoder.
pub const VERSION: &str = "1.0";

/// Major version this decoder understands.
const SUPPORTED_MAJOR: &str = "1";

#[derive(Serialize)]
struct Envelope {
    #[serde(rename = "SessionState")]
    state: StateDocument,
}

#[derive(Serialize, Deserialize)]
struct StateDocument {
    version: String,
    session_id: SessionId,
    cookie_token: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    name_id: Option<NameId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    issuer: Option<NameId>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    user: Option<String>,
    logged_in: bool,
    expires: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    idle_timeout: Option<String>,
    #[serde(default)]
    attributes: Attributes,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    identity_dump: Option<BlobDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    session_dump: Option<BlobDocument>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    saml_response: Option<BlobDocument>,
}

/// Length-delimited text block.
#[derive(Serialize, Deserialize)]
struct BlobDocument {
    length: usize,
    text: String,
}

impl BlobDocument {
    fn from_blob(blob: &OpaqueBlob) -> Self {
        Self {
            length: blob.len(),
            text: blob.as_str().to_string(),
        }
    }

    fn into_blob(self, field: &str) -> Result<OpaqueBlob> {
        if self.text.len() != self.length {
            return Err(Error::MalformedRecord(format!(
                "{field}: declared length {} but found {} bytes",
                self.length,
                self.text.len()
            )));
        }
        Ok(OpaqueBlob::new(self.text))
    }
}

/// Encode a record for storage.
pub fn encode(record: &SessionRecord) -> Result<Vec<u8>> {
    let envelope = Envelope {
        state: StateDocument {
            version: VERSION.to_string(),
            session_id: record.session_id.clone(),
            cookie_token: record.cookie_token.clone(),
            name_id: record.name_id.clone(),
            issuer: record.issuer.clone(),
            user: record.user.clone(),
            logged_in: record.logged_in,
            expires: format_timestamp(record.expires),
            idle_timeout: record.idle_timeout.map(format_timestamp),
            attributes: record.attributes.clone(),
            identity_dump: record.identity_dump.as_ref().map(BlobDocument::from_blob),
            session_dump: record.session_dump.as_ref().map(BlobDocument::from_blob),
            saml_response: record.saml_response.as_ref().map(BlobDocument::from_blob),
        },
    };
    serde_json::to_vec(&envelope).map_err(|e| Error::Encode(e.to_string()))
}

/// Decode a stored record.
///
/// Fails with [`Error::MalformedRecord`] on anything that is not a
/// well-formed session document of a supported version.
pub fn decode(bytes: &[u8]) -> Result<SessionRecord> {
    let mut root: serde_json::Map<String, serde_json::Value> = serde_json::from_slice(bytes)
        .map_err(|e| Error::MalformedRecord(format!("not a session document: {e}")))?;

    let state = root
        .remove(ROOT_TAG)
        .ok_or_else(|| Error::MalformedRecord(format!("missing root element {ROOT_TAG}")))?;

    let version = state
        .get("version")
        .and_then(|v| v.as_str())
        .ok_or_else(|| Error::MalformedRecord("missing version marker".to_string()))?;
    check_version(version)?;

    let doc = StateDocument::deserialize(state)
        .map_err(|e| Error::MalformedRecord(e.to_string()))?;

    Ok(SessionRecord {
        session_id: doc.session_id,
        cookie_token: doc.cookie_token,
        name_id: doc.name_id,
        issuer: doc.issuer,
        attributes: doc.attributes,
        user: doc.user,
        expires: timestamp("expires", &doc.expires)?,
        idle_timeout: doc
            .idle_timeout
            .as_deref()
            .map(|s| timestamp("idle_timeout", s))
            .transpose()?,
        logged_in: doc.logged_in,
        identity_dump: doc
            .identity_dump
            .map(|b| b.into_blob("identity_dump"))
            .transpose()?,
        session_dump: doc
            .session_dump
            .map(|b| b.into_blob("session_dump"))
            .transpose()?,
        saml_response: doc
            .saml_response
            .map(|b| b.into_blob("saml_response"))
            .transpose()?,
    })
}

fn check_version(version: &str) -> Result<()> {
    let major = version.split('.').next().unwrap_or_default();
    if major == SUPPORTED_MAJOR {
        Ok(())
    } else {
        Err(Error::MalformedRecord(format!(
            "unsupported session document version {version:?}"
        )))
    }
}

fn timestamp(field: &str, value: &str) -> Result<DateTime<Utc>> {
    parse_timestamp(value)
        .ok_or_else(|| Error::MalformedRecord(format!("{field}: bad timestamp {value:?}")))
}
