//! Session identifiers and cookie tokens.

use rand::RngCore;
use serde::{Deserialize, Serialize};
use subtle::ConstantTimeEq;

/// Number of random bytes behind a session id or cookie token.
const ID_BYTES: usize = 16;

/// Length of the hex form of an id.
pub const ID_LENGTH: usize = ID_BYTES * 2;

/// Unique session identifier (16 random bytes, lowercase hex on the wire).
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct SessionId(String);

impl SessionId {
    /// Generate a new random session ID.
    pub fn new() -> Self {
        Self(generate_token())
    }

    /// Parse from its hex form.
    ///
    /// Only exactly [`ID_LENGTH`] lowercase hex characters are accepted.
    pub fn from_hex(s: &str) -> Option<Self> {
        let well_formed = s.len() == ID_LENGTH
            && s.bytes()
                .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b));
        well_formed.then(|| Self(s.to_string()))
    }

    /// The hex form.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Default for SessionId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for SessionId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

impl TryFrom<String> for SessionId {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::from_hex(&value).ok_or_else(|| format!("invalid session id: {value:?}"))
    }
}

impl From<SessionId> for String {
    fn from(id: SessionId) -> Self {
        id.0
    }
}

/// Generate a random token with the same shape as a session id.
pub fn generate_token() -> String {
    let mut bytes = [0u8; ID_BYTES];
    rand::rng().fill_bytes(&mut bytes);
    hex::encode(bytes)
}

/// Constant-time token comparison. Tokens of different length never match.
pub fn tokens_match(expected: &str, presented: &str) -> bool {
    expected.len() == presented.len() && bool::from(expected.as_bytes().ct_eq(presented.as_bytes()))
}
