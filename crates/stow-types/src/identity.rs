use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// Longest identity token accepted, in bytes.
pub const MAX_IDENTITY_LEN: usize = 256;

/// Stable, opaque identity of a storable entity.
///
/// An `Identity` is assigned once when an entity is first registered and is
/// never reused. It is the only primary key in the backing store and the only
/// basis for equality between handles to the same entity, whether the entity
/// is resident, evicted, or reached through a lazy reference.
///
/// Generated identities are UUID v7 strings, so they sort by creation time.
/// Callers may also supply their own tokens (e.g. `"A1"`); those must be
/// non-empty, at most [`MAX_IDENTITY_LEN`] bytes, and free of control
/// characters.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub struct Identity(String);

impl Identity {
    /// Generate a fresh, time-ordered identity (UUID v7).
    pub fn generate() -> Self {
        Self(uuid::Uuid::now_v7().to_string())
    }

    /// Validate and wrap a caller-supplied token.
    pub fn new(token: impl Into<String>) -> Result<Self, TypeError> {
        let token = token.into();
        if token.is_empty() {
            return Err(TypeError::InvalidIdentity {
                token,
                reason: "empty",
            });
        }
        if token.len() > MAX_IDENTITY_LEN {
            return Err(TypeError::InvalidIdentity {
                token,
                reason: "too long",
            });
        }
        if token.chars().any(char::is_control) {
            return Err(TypeError::InvalidIdentity {
                token,
                reason: "contains control characters",
            });
        }
        Ok(Self(token))
    }

    /// The token as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Short form for logs (first 8 characters).
    pub fn short_id(&self) -> &str {
        match self.0.char_indices().nth(8) {
            Some((idx, _)) => &self.0[..idx],
            None => &self.0,
        }
    }
}

impl fmt::Debug for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Identity({})", self.0)
    }
}

impl fmt::Display for Identity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl FromStr for Identity {
    type Err = TypeError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::new(s)
    }
}

impl TryFrom<String> for Identity {
    type Error = TypeError;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl TryFrom<&str> for Identity {
    type Error = TypeError;

    fn try_from(value: &str) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<Identity> for String {
    fn from(id: Identity) -> Self {
        id.0
    }
}

impl AsRef<str> for Identity {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
