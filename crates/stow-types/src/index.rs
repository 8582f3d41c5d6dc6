use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// A secondary index entry: an index name and the attribute value under it.
///
/// Index names are short identifiers such as `"email"`; they may not be
/// empty or contain `/`. Values are arbitrary strings without control
/// characters.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct IndexKey {
    name: String,
    value: String,
}

impl IndexKey {
    /// Build a validated index key.
    pub fn new(name: impl Into<String>, value: impl Into<String>) -> Result<Self, TypeError> {
        let name = name.into();
        let value = value.into();
        if name.is_empty() {
            return Err(TypeError::InvalidIndexKey {
                name,
                reason: "empty index name",
            });
        }
        if name.contains('/') || name.chars().any(char::is_control) {
            return Err(TypeError::InvalidIndexKey {
                name,
                reason: "index name may not contain '/' or control characters",
            });
        }
        if value.chars().any(char::is_control) {
            return Err(TypeError::InvalidIndexKey {
                name,
                reason: "index value contains control characters",
            });
        }
        Ok(Self { name, value })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn value(&self) -> &str {
        &self.value
    }
}

impl fmt::Debug for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "IndexKey({}={:?})", self.name, self.value)
    }
}

impl fmt::Display for IndexKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}={}", self.name, self.value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_key() {
        let key = IndexKey::new("email", "a@x.com").unwrap();
        assert_eq!(key.name(), "email");
        assert_eq!(key.value(), "a@x.com");
        assert_eq!(key.to_string(), "email=a@x.com");
    }

    #[test]
    fn empty_name_rejected() {
        assert!(IndexKey::new("", "v").is_err());
    }

    #[test]
    fn slash_in_name_rejected() {
        assert!(IndexKey::new("a/b", "v").is_err());
    }

    #[test]
    fn slash_in_value_allowed() {
        let key = IndexKey::new("path", "/home/user").unwrap();
        assert_eq!(key.value(), "/home/user");
    }

    #[test]
    fn empty_value_allowed() {
        assert!(IndexKey::new("nickname", "").is_ok());
    }

    #[test]
    fn control_characters_in_value_rejected() {
        assert!(IndexKey::new("email", "a\0b").is_err());
    }
}
