use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;
use crate::identity::Identity;
use crate::index::IndexKey;

const OBJECT_PREFIX: &str = "obj/";
const INDEX_PREFIX: &str = "idx/";

/// Which namespace a [`StorageKey`] belongs to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum KeySpace {
    /// Entity envelopes, keyed by identity.
    Object,
    /// Secondary index entries, keyed by index name and value.
    Index,
}

impl KeySpace {
    /// The key prefix shared by every key in this namespace.
    pub fn prefix(&self) -> &'static str {
        match self {
            Self::Object => OBJECT_PREFIX,
            Self::Index => INDEX_PREFIX,
        }
    }
}

/// Key under which a storage adapter holds a value.
///
/// Entities and index entries share a single adapter, separated by prefix:
///
/// ```text
/// obj/<identity>
/// idx/<index-name>/<index-value>
/// ```
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct StorageKey(String);

impl StorageKey {
    /// Key for the envelope of the entity with `id`.
    pub fn object(id: &Identity) -> Self {
        Self(format!("{OBJECT_PREFIX}{id}"))
    }

    /// Key for a secondary index entry.
    pub fn index(key: &IndexKey) -> Self {
        Self(format!("{INDEX_PREFIX}{}/{}", key.name(), key.value()))
    }

    /// Parse a raw key, checking that it lives in a known namespace.
    pub fn parse(raw: &str) -> Result<Self, TypeError> {
        if raw.starts_with(OBJECT_PREFIX) || raw.starts_with(INDEX_PREFIX) {
            Ok(Self(raw.to_string()))
        } else {
            Err(TypeError::MalformedKey(raw.to_string()))
        }
    }

    /// The namespace of this key, if recognized.
    pub fn space(&self) -> Option<KeySpace> {
        if self.0.starts_with(OBJECT_PREFIX) {
            Some(KeySpace::Object)
        } else if self.0.starts_with(INDEX_PREFIX) {
            Some(KeySpace::Index)
        } else {
            None
        }
    }

    /// The identity named by an object key.
    pub fn identity(&self) -> Option<Identity> {
        self.0
            .strip_prefix(OBJECT_PREFIX)
            .and_then(|token| Identity::new(token).ok())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn starts_with(&self, prefix: &str) -> bool {
        self.0.starts_with(prefix)
    }
}

impl fmt::Debug for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "StorageKey({})", self.0)
    }
}

impl fmt::Display for StorageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn object_key_layout() {
        let id = Identity::new("A1").unwrap();
        let key = StorageKey::object(&id);
        assert_eq!(key.as_str(), "obj/A1");
        assert_eq!(key.space(), Some(KeySpace::Object));
        assert_eq!(key.identity(), Some(id));
    }

    #[test]
    fn index_key_layout() {
        let idx = IndexKey::new("email", "a@x.com").unwrap();
        let key = StorageKey::index(&idx);
        assert_eq!(key.as_str(), "idx/email/a@x.com");
        assert_eq!(key.space(), Some(KeySpace::Index));
        assert!(key.identity().is_none());
    }

    #[test]
    fn namespaces_do_not_collide() {
        let id = Identity::new("email/a@x.com").unwrap();
        let idx = IndexKey::new("email", "a@x.com").unwrap();
        assert_ne!(StorageKey::object(&id), StorageKey::index(&idx));
    }

    #[test]
    fn parse_rejects_unknown_namespace() {
        assert!(StorageKey::parse("obj/A1").is_ok());
        assert!(StorageKey::parse("misc/A1").is_err());
    }
}
