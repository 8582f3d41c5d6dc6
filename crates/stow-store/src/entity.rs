//! The contract every storable domain type implements.

use serde::de::DeserializeOwned;
use serde::Serialize;
use stow_types::{Identity, IndexKey};

use crate::error::{StoreError, StoreResult};

/// A domain type the object store can persist, evict, and reload.
///
/// The identity is carried inside the entity so it survives serialization.
/// Everything an entity holds that cannot or should not be serialized (open
/// handles, caches) must be `#[serde(skip)]` and rebuilt in
/// [`after_reload`](Self::after_reload).
///
/// Equality between handles to an entity is by identity only; the store never
/// compares entity contents.
pub trait StorableEntity: Serialize + DeserializeOwned + Send + Sync + 'static {
    /// Stable tag naming this type in storage. Must be non-empty.
    const KIND: &'static str;

    /// The entity's identity, or `None` before first registration.
    fn identity(&self) -> Option<&Identity>;

    /// Record the identity the store generated for this entity.
    fn assign_identity(&mut self, id: Identity);

    /// Secondary index entries as `(index name, value)` pairs.
    fn index_entries(&self) -> Vec<(String, String)> {
        Vec::new()
    }

    /// Drop transient state. Runs on the resident instance right before it
    /// is evicted.
    fn before_evict(&mut self) {}

    /// Rebuild transient state. Runs on a freshly deserialized instance
    /// before anyone else can see it.
    fn after_reload(&mut self) {}

    /// Domain-level validity check, run before every write.
    fn validate(&self) -> Result<(), String> {
        Ok(())
    }
}

/// Validated index keys of `entity`.
pub(crate) fn index_keys<E: StorableEntity>(entity: &E) -> StoreResult<Vec<IndexKey>> {
    let mut keys = entity
        .index_entries()
        .into_iter()
        .map(|(name, value)| IndexKey::new(name, value))
        .collect::<Result<Vec<_>, _>>()
        .map_err(|e| StoreError::InvalidEntity(format!("{}: {e}", E::KIND)))?;
    keys.sort();
    keys.dedup();
    Ok(keys)
}

/// Check everything about `entity` that can be checked without I/O.
pub(crate) fn check_contract<E: StorableEntity>(entity: &E) -> StoreResult<Vec<IndexKey>> {
    if E::KIND.is_empty() || E::KIND.chars().any(char::is_control) {
        return Err(StoreError::InvalidEntity(format!(
            "kind tag {:?} must be non-empty printable text",
            E::KIND
        )));
    }
    entity
        .validate()
        .map_err(|reason| StoreError::InvalidEntity(format!("{}: {reason}", E::KIND)))?;
    index_keys(entity)
}
