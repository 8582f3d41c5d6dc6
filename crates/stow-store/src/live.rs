//! Resident entity instances and the handles that share them.

use std::any::Any;
use std::fmt;
use std::hash::{Hash, Hasher};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock, RwLockReadGuard, RwLockWriteGuard};
use stow_types::{Identity, IndexKey};
use tracing::warn;

use crate::codec::{Codec, Envelope};
use crate::entity::{index_keys, StorableEntity};
use crate::error::{StoreError, StoreResult};

/// One resident instance: the entity behind a lock, a dirty flag, and the
/// index keys it was last written under.
pub(crate) struct Slot<E> {
    id: Identity,
    entity: RwLock<E>,
    dirty: AtomicBool,
    persisted_indexes: Mutex<Vec<IndexKey>>,
}

impl<E: StorableEntity> Slot<E> {
    pub(crate) fn new(id: Identity, entity: E, persisted_indexes: Vec<IndexKey>) -> Self {
        Self {
            id,
            entity: RwLock::new(entity),
            dirty: AtomicBool::new(false),
            persisted_indexes: Mutex::new(persisted_indexes),
        }
    }

    /// Shared access, waiting at most `timeout` for a current writer.
    pub(crate) fn read_for(&self, timeout: Duration) -> StoreResult<RwLockReadGuard<'_, E>> {
        self.entity
            .try_read_for(timeout)
            .ok_or_else(|| self.busy(timeout))
    }

    /// Exclusive access, waiting at most `timeout` for current holders.
    pub(crate) fn write_for(&self, timeout: Duration) -> StoreResult<RwLockWriteGuard<'_, E>> {
        self.entity
            .try_write_for(timeout)
            .ok_or_else(|| self.busy(timeout))
    }

    fn busy(&self, timeout: Duration) -> StoreError {
        warn!(kind = E::KIND, id = %self.id, ?timeout, "entity is held by another handle");
        StoreError::Busy(self.id.clone())
    }
}

/// Type-erased view of a [`Slot`], so the store can persist and evict
/// entities without knowing their concrete type.
pub(crate) trait ResidentSlot: Send + Sync {
    fn kind(&self) -> &'static str;
    fn is_dirty(&self) -> bool;
    fn mark_dirty(&self);
    /// Waits at most `timeout` for handles that hold the entity.
    fn run_before_evict(&self, timeout: Duration) -> StoreResult<()>;
    /// Encode the current state into envelope bytes and clear the dirty flag.
    /// Waits at most `timeout` for a writer.
    fn encode(&self, codec: Codec, timeout: Duration) -> StoreResult<(Vec<u8>, Vec<IndexKey>)>;
    fn persisted_indexes(&self) -> Vec<IndexKey>;
    fn set_persisted_indexes(&self, indexes: Vec<IndexKey>);
    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;
}

impl<E: StorableEntity> ResidentSlot for Slot<E> {
    fn kind(&self) -> &'static str {
        E::KIND
    }

    fn is_dirty(&self) -> bool {
        self.dirty.load(Ordering::Acquire)
    }

    fn mark_dirty(&self) {
        self.dirty.store(true, Ordering::Release);
    }

    fn run_before_evict(&self, timeout: Duration) -> StoreResult<()> {
        self.write_for(timeout)?.before_evict();
        Ok(())
    }

    fn encode(&self, codec: Codec, timeout: Duration) -> StoreResult<(Vec<u8>, Vec<IndexKey>)> {
        // Writers set `dirty` only while holding the write lock, so clearing
        // it under the read lock cannot lose a concurrent modification.
        let entity = self.read_for(timeout)?;
        if entity.identity() != Some(&self.id) {
            return Err(StoreError::InvalidEntity(format!(
                "{} {} changed its identity while resident",
                E::KIND,
                self.id
            )));
        }
        entity
            .validate()
            .map_err(|reason| StoreError::InvalidEntity(format!("{}: {reason}", E::KIND)))?;
        let indexes = index_keys(&*entity)?;
        let payload = codec.encode(&*entity).map_err(StoreError::Serialization)?;
        let bytes = Envelope::new(E::KIND, codec, indexes.clone(), payload).to_bytes()?;
        self.dirty.store(false, Ordering::Release);
        Ok((bytes, indexes))
    }

    fn persisted_indexes(&self) -> Vec<IndexKey> {
        self.persisted_indexes.lock().clone()
    }

    fn set_persisted_indexes(&self, indexes: Vec<IndexKey>) {
        *self.persisted_indexes.lock() = indexes;
    }

    fn into_any(self: Arc<Self>) -> Arc<dyn Any + Send + Sync> {
        self
    }
}

/// Shared handle to a resident entity instance.
///
/// Every `Live` obtained for the same identity while it stays resident points
/// at the same instance. After the identity is evicted, existing `Live`
/// handles keep working against their now-detached instance; new lookups get
/// a freshly reloaded one. Two handles are equal when their identities are,
/// regardless of instance.
pub struct Live<E> {
    slot: Arc<Slot<E>>,
}

impl<E: StorableEntity> Live<E> {
    pub(crate) fn from_slot(slot: Arc<Slot<E>>) -> Self {
        Self { slot }
    }

    #[cfg(test)]
    pub(crate) fn slot(&self) -> &Arc<Slot<E>> {
        &self.slot
    }

    pub fn identity(&self) -> &Identity {
        &self.slot.id
    }

    /// Shared access to the entity.
    pub fn read(&self) -> RwLockReadGuard<'_, E> {
        self.slot.entity.read()
    }

    /// Exclusive access to the entity. Marks it dirty, so the next eviction
    /// or flush writes it back.
    ///
    /// While the guard is held, store operations that need this entity
    /// (evict, persist, flush, index lookups) fail with `Busy` after the
    /// lock timeout.
    pub fn write(&self) -> RwLockWriteGuard<'_, E> {
        let guard = self.slot.entity.write();
        self.slot.dirty.store(true, Ordering::Release);
        guard
    }

    pub(crate) fn read_for(&self, timeout: Duration) -> StoreResult<RwLockReadGuard<'_, E>> {
        self.slot.read_for(timeout)
    }

    /// Returns `true` if the entity changed since it was last written.
    pub fn is_dirty(&self) -> bool {
        self.slot.dirty.load(Ordering::Acquire)
    }

    /// Returns `true` if both handles share one in-memory instance.
    pub fn same_instance(&self, other: &Live<E>) -> bool {
        Arc::ptr_eq(&self.slot, &other.slot)
    }
}

impl<E: StorableEntity + Clone> Live<E> {
    /// Copy of the current entity state.
    pub fn snapshot(&self) -> E {
        self.read().clone()
    }
}

impl<E> Clone for Live<E> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<E> PartialEq for Live<E> {
    fn eq(&self, other: &Self) -> bool {
        self.slot.id == other.slot.id
    }
}

impl<E> Eq for Live<E> {}

impl<E> Hash for Live<E> {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.slot.id.hash(state);
    }
}

impl<E: StorableEntity> fmt::Debug for Live<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Live")
            .field("kind", &E::KIND)
            .field("id", &self.slot.id)
            .field("dirty", &self.is_dirty())
            .finish()
    }
}
