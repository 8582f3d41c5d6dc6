use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use stow_adapter::{open_adapter, InMemoryAdapter, StorageAdapter, DEFAULT_LOCK_TIMEOUT};
use stow_types::{Identity, IndexKey, KeySpace, StorageKey};
use tracing::{debug, info, warn};

use crate::codec::{Codec, Envelope};
use crate::config::StoreConfig;
use crate::entity::{check_contract, StorableEntity};
use crate::error::{ErrorKind, StoreError, StoreResult};
use crate::live::{Live, ResidentSlot, Slot};
use crate::locks::IdentityLocks;
use crate::stats::{Counters, StoreStats};

/// Result of [`ObjectStore::evict`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EvictOutcome {
    /// The entity was resident and has been released. `rewritten` is `true`
    /// if it was dirty and had to be written back first.
    Evicted { rewritten: bool },
    /// The entity is durable but was not resident (e.g. already evicted).
    NotResident,
}

/// Persistence orchestrator over a single storage adapter.
///
/// The store assigns identities, keeps the resident set (identity to live
/// instance), writes entities and their secondary index entries through the
/// adapter, and reloads evicted entities on demand.
///
/// Lookups go to the resident map first and only touch the adapter on a
/// miss. Operations on one identity are serialized by a per-identity lock,
/// so concurrent misses on the same cold identity cause exactly one adapter
/// read and all callers receive the same resident instance. The adapter
/// itself serializes physical I/O; resident-map hits never wait on it.
///
/// Waits on a lock held by someone else (the adapter handle, another
/// operation on the same identity, or a caller's [`Live::write`] guard) are
/// bounded by the configured lock timeout and fail with
/// [`StoreError::Busy`] or an adapter timeout.
///
/// The store never chooses what to evict. An external policy walks
/// [`resident_ids`](Self::resident_ids) and calls [`evict`](Self::evict).
pub struct ObjectStore {
    adapter: Arc<dyn StorageAdapter>,
    resident: DashMap<Identity, Arc<dyn ResidentSlot>>,
    locks: IdentityLocks,
    lock_timeout: Duration,
    codec: Codec,
    counters: Counters,
}

impl ObjectStore {
    /// Create a store over an already-open adapter.
    pub fn new(adapter: Arc<dyn StorageAdapter>, codec: Codec, lock_timeout: Duration) -> Self {
        Self {
            adapter,
            resident: DashMap::new(),
            locks: IdentityLocks::new(lock_timeout),
            lock_timeout,
            codec,
            counters: Counters::default(),
        }
    }

    /// Open the adapter named in `config` and build a store over it.
    pub fn open(config: &StoreConfig) -> StoreResult<Self> {
        let adapter = open_adapter(&config.adapter, config.lock_timeout())?;
        info!(
            location = %adapter.location(),
            codec = %config.codec,
            "object store opened"
        );
        Ok(Self::new(adapter, config.codec, config.lock_timeout()))
    }

    /// Volatile store over a fresh in-memory adapter.
    pub fn in_memory() -> Self {
        Self::new(
            Arc::new(InMemoryAdapter::new()),
            Codec::default(),
            DEFAULT_LOCK_TIMEOUT,
        )
    }

    pub fn adapter(&self) -> &Arc<dyn StorageAdapter> {
        &self.adapter
    }

    pub fn codec(&self) -> Codec {
        self.codec
    }

    // ---------------------------------------------------------------
    // Registration and lookup
    // ---------------------------------------------------------------

    /// Persist `entity` and make it resident. Returns its identity.
    ///
    /// An identity is generated if the entity has none. Registering an
    /// identity that already exists replaces the stored entity.
    pub fn register<E: StorableEntity>(&self, entity: E) -> StoreResult<Identity> {
        self.insert(entity).map(|live| live.identity().clone())
    }

    /// Like [`register`](Self::register), returning the live handle.
    pub fn insert<E: StorableEntity>(&self, mut entity: E) -> StoreResult<Live<E>> {
        check_contract(&entity)?;
        let id = match entity.identity() {
            Some(id) => id.clone(),
            None => {
                let id = Identity::generate();
                entity.assign_identity(id.clone());
                if entity.identity() != Some(&id) {
                    return Err(StoreError::InvalidEntity(format!(
                        "{} did not keep its assigned identity",
                        E::KIND
                    )));
                }
                id
            }
        };

        self.locks.with(&id, || {
            let previous = self.previous_indexes(&id)?;
            let slot = Arc::new(Slot::new(id.clone(), entity, Vec::new()));
            let (bytes, indexes) = slot.encode(self.codec, self.lock_timeout)?;
            self.adapter_put(&StorageKey::object(&id), &bytes)?;
            if let Err(e) = self.relink_indexes(&id, &indexes, &previous) {
                // Storage already holds the new object, so an older resident
                // instance no longer matches it.
                if self.resident.remove(&id).is_some() {
                    warn!(%id, error = %e, "dropped resident instance after partial register");
                }
                return Err(e);
            }
            slot.set_persisted_indexes(indexes);
            if self.resident.insert(id.clone(), slot.clone()).is_some() {
                debug!(%id, "replaced resident instance");
            }
            debug!(kind = E::KIND, %id, "entity registered");
            Ok(Live::from_slot(slot))
        })
    }

    /// The live entity for `id`, reloading it if it is not resident.
    pub fn retrieve<E: StorableEntity>(&self, id: &Identity) -> StoreResult<Live<E>> {
        if let Some(slot) = self.resident_slot(id) {
            Counters::bump(&self.counters.cache_hits);
            return downcast(id, slot);
        }

        self.locks.with(id, || {
            // Another caller may have loaded it while we waited.
            if let Some(slot) = self.resident_slot(id) {
                Counters::bump(&self.counters.cache_hits);
                return downcast(id, slot);
            }
            Counters::bump(&self.counters.cache_misses);
            self.load(id)
        })
    }

    /// The live entity indexed under `name` = `value`.
    pub fn retrieve_by_index<E: StorableEntity>(
        &self,
        name: &str,
        value: &str,
    ) -> StoreResult<Live<E>> {
        let key = IndexKey::new(name, value)?;
        self.retrieve_by_key(&key)
    }

    /// The live entity indexed under `key`.
    ///
    /// Fails with [`StoreError::StaleIndex`] if the entry points at an
    /// entity that is gone or no longer carries the indexed value.
    pub fn retrieve_by_key<E: StorableEntity>(&self, key: &IndexKey) -> StoreResult<Live<E>> {
        let id = self.resolve_index(key)?;
        let live = match self.retrieve::<E>(&id) {
            Ok(live) => live,
            Err(StoreError::NotFound(_)) => {
                warn!(index = %key, %id, "index entry points at a missing entity");
                return Err(StoreError::StaleIndex {
                    key: key.clone(),
                    id,
                });
            }
            Err(e) => return Err(e),
        };

        let still_indexed = live
            .read_for(self.lock_timeout)?
            .index_entries()
            .iter()
            .any(|(name, value)| name == key.name() && value == key.value());
        if !still_indexed {
            warn!(index = %key, %id, "entity no longer carries the indexed value");
            return Err(StoreError::StaleIndex {
                key: key.clone(),
                id,
            });
        }
        Ok(live)
    }

    /// The identity an index entry currently points at, without loading it.
    pub fn resolve_index(&self, key: &IndexKey) -> StoreResult<Identity> {
        let skey = StorageKey::index(key);
        let bytes = self
            .adapter_get(&skey)?
            .ok_or_else(|| StoreError::IndexNotFound(key.clone()))?;
        let token = String::from_utf8(bytes).map_err(|_| StoreError::Corrupt {
            key: skey.clone(),
            reason: "index entry is not UTF-8".into(),
        })?;
        Identity::new(token).map_err(|e| StoreError::Corrupt {
            key: skey,
            reason: e.to_string(),
        })
    }

    // ---------------------------------------------------------------
    // Eviction, write-back, deletion
    // ---------------------------------------------------------------

    /// Release the resident instance of `id`, writing it back first if dirty.
    ///
    /// Runs the entity's `before_evict` hook. Holders of an existing
    /// [`Live`] keep a detached instance; later lookups reload from storage.
    pub fn evict(&self, id: &Identity) -> StoreResult<EvictOutcome> {
        self.locks.with(id, || {
            let Some(slot) = self.resident_slot(id) else {
                return if self.adapter.exists(&StorageKey::object(id))? {
                    debug!(%id, "evict: not resident");
                    Ok(EvictOutcome::NotResident)
                } else {
                    Err(StoreError::NotFound(id.clone()))
                };
            };

            slot.run_before_evict(self.lock_timeout)?;
            let rewritten = slot.is_dirty();
            if rewritten {
                self.write_slot(id, slot.as_ref(), &slot.persisted_indexes())?;
            }
            self.resident.remove(id);
            Counters::bump(&self.counters.evictions);
            debug!(%id, rewritten, "entity evicted");
            Ok(EvictOutcome::Evicted { rewritten })
        })
    }

    /// Write back `id` if it is resident and dirty. Returns `true` if a
    /// write happened.
    pub fn persist(&self, id: &Identity) -> StoreResult<bool> {
        self.locks.with(id, || {
            let Some(slot) = self.resident_slot(id) else {
                return Ok(false);
            };
            if !slot.is_dirty() {
                return Ok(false);
            }
            self.write_slot(id, slot.as_ref(), &slot.persisted_indexes())?;
            Ok(true)
        })
    }

    /// Write back every dirty resident entity. Returns how many were written.
    pub fn flush(&self) -> StoreResult<usize> {
        let mut written = 0;
        for id in self.resident_ids() {
            if self.persist(&id)? {
                written += 1;
            }
        }
        if written > 0 {
            debug!(written, "flushed dirty entities");
        }
        Ok(written)
    }

    /// Remove `id` from storage, its index entries, and the resident set.
    pub fn delete(&self, id: &Identity) -> StoreResult<()> {
        self.locks.with(id, || {
            let indexes = match self.resident_slot(id) {
                Some(slot) => slot.persisted_indexes(),
                None => self.stored_indexes(id)?,
            };
            let existed = self.adapter_delete(&StorageKey::object(id))?;
            for key in &indexes {
                self.unlink_index(key, id)?;
            }
            let was_resident = self.resident.remove(id).is_some();
            if !existed && !was_resident {
                return Err(StoreError::NotFound(id.clone()));
            }
            debug!(%id, "entity deleted");
            Ok(())
        })
    }

    // ---------------------------------------------------------------
    // Inspection
    // ---------------------------------------------------------------

    pub fn is_resident(&self, id: &Identity) -> bool {
        self.resident.contains_key(id)
    }

    /// Identities currently resident, sorted.
    pub fn resident_ids(&self) -> Vec<Identity> {
        let mut ids: Vec<Identity> = self.resident.iter().map(|e| e.key().clone()).collect();
        ids.sort();
        ids
    }

    /// Returns `true` if `id` is resident or durably stored.
    pub fn contains(&self, id: &Identity) -> StoreResult<bool> {
        if self.is_resident(id) {
            return Ok(true);
        }
        Ok(self.adapter.exists(&StorageKey::object(id))?)
    }

    /// Every durably stored identity, sorted.
    pub fn identities(&self) -> StoreResult<Vec<Identity>> {
        Ok(self
            .adapter
            .keys(KeySpace::Object.prefix())?
            .iter()
            .filter_map(StorageKey::identity)
            .collect())
    }

    pub fn stats(&self) -> StoreStats {
        self.counters.snapshot(self.resident.len())
    }

    /// Flush dirty entities, drop the resident set, and close the adapter.
    pub fn close(&self) -> StoreResult<()> {
        let written = self.flush()?;
        self.resident.clear();
        self.adapter.close()?;
        info!(location = %self.adapter.location(), written, "object store closed");
        Ok(())
    }

    // ---------------------------------------------------------------
    // Internals
    // ---------------------------------------------------------------

    fn resident_slot(&self, id: &Identity) -> Option<Arc<dyn ResidentSlot>> {
        self.resident.get(id).map(|entry| Arc::clone(entry.value()))
    }

    fn load<E: StorableEntity>(&self, id: &Identity) -> StoreResult<Live<E>> {
        let key = StorageKey::object(id);
        let bytes = self
            .adapter_get(&key)?
            .ok_or_else(|| StoreError::NotFound(id.clone()))?;
        let envelope = Envelope::from_bytes(id, &bytes).inspect_err(|e| {
            warn!(%id, error = %e, "stored envelope is unreadable");
        })?;
        if envelope.kind != E::KIND {
            return Err(StoreError::KindMismatch {
                id: id.clone(),
                expected: E::KIND,
                found: envelope.kind,
            });
        }

        let mut entity: E = envelope.decode(id).inspect_err(|e| {
            warn!(%id, error = %e, "stored entity is undecodable");
        })?;
        if entity.identity() != Some(id) {
            warn!(%id, "stored payload names a different identity");
            return Err(StoreError::Corrupt {
                key,
                reason: format!("payload carries identity {:?}", entity.identity()),
            });
        }

        entity.after_reload();
        let slot = Arc::new(Slot::new(id.clone(), entity, envelope.indexes));
        self.resident.insert(id.clone(), slot.clone());
        debug!(kind = E::KIND, %id, "entity reloaded");
        Ok(Live::from_slot(slot))
    }

    /// Write a resident slot back. On failure the slot stays dirty so a
    /// later flush or eviction retries.
    fn write_slot(
        &self,
        id: &Identity,
        slot: &dyn ResidentSlot,
        previous: &[IndexKey],
    ) -> StoreResult<()> {
        let (bytes, indexes) = slot.encode(self.codec, self.lock_timeout)?;
        let written = self
            .adapter_put(&StorageKey::object(id), &bytes)
            .and_then(|()| self.relink_indexes(id, &indexes, previous));
        if let Err(e) = written {
            slot.mark_dirty();
            return Err(e);
        }
        slot.set_persisted_indexes(indexes);
        Ok(())
    }

    /// Point `indexes` at `id` and unlink the `previous` keys it dropped.
    /// Called after the object itself is written, so an index entry never
    /// points at an identity that was not yet stored.
    fn relink_indexes(
        &self,
        id: &Identity,
        indexes: &[IndexKey],
        previous: &[IndexKey],
    ) -> StoreResult<()> {
        for old in previous.iter().filter(|k| !indexes.contains(k)) {
            self.unlink_index(old, id)?;
        }
        for key in indexes {
            self.adapter_put(&StorageKey::index(key), id.as_str().as_bytes())?;
        }
        debug!(%id, indexes = indexes.len(), "entity written");
        Ok(())
    }

    /// Remove an index entry if it still points at `id`.
    fn unlink_index(&self, key: &IndexKey, id: &Identity) -> StoreResult<()> {
        let skey = StorageKey::index(key);
        match self.adapter_get(&skey) {
            Ok(Some(owner)) if owner == id.as_str().as_bytes() => {
                self.adapter_delete(&skey)?;
            }
            Ok(_) => {}
            Err(e) if e.kind() == ErrorKind::Corrupt => {
                warn!(index = %key, error = %e, "dropping unreadable index entry");
                self.adapter_delete(&skey)?;
            }
            Err(e) => return Err(e),
        }
        Ok(())
    }

    fn previous_indexes(&self, id: &Identity) -> StoreResult<Vec<IndexKey>> {
        match self.resident_slot(id) {
            Some(slot) => Ok(slot.persisted_indexes()),
            None => self.stored_indexes(id),
        }
    }

    /// Index keys recorded in the stored envelope of `id`, if readable.
    fn stored_indexes(&self, id: &Identity) -> StoreResult<Vec<IndexKey>> {
        let bytes = match self.adapter_get(&StorageKey::object(id)) {
            Ok(Some(bytes)) => bytes,
            Ok(None) => return Ok(Vec::new()),
            Err(e) if e.kind() == ErrorKind::Corrupt => {
                warn!(%id, error = %e, "ignoring unreadable stored entity");
                return Ok(Vec::new());
            }
            Err(e) => return Err(e),
        };
        match Envelope::from_bytes(id, &bytes) {
            Ok(envelope) => Ok(envelope.indexes),
            Err(e) => {
                warn!(%id, error = %e, "ignoring unreadable stored envelope");
                Ok(Vec::new())
            }
        }
    }

    fn adapter_get(&self, key: &StorageKey) -> StoreResult<Option<Vec<u8>>> {
        Counters::bump(&self.counters.adapter_reads);
        Ok(self.adapter.get(key)?)
    }

    fn adapter_put(&self, key: &StorageKey, bytes: &[u8]) -> StoreResult<()> {
        Counters::bump(&self.counters.adapter_writes);
        Ok(self.adapter.put(key, bytes)?)
    }

    fn adapter_delete(&self, key: &StorageKey) -> StoreResult<bool> {
        Counters::bump(&self.counters.adapter_deletes);
        Ok(self.adapter.delete(key)?)
    }
}

fn downcast<E: StorableEntity>(id: &Identity, slot: Arc<dyn ResidentSlot>) -> StoreResult<Live<E>> {
    let found = slot.kind();
    let mismatch = || StoreError::KindMismatch {
        id: id.clone(),
        expected: E::KIND,
        found: found.to_string(),
    };
    if found != E::KIND {
        return Err(mismatch());
    }
    slot.into_any()
        .downcast::<Slot<E>>()
        .map(Live::from_slot)
        .map_err(|_| mismatch())
}

impl std::fmt::Debug for ObjectStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ObjectStore")
            .field("location", &self.adapter.location())
            .field("codec", &self.codec)
            .field("resident", &self.resident.len())
            .finish()
    }
}
