use std::fmt;
use std::sync::Arc;

use stow_store::{EvictOutcome, Live, ObjectStore, StorableEntity, StoreResult};
use stow_types::Identity;
use tracing::debug;

use crate::handle::Handle;
use crate::lazy::LazyRef;

enum Slot<E: StorableEntity> {
    Live(Live<E>),
    Lazy(LazyRef<E>),
}

/// A field-sized slot that holds an entity either live or as a lazy
/// reference, and can switch between the two.
///
/// Domain objects keep an `EntityRef` where they would otherwise keep the
/// entity itself. [`swap_out`](Self::swap_out) evicts the entity and leaves a
/// [`LazyRef`] in its place; the next use through the slot reloads it.
pub struct EntityRef<E: StorableEntity> {
    store: Arc<ObjectStore>,
    slot: Slot<E>,
}

impl<E: StorableEntity> EntityRef<E> {
    /// Slot holding an already resident entity.
    pub fn resident(store: Arc<ObjectStore>, live: Live<E>) -> Self {
        Self {
            store,
            slot: Slot::Live(live),
        }
    }

    /// Slot holding a lazy reference to `id`.
    pub fn lazy(store: Arc<ObjectStore>, id: Identity) -> Self {
        let lazy = LazyRef::new(Arc::clone(&store), id);
        Self {
            store,
            slot: Slot::Lazy(lazy),
        }
    }

    /// Register `entity` and hold it live.
    pub fn register(store: Arc<ObjectStore>, entity: E) -> StoreResult<Self> {
        let live = store.insert(entity)?;
        Ok(Self::resident(store, live))
    }

    pub fn id(&self) -> &Identity {
        match &self.slot {
            Slot::Live(live) => live.identity(),
            Slot::Lazy(lazy) => lazy.id(),
        }
    }

    /// Returns `true` if the slot holds a live handle rather than a reference.
    pub fn is_live(&self) -> bool {
        matches!(self.slot, Slot::Live(_))
    }

    /// Evict the entity and replace the slot's content with a lazy reference.
    ///
    /// Any other handle to the old instance becomes detached. On error the
    /// slot is left unchanged.
    pub fn swap_out(&mut self) -> StoreResult<EvictOutcome> {
        let id = self.id().clone();
        let outcome = self.store.evict(&id)?;
        debug!(kind = E::KIND, %id, ?outcome, "swapped out");
        self.slot = Slot::Lazy(LazyRef::new(Arc::clone(&self.store), id));
        Ok(outcome)
    }

    /// Resolve if needed and hold the live handle directly.
    pub fn swap_in(&mut self) -> StoreResult<Live<E>> {
        let live = self.live()?;
        self.slot = Slot::Live(live.clone());
        Ok(live)
    }
}

impl<E: StorableEntity> Handle<E> for EntityRef<E> {
    fn identity(&self) -> Option<Identity> {
        Some(self.id().clone())
    }

    fn is_resolved(&self) -> bool {
        match &self.slot {
            Slot::Live(_) => true,
            Slot::Lazy(lazy) => lazy.is_resolved(),
        }
    }

    fn live(&self) -> StoreResult<Live<E>> {
        match &self.slot {
            Slot::Live(live) => Ok(live.clone()),
            Slot::Lazy(lazy) => lazy.live(),
        }
    }
}

impl<E: StorableEntity> PartialEq for EntityRef<E> {
    fn eq(&self, other: &Self) -> bool {
        self.id() == other.id()
    }
}

impl<E: StorableEntity> fmt::Debug for EntityRef<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EntityRef")
            .field("kind", &E::KIND)
            .field("id", self.id())
            .field("live", &self.is_live())
            .finish()
    }
}
