use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use stow_store::{Live, ObjectStore, StorableEntity, StoreResult};
use stow_types::Identity;
use tracing::debug;

use crate::handle::Handle;
use crate::indexed::IndexedRef;

/// A reference to an entity by identity, resolved on first use.
pub struct LazyRef<E: StorableEntity> {
    id: Identity,
    store: Arc<ObjectStore>,
    resolved: OnceCell<Live<E>>,
}

impl<E: StorableEntity> LazyRef<E> {
    pub fn new(store: Arc<ObjectStore>, id: Identity) -> Self {
        Self {
            id,
            store,
            resolved: OnceCell::new(),
        }
    }

    pub fn id(&self) -> &Identity {
        &self.id
    }

    pub fn store(&self) -> &Arc<ObjectStore> {
        &self.store
    }
}

impl<E: StorableEntity> Handle<E> for LazyRef<E> {
    fn identity(&self) -> Option<Identity> {
        Some(self.id.clone())
    }

    fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    fn live(&self) -> StoreResult<Live<E>> {
        self.resolved
            .get_or_try_init(|| {
                debug!(kind = E::KIND, id = %self.id, "resolving reference");
                self.store.retrieve(&self.id)
            })
            .cloned()
    }
}

impl<E: StorableEntity> Clone for LazyRef<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id.clone(),
            store: Arc::clone(&self.store),
            resolved: self.resolved.clone(),
        }
    }
}

impl<E: StorableEntity> PartialEq for LazyRef<E> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl<E: StorableEntity> Eq for LazyRef<E> {}

impl<E: StorableEntity> PartialEq<Live<E>> for LazyRef<E> {
    fn eq(&self, other: &Live<E>) -> bool {
        &self.id == other.identity()
    }
}

impl<E: StorableEntity> fmt::Debug for LazyRef<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("LazyRef")
            .field("kind", &E::KIND)
            .field("id", &self.id)
            .field("resolved", &self.is_resolved())
            .finish()
    }
}

/// Reference constructors on a shared store.
pub trait StoreRefs {
    /// A lazy reference to `id`. Does not check that `id` exists.
    fn reference<E: StorableEntity>(&self, id: Identity) -> LazyRef<E>;

    /// A lazy reference to whatever entity `name` = `value` points at.
    fn indexed_reference<E: StorableEntity>(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> IndexedRef<E>;
}

impl StoreRefs for Arc<ObjectStore> {
    fn reference<E: StorableEntity>(&self, id: Identity) -> LazyRef<E> {
        LazyRef::new(Arc::clone(self), id)
    }

    fn indexed_reference<E: StorableEntity>(
        &self,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> IndexedRef<E> {
        IndexedRef::new(Arc::clone(self), name, value)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Person;
    use std::thread;
    use stow_adapter::InMemoryAdapter;
    use stow_store::{Codec, ErrorKind};
    use std::time::Duration;

    fn id(token: &str) -> Identity {
        Identity::new(token).unwrap()
    }

    #[test]
    fn construction_never_touches_storage() {
        let store = Arc::new(ObjectStore::in_memory());
        let r: LazyRef<Person> = store.reference(id("nobody"));
        assert!(!r.is_resolved());
        assert_eq!(Handle::identity(&r), Some(id("nobody")));
        assert_eq!(store.stats().adapter_reads, 0);
    }

    #[test]
    fn first_use_resolves_to_resident_instance() {
        let store = Arc::new(ObjectStore::in_memory());
        let live = store.insert(Person::new("ada")).unwrap();
        let r: LazyRef<Person> = store.reference(live.identity().clone());

        assert_eq!(r.read(|p| p.name.clone()).unwrap(), "ada");
        assert!(r.is_resolved());
        assert!(r.live().unwrap().same_instance(&live));
        assert!(r == live);
    }

    #[test]
    fn failed_resolution_stays_unresolved_and_retries() {
        let store = Arc::new(ObjectStore::in_memory());
        let r: LazyRef<Person> = store.reference(id("P1"));

        let err = r.live().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!r.is_resolved());

        let mut person = Person::new("late");
        person.id = Some(id("P1"));
        store.register(person).unwrap();
        assert_eq!(r.read(|p| p.name.clone()).unwrap(), "late");
        assert!(r.is_resolved());
    }

    #[test]
    fn write_through_reference_marks_entity_dirty() {
        let store = Arc::new(ObjectStore::in_memory());
        let assigned = store.register(Person::new("ada")).unwrap();
        store.evict(&assigned).unwrap();

        let r: LazyRef<Person> = store.reference(assigned.clone());
        r.write(|p| p.age = 36).unwrap();
        assert_eq!(store.flush().unwrap(), 1);
    }

    #[test]
    fn concurrent_first_use_resolves_once() {
        let adapter = Arc::new(InMemoryAdapter::new());
        let store = Arc::new(ObjectStore::new(
            adapter.clone(),
            Codec::Bincode,
            Duration::from_secs(2),
        ));
        let assigned = store.register(Person::new("ada")).unwrap();
        store.evict(&assigned).unwrap();
        adapter
            .set_read_delay(Some(Duration::from_millis(20)))
            .unwrap();

        let r: Arc<LazyRef<Person>> = Arc::new(store.reference(assigned));
        let reads_before = store.stats().adapter_reads;
        let handles: Vec<_> = (0..6)
            .map(|_| {
                let r = Arc::clone(&r);
                thread::spawn(move || r.live().unwrap())
            })
            .collect();
        let lives: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert_eq!(store.stats().adapter_reads - reads_before, 1);
        assert!(lives.iter().all(|l| l.same_instance(&lives[0])));
    }

    #[test]
    fn clones_compare_by_identity() {
        let store = Arc::new(ObjectStore::in_memory());
        let a: LazyRef<Person> = store.reference(id("A1"));
        let b = a.clone();
        let c: LazyRef<Person> = store.reference(id("C3"));
        assert_eq!(a, b);
        assert_ne!(a, c);
    }
}
