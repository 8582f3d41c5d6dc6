use std::fmt;
use std::sync::Arc;

use once_cell::sync::OnceCell;
use stow_store::{Live, ObjectStore, StorableEntity, StoreResult};
use stow_types::Identity;
use tracing::debug;

use crate::handle::Handle;

/// A reference to an entity by secondary index, resolved on first use.
///
/// The identity is unknown until resolution. An index name or value that is
/// not a valid [`IndexKey`](stow_types::IndexKey) is reported on first use,
/// not at construction.
pub struct IndexedRef<E: StorableEntity> {
    name: String,
    value: String,
    store: Arc<ObjectStore>,
    resolved: OnceCell<Live<E>>,
}

impl<E: StorableEntity> IndexedRef<E> {
    pub fn new(store: Arc<ObjectStore>, name: impl Into<String>, value: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            value: value.into(),
            store,
            resolved: OnceCell::new(),
        }
    }

    pub fn index_name(&self) -> &str {
        &self.name
    }

    pub fn index_value(&self) -> &str {
        &self.value
    }
}

impl<E: StorableEntity> Handle<E> for IndexedRef<E> {
    fn identity(&self) -> Option<Identity> {
        self.resolved.get().map(|live| live.identity().clone())
    }

    fn is_resolved(&self) -> bool {
        self.resolved.get().is_some()
    }

    fn live(&self) -> StoreResult<Live<E>> {
        self.resolved
            .get_or_try_init(|| {
                debug!(kind = E::KIND, index = %self.name, value = %self.value, "resolving indexed reference");
                self.store.retrieve_by_index(&self.name, &self.value)
            })
            .cloned()
    }
}

impl<E: StorableEntity> fmt::Debug for IndexedRef<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("IndexedRef")
            .field("kind", &E::KIND)
            .field("index", &format_args!("{}={}", self.name, self.value))
            .field("id", &self.identity())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Person;
    use crate::lazy::StoreRefs;
    use stow_store::{ErrorKind, StoreError};

    #[test]
    fn identity_is_unknown_until_resolved() {
        let store = Arc::new(ObjectStore::in_memory());
        let assigned = store
            .register(Person::new("ada").with_email("a@x.com"))
            .unwrap();
        let r: IndexedRef<Person> = store.indexed_reference("email", "a@x.com");

        assert_eq!(Handle::identity(&r), None);
        assert_eq!(r.read(|p| p.name.clone()).unwrap(), "ada");
        assert_eq!(Handle::identity(&r), Some(assigned));
    }

    #[test]
    fn missing_entry_is_not_found_then_retried() {
        let store = Arc::new(ObjectStore::in_memory());
        let r: IndexedRef<Person> = store.indexed_reference("email", "a@x.com");

        let err = r.live().unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(!r.is_resolved());

        store
            .register(Person::new("ada").with_email("a@x.com"))
            .unwrap();
        assert!(r.live().is_ok());
    }

    #[test]
    fn invalid_index_surfaces_on_first_use() {
        let store = Arc::new(ObjectStore::in_memory());
        let r: IndexedRef<Person> = store.indexed_reference("bad/name", "v");
        assert!(matches!(r.live(), Err(StoreError::InvalidKey(_))));
    }
}
