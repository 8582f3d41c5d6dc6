use stow_store::{Live, StorableEntity, StoreResult};
use stow_types::Identity;

/// Uniform access to an entity, resident or not.
pub trait Handle<E: StorableEntity> {
    /// The identity, if known without resolving.
    fn identity(&self) -> Option<Identity>;

    /// Returns `true` once the handle is bound to a live instance.
    fn is_resolved(&self) -> bool;

    /// The live instance, resolving first if needed.
    fn live(&self) -> StoreResult<Live<E>>;

    /// Run `f` with shared access to the entity.
    fn read<R>(&self, f: impl FnOnce(&E) -> R) -> StoreResult<R>
    where
        Self: Sized,
    {
        let live = self.live()?;
        let guard = live.read();
        let out = f(&guard);
        Ok(out)
    }

    /// Run `f` with exclusive access to the entity, marking it dirty.
    fn write<R>(&self, f: impl FnOnce(&mut E) -> R) -> StoreResult<R>
    where
        Self: Sized,
    {
        let live = self.live()?;
        let mut guard = live.write();
        let out = f(&mut guard);
        Ok(out)
    }
}

impl<E: StorableEntity> Handle<E> for Live<E> {
    fn identity(&self) -> Option<Identity> {
        Some(Live::identity(self).clone())
    }

    fn is_resolved(&self) -> bool {
        true
    }

    fn live(&self) -> StoreResult<Live<E>> {
        Ok(self.clone())
    }
}

/// Returns `true` if both handles are known to name the same entity.
///
/// Never resolves. A handle whose identity is not yet known (an unresolved
/// [`IndexedRef`](crate::IndexedRef)) matches nothing.
pub fn same_entity<E, A, B>(a: &A, b: &B) -> bool
where
    E: StorableEntity,
    A: Handle<E> + ?Sized,
    B: Handle<E> + ?Sized,
{
    match (a.identity(), b.identity()) {
        (Some(x), Some(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::fixtures::Person;
    use stow_store::ObjectStore;

    #[test]
    fn live_handle_forwards_directly() {
        let store = ObjectStore::in_memory();
        let live = store.insert(Person::new("ada")).unwrap();

        assert!(Handle::is_resolved(&live));
        assert_eq!(Handle::identity(&live).as_ref(), Some(live.identity()));
        let name = Handle::read(&live, |p| p.name.clone()).unwrap();
        assert_eq!(name, "ada");

        Handle::write(&live, |p| p.age = 36).unwrap();
        assert!(live.is_dirty());
    }

    #[test]
    fn same_entity_compares_identity() {
        let store = ObjectStore::in_memory();
        let a = store.insert(Person::new("a")).unwrap();
        let b = store.insert(Person::new("b")).unwrap();
        assert!(same_entity(&a, &a.clone()));
        assert!(!same_entity(&a, &b));
    }

    #[test]
    fn handle_is_usable_as_trait_object() {
        let store = ObjectStore::in_memory();
        let live = store.insert(Person::new("a")).unwrap();
        let erased: &dyn Handle<Person> = &live;
        assert!(erased.is_resolved());
        assert!(erased.live().unwrap().same_instance(&live));
    }
}
