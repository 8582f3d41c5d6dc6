//! Lazy entity references for Stow.
//!
//! A reference names an entity without holding it. It resolves through the
//! [`ObjectStore`](stow_store::ObjectStore) the first time it is used and
//! then forwards every operation to the resident instance.
//!
//! # Handles
//!
//! - [`Live`](stow_store::Live) -- already resolved, straight from the store
//! - [`LazyRef`] -- resolves by identity
//! - [`IndexedRef`] -- resolves by secondary index
//! - [`EntityRef`] -- a swappable slot holding either a live handle or a lazy
//!   one; [`EntityRef::swap_out`] evicts and leaves a lazy reference behind
//!
//! All of them implement [`Handle`], so code that uses an entity does not
//! care whether it is resident.
//!
//! # Rules
//!
//! 1. Constructing a reference never fails and never touches storage.
//! 2. Asking for identity or resolution state never resolves.
//! 3. A failed resolution is reported to the caller that triggered it and
//!    leaves the reference unresolved, so the next use retries.
//! 4. Concurrent first use resolves once; every caller sees the same
//!    resident instance.

pub mod entity_ref;
pub mod handle;
pub mod indexed;
pub mod lazy;

#[cfg(test)]
mod fixtures;

pub use entity_ref::EntityRef;
pub use handle::{same_entity, Handle};
pub use indexed::IndexedRef;
pub use lazy::{LazyRef, StoreRefs};
