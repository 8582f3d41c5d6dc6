//! Object store for Stow.
//!
//! The store keeps a resident set of live entity instances in memory and
//! pages them to and from a [`StorageAdapter`](stow_adapter::StorageAdapter)
//! on demand. Callers look entities up by [`Identity`] or through secondary
//! [`IndexKey`]s and get back a [`Live`] handle that shares the one resident
//! instance.
//!
//! # Storage layout
//!
//! - `obj/<identity>` holds an [`Envelope`]: format version, entity kind,
//!   payload codec, the index keys it was written under, and the payload.
//! - `idx/<name>/<value>` holds the identity an index entry points at.
//!
//! # Guarantees
//!
//! 1. While an identity is resident, every lookup returns the same instance.
//! 2. Concurrent misses on one cold identity reload it exactly once.
//! 3. An evicted entity is written back first if it was modified.
//! 4. Absence ([`ErrorKind::NotFound`]) is never confused with unreadable
//!    storage ([`ErrorKind::Corrupt`]) or an unreachable backend
//!    ([`ErrorKind::BackendUnavailable`]).

pub mod codec;
pub mod config;
pub mod entity;
pub mod error;
pub mod live;
mod locks;
pub mod stats;
pub mod store;

#[cfg(test)]
mod testing;

pub use codec::{Codec, Envelope};
pub use config::StoreConfig;
pub use entity::StorableEntity;
pub use error::{ErrorKind, StoreError, StoreResult};
pub use live::Live;
pub use stats::StoreStats;
pub use store::{EvictOutcome, ObjectStore};

pub use stow_types::{Identity, IndexKey};
