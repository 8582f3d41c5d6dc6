//! Foundation types for Stow.
//!
//! This crate provides the identity and key types shared by every other Stow
//! crate. None of them carry behavior beyond validation and formatting.
//!
//! # Key Types
//!
//! - [`Identity`] -- Stable opaque token naming a storable entity for its whole lifetime
//! - [`IndexKey`] -- Secondary index name + value pair
//! - [`StorageKey`] -- Namespaced key under which the adapter stores bytes

pub mod error;
pub mod identity;
pub mod index;
pub mod key;

pub use error::TypeError;
pub use identity::{Identity, MAX_IDENTITY_LEN};
pub use index::IndexKey;
pub use key::{KeySpace, StorageKey};
