//! Storage adapters for Stow.
//!
//! An adapter is the thin, swappable boundary between the object store and a
//! physical key/value engine. It never interprets the bytes it holds.
//!
//! # Backends
//!
//! All backends implement the [`StorageAdapter`] trait:
//!
//! - [`InMemoryAdapter`] -- `HashMap`-backed, with fault injection for tests
//! - [`FileAdapter`] -- single append-only data file of CRC-framed records
//!   with an in-memory hash index, rebuilt on open
//!
//! # Rules
//!
//! 1. Every operation on one adapter goes through a single handle lock, so a
//!    concurrent `get` never observes a partial `put`.
//! 2. Waiting for the handle lock is bounded; a timeout is reported as
//!    [`AdapterError::Timeout`], never as a hang.
//! 3. Absence is `Ok(None)`. Unreadable bytes are [`AdapterError::Corrupt`].
//!    The two are never conflated.
//! 4. All I/O errors are propagated, never silently ignored.

pub mod config;
pub mod error;
pub mod file;
pub mod handle;
pub mod memory;
pub mod traits;

pub use config::{open_adapter, AdapterConfig, SyncMode, DEFAULT_LOCK_TIMEOUT};
pub use error::{AdapterError, AdapterResult};
pub use file::{CompactionReport, FileAdapter};
pub use handle::HandleLock;
pub use memory::InMemoryAdapter;
pub use traits::StorageAdapter;
