use stow_types::StorageKey;

use crate::error::AdapterResult;

/// Key/value storage engine behind the object store.
///
/// All implementations must satisfy these invariants:
/// - Operations on one adapter are serialized through a single handle lock;
///   each `put`/`get`/`delete` is atomic with respect to the others.
/// - Lock waits are bounded and surface as an error, never as a hang.
/// - Absence is `Ok(None)` / `Ok(false)`, distinct from corruption.
/// - The adapter never interprets the bytes it stores.
pub trait StorageAdapter: Send + Sync {
    /// Human-readable location of the backing storage (path, or `memory:`).
    fn location(&self) -> String;

    /// Store `value` under `key`, replacing any previous value.
    fn put(&self, key: &StorageKey, value: &[u8]) -> AdapterResult<()>;

    /// Read the value under `key`.
    ///
    /// Returns `Ok(None)` if the key does not exist.
    /// Returns `Err` on backend failure or corruption.
    fn get(&self, key: &StorageKey) -> AdapterResult<Option<Vec<u8>>>;

    /// Check whether a key exists without reading its value.
    fn exists(&self, key: &StorageKey) -> AdapterResult<bool>;

    /// Delete a key. Returns `true` if it existed.
    fn delete(&self, key: &StorageKey) -> AdapterResult<bool>;

    /// All keys starting with `prefix`, sorted.
    fn keys(&self, prefix: &str) -> AdapterResult<Vec<StorageKey>>;

    /// Flush and release the handle. Later operations fail with
    /// [`AdapterError::Closed`](crate::AdapterError::Closed).
    fn close(&self) -> AdapterResult<()>;
}
