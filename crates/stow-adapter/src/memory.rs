use std::collections::{HashMap, HashSet};
use std::time::Duration;

use stow_types::StorageKey;

use crate::config::DEFAULT_LOCK_TIMEOUT;
use crate::error::{AdapterError, AdapterResult};
use crate::handle::HandleLock;
use crate::traits::StorageAdapter;

#[derive(Default)]
struct MemoryHandle {
    entries: HashMap<StorageKey, Vec<u8>>,
    corrupted: HashSet<StorageKey>,
    unavailable: bool,
    read_delay: Option<Duration>,
}

impl MemoryHandle {
    fn check_available(&self, op: &'static str) -> AdapterResult<()> {
        if self.unavailable {
            return Err(AdapterError::Unavailable {
                op,
                reason: "backend marked unavailable".into(),
            });
        }
        Ok(())
    }
}

/// In-memory, HashMap-based adapter.
///
/// Intended for tests and embedding. Besides the plain key/value contract it
/// supports fault injection: a backend can be marked unavailable, individual
/// keys can be marked corrupt, and reads can be slowed down to widen race
/// windows in concurrency tests.
pub struct InMemoryAdapter {
    name: String,
    handle: HandleLock<MemoryHandle>,
}

impl InMemoryAdapter {
    /// Create a new empty adapter with the default lock timeout.
    pub fn new() -> Self {
        Self::open("default", DEFAULT_LOCK_TIMEOUT)
    }

    /// Create a named adapter with an explicit lock timeout.
    pub fn open(name: impl Into<String>, timeout: Duration) -> Self {
        Self {
            name: name.into(),
            handle: HandleLock::new(MemoryHandle::default(), timeout),
        }
    }

    /// Number of keys currently stored.
    pub fn len(&self) -> usize {
        self.handle.with("len", |h| Ok(h.entries.len())).unwrap_or(0)
    }

    /// Returns `true` if nothing is stored (or the adapter is closed).
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Make every subsequent operation fail with
    /// [`AdapterError::Unavailable`] until reset.
    pub fn set_unavailable(&self, unavailable: bool) -> AdapterResult<()> {
        self.handle.with("set_unavailable", |h| {
            h.unavailable = unavailable;
            Ok(())
        })
    }

    /// Make reads of `key` fail with [`AdapterError::Corrupt`]. Cleared by
    /// the next `put` or `delete` of that key.
    pub fn corrupt(&self, key: &StorageKey) -> AdapterResult<()> {
        self.handle.with("corrupt", |h| {
            h.corrupted.insert(key.clone());
            Ok(())
        })
    }

    /// Overwrite the raw bytes under `key` without any checks.
    pub fn put_raw(&self, key: &StorageKey, value: Vec<u8>) -> AdapterResult<()> {
        self.handle.with("put_raw", |h| {
            h.entries.insert(key.clone(), value);
            Ok(())
        })
    }

    /// Hold the handle lock for `delay` on every `get`.
    pub fn set_read_delay(&self, delay: Option<Duration>) -> AdapterResult<()> {
        self.handle.with("set_read_delay", |h| {
            h.read_delay = delay;
            Ok(())
        })
    }
}

impl Default for InMemoryAdapter {
    fn default() -> Self {
        Self::new()
    }
}

impl StorageAdapter for InMemoryAdapter {
    fn location(&self) -> String {
        format!("memory:{}", self.name)
    }

    fn put(&self, key: &StorageKey, value: &[u8]) -> AdapterResult<()> {
        self.handle.with("put", |h| {
            h.check_available("put")?;
            h.corrupted.remove(key);
            h.entries.insert(key.clone(), value.to_vec());
            Ok(())
        })
    }

    fn get(&self, key: &StorageKey) -> AdapterResult<Option<Vec<u8>>> {
        self.handle.with("get", |h| {
            h.check_available("get")?;
            if let Some(delay) = h.read_delay {
                std::thread::sleep(delay);
            }
            if h.corrupted.contains(key) && h.entries.contains_key(key) {
                return Err(AdapterError::Corrupt {
                    key: key.clone(),
                    reason: "marked corrupt".into(),
                });
            }
            Ok(h.entries.get(key).cloned())
        })
    }

    fn exists(&self, key: &StorageKey) -> AdapterResult<bool> {
        self.handle.with("exists", |h| {
            h.check_available("exists")?;
            Ok(h.entries.contains_key(key))
        })
    }

    fn delete(&self, key: &StorageKey) -> AdapterResult<bool> {
        self.handle.with("delete", |h| {
            h.check_available("delete")?;
            h.corrupted.remove(key);
            Ok(h.entries.remove(key).is_some())
        })
    }

    fn keys(&self, prefix: &str) -> AdapterResult<Vec<StorageKey>> {
        self.handle.with("keys", |h| {
            h.check_available("keys")?;
            let mut keys: Vec<StorageKey> = h
                .entries
                .keys()
                .filter(|k| k.starts_with(prefix))
                .cloned()
                .collect();
            keys.sort();
            Ok(keys)
        })
    }

    fn close(&self) -> AdapterResult<()> {
        self.handle.take()?;
        Ok(())
    }
}

impl std::fmt::Debug for InMemoryAdapter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InMemoryAdapter")
            .field("name", &self.name)
            .field("key_count", &self.len())
            .finish()
    }
}
