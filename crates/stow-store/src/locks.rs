use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use stow_types::Identity;
use tracing::warn;

use crate::error::{StoreError, StoreResult};

/// Per-identity mutual exclusion.
///
/// Register, retrieve-on-miss, evict, and delete of one identity never
/// interleave; different identities never contend. Entries are dropped from
/// the table once no operation holds or waits on them.
pub(crate) struct IdentityLocks {
    table: DashMap<Identity, Arc<Mutex<()>>>,
    timeout: Duration,
}

impl IdentityLocks {
    pub(crate) fn new(timeout: Duration) -> Self {
        Self {
            table: DashMap::new(),
            timeout,
        }
    }

    /// Run `f` while holding the lock for `id`.
    pub(crate) fn with<R>(&self, id: &Identity, f: impl FnOnce() -> StoreResult<R>) -> StoreResult<R> {
        let mutex = Arc::clone(&self.table.entry(id.clone()).or_default());
        let result = match mutex.try_lock_for(self.timeout) {
            Some(_guard) => f(),
            None => {
                warn!(%id, timeout = ?self.timeout, "identity lock timed out");
                Err(StoreError::Busy(id.clone()))
            }
        };
        drop(mutex);
        self.table.remove_if(id, |_, m| Arc::strong_count(m) == 1);
        result
    }

    #[cfg(test)]
    pub(crate) fn len(&self) -> usize {
        self.table.len()
    }
}
