use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Point-in-time counters for an object store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct StoreStats {
    /// Entities currently resident.
    pub resident: usize,
    /// Retrievals answered from the resident map.
    pub cache_hits: u64,
    /// Retrievals that had to go to the adapter.
    pub cache_misses: u64,
    pub adapter_reads: u64,
    pub adapter_writes: u64,
    pub adapter_deletes: u64,
    pub evictions: u64,
}

#[derive(Default)]
pub(crate) struct Counters {
    pub(crate) cache_hits: AtomicU64,
    pub(crate) cache_misses: AtomicU64,
    pub(crate) adapter_reads: AtomicU64,
    pub(crate) adapter_writes: AtomicU64,
    pub(crate) adapter_deletes: AtomicU64,
    pub(crate) evictions: AtomicU64,
}

impl Counters {
    pub(crate) fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn snapshot(&self, resident: usize) -> StoreStats {
        StoreStats {
            resident,
            cache_hits: self.cache_hits.load(Ordering::Relaxed),
            cache_misses: self.cache_misses.load(Ordering::Relaxed),
            adapter_reads: self.adapter_reads.load(Ordering::Relaxed),
            adapter_writes: self.adapter_writes.load(Ordering::Relaxed),
            adapter_deletes: self.adapter_deletes.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }
}
