use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::AdapterResult;
use crate::file::FileAdapter;
use crate::memory::InMemoryAdapter;
use crate::traits::StorageAdapter;

/// How long an operation waits for a busy storage handle before giving up.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_secs(5);

/// Flush strategy for file-backed adapters.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// `fsync` after every write (safest, highest latency).
    EveryWrite,
    /// Rely on OS page-cache buffering (fastest, least durable).
    #[default]
    OsDefault,
}

/// Which storage engine backs an object store.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum AdapterConfig {
    /// Volatile in-memory map.
    #[default]
    Memory,
    /// Single-file hashed store at `path`.
    File {
        path: PathBuf,
        #[serde(default)]
        sync: SyncMode,
    },
}

/// Open the adapter described by `config`.
pub fn open_adapter(
    config: &AdapterConfig,
    timeout: Duration,
) -> AdapterResult<Arc<dyn StorageAdapter>> {
    match config {
        AdapterConfig::Memory => Ok(Arc::new(InMemoryAdapter::open("default", timeout))),
        AdapterConfig::File { path, sync } => {
            Ok(Arc::new(FileAdapter::open(path, *sync, timeout)?))
        }
    }
}
