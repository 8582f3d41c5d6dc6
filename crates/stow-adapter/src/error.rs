use std::time::Duration;

use stow_types::StorageKey;

/// Errors from storage adapter operations.
#[derive(Debug, thiserror::Error)]
pub enum AdapterError {
    /// The backend cannot be reached or refused the operation.
    #[error("backend unavailable during {op}: {reason}")]
    Unavailable { op: &'static str, reason: String },

    /// The storage handle stayed locked longer than the configured timeout.
    #[error("timed out after {waited:?} waiting for the storage handle during {op}")]
    Timeout { op: &'static str, waited: Duration },

    /// The adapter was closed; no further operations are possible.
    #[error("storage handle is closed")]
    Closed,

    /// Bytes exist under the key but cannot be read back intact.
    #[error("corrupt record for {key}: {reason}")]
    Corrupt { key: StorageKey, reason: String },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Record framing could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),
}

impl AdapterError {
    /// Returns `true` if the error means "present but unreadable" rather
    /// than "storage unreachable".
    pub fn is_corruption(&self) -> bool {
        matches!(self, Self::Corrupt { .. })
    }
}

/// Result alias for adapter operations.
pub type AdapterResult<T> = Result<T, AdapterError>;
