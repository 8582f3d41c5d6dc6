use stow_adapter::AdapterError;
use stow_types::{Identity, IndexKey, StorageKey, TypeError};

/// Coarse classification every [`StoreError`] falls into.
///
/// Callers branch on this to tell "doesn't exist" from "exists but broken"
/// from "can't reach storage" without matching every variant.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    /// Identity or index entry absent (or stale). Expected during lookups.
    NotFound,
    /// Bytes are present but cannot be turned back into an entity.
    Corrupt,
    /// Storage cannot be reached in time. Candidate for caller retry.
    BackendUnavailable,
    /// The entity broke the storable-entity contract or could not be
    /// encoded. Programmer error.
    InvalidEntity,
    /// A key or identity passed to a lookup is malformed.
    InvalidArgument,
    /// Configuration could not be loaded or parsed.
    Configuration,
}

/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No entity is stored under this identity.
    #[error("entity not found: {0}")]
    NotFound(Identity),

    /// The secondary index has no entry for this key.
    #[error("no index entry for {0}")]
    IndexNotFound(IndexKey),

    /// The index entry points at an entity that is gone or no longer
    /// carries the indexed value.
    #[error("stale index entry {key} -> {id}")]
    StaleIndex { key: IndexKey, id: Identity },

    /// Stored bytes could not be decoded.
    #[error("corrupt record {key}: {reason}")]
    Corrupt { key: StorageKey, reason: String },

    /// The stored entity is of a different kind than requested.
    #[error("entity {id} is stored as {found:?}, not {expected:?}")]
    KindMismatch {
        id: Identity,
        expected: &'static str,
        found: String,
    },

    /// The storage adapter failed or could not be reached.
    #[error("storage backend: {0}")]
    Backend(AdapterError),

    /// Another operation on the same identity held it past the timeout.
    #[error("timed out waiting for exclusive access to {0}")]
    Busy(Identity),

    /// The entity does not satisfy the storable-entity contract.
    #[error("invalid entity: {0}")]
    InvalidEntity(String),

    /// A key or identity supplied by the caller is malformed.
    #[error("invalid key: {0}")]
    InvalidKey(#[from] TypeError),

    /// The entity could not be encoded.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Store configuration is unreadable or malformed.
    #[error("configuration error: {0}")]
    Config(String),
}

impl StoreError {
    /// Classify this error.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound(_) | Self::IndexNotFound(_) | Self::StaleIndex { .. } => {
                ErrorKind::NotFound
            }
            Self::Corrupt { .. } | Self::KindMismatch { .. } => ErrorKind::Corrupt,
            Self::Backend(_) | Self::Busy(_) => ErrorKind::BackendUnavailable,
            Self::InvalidEntity(_) | Self::Serialization(_) => ErrorKind::InvalidEntity,
            Self::InvalidKey(_) => ErrorKind::InvalidArgument,
            Self::Config(_) => ErrorKind::Configuration,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }
}

impl From<AdapterError> for StoreError {
    fn from(err: AdapterError) -> Self {
        match err {
            AdapterError::Corrupt { key, reason } => Self::Corrupt { key, reason },
            other => Self::Backend(other),
        }
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
