use thiserror::Error;

/// Errors produced by type construction and parsing.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid identity {token:?}: {reason}")]
    InvalidIdentity { token: String, reason: &'static str },

    #[error("invalid index key {name:?}: {reason}")]
    InvalidIndexKey { name: String, reason: &'static str },

    #[error("malformed storage key: {0}")]
    MalformedKey(String),
}
