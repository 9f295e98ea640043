//! Storage error types.

use edgevault_core::{ErrorKind, KeyId};
use thiserror::Error;

/// Errors returned by [`Storage`](super::Storage) implementations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Backend unavailable or the operation could not complete.
    ///
    /// Nothing was applied; the same call may be retried.
    #[error("storage I/O error: {0}")]
    Io(String),

    /// A stored value could not be encoded or decoded.
    #[error("storage serialization error: {0}")]
    Serialization(String),

    /// A prekey with this id is live for the identity, or was consumed.
    #[error("prekey {key_id} was already issued for identity {identity:?}")]
    Conflict {
        /// Owning identity
        identity: String,
        /// Conflicting key id
        key_id: KeyId,
    },
}

impl StorageError {
    /// Classification for callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::Serialization(_) => ErrorKind::StorageFailure,
            Self::Conflict { .. } => ErrorKind::InvalidRequest,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}
