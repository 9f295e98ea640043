//! Server runtime error types.

use edgevault_core::{ConfigError, ErrorKind, WireError};
use thiserror::Error;

use crate::storage::StorageError;

/// Errors that can occur in the server runtime.
#[derive(Error, Debug)]
pub enum ServerError {
    /// Configuration error (invalid bind address, invalid options, etc.).
    ///
    /// Fatal; prevents startup. Fix configuration and restart.
    #[error("configuration error: {0}")]
    Config(String),

    /// Transport/network error (bind failure, I/O error, closed socket).
    ///
    /// Fatal for the affected connection; the server keeps serving others.
    #[error("transport error: {0}")]
    Transport(String),

    /// Malformed frame or payload from a peer.
    #[error("protocol error: {0}")]
    Protocol(String),

    /// Storage could not be opened.
    #[error("storage error: {0}")]
    Storage(#[from] StorageError),
}

impl ServerError {
    /// Classification for callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Config(_) | Self::Protocol(_) => ErrorKind::InvalidRequest,
            // Retryable, like an unavailable backend.
            Self::Transport(_) => ErrorKind::StorageFailure,
            Self::Storage(err) => err.kind(),
        }
    }

    /// Whether retrying may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

impl From<std::io::Error> for ServerError {
    fn from(err: std::io::Error) -> Self {
        Self::Transport(err.to_string())
    }
}

impl From<ConfigError> for ServerError {
    fn from(err: ConfigError) -> Self {
        Self::Config(err.to_string())
    }
}

impl From<WireError> for ServerError {
    fn from(err: WireError) -> Self {
        Self::Protocol(err.to_string())
    }
}
