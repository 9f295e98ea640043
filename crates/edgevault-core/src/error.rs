//! Error classification shared by every layer.
//!
//! Each layer keeps its own strongly-typed error enum; [`ErrorKind`] is the
//! coarse classification that crosses the wire and drives caller behaviour
//! (re-login, new handshake, retry, fix the request).

use serde::{Deserialize, Serialize};

/// What a caller should do about a failed operation.
///
/// Expired sessions are deliberately absent: at the request boundary an
/// expired session is indistinguishable from one that never existed. The
/// distinction exists only in logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    /// Session absent, or prekey never issued / already consumed.
    NotFound,
    /// Persistence unavailable. Retryable; never conflated with `NotFound`.
    StorageFailure,
    /// Key material failed to decode.
    MalformedKey,
    /// Request rejected before reaching storage (bad identity, bad batch).
    InvalidRequest,
}

impl ErrorKind {
    /// Whether retrying the same request may succeed.
    pub fn is_retryable(self) -> bool {
        matches!(self, Self::StorageFailure)
    }
}
