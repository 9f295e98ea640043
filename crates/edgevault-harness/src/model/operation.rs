//! Operations for model-based testing.
//!
//! Operations represent every request a caller can make, plus the passage of
//! time. They are generated randomly by proptest and applied to both the
//! model and the real gateway and prekey manager.

use arbitrary::Arbitrary;

/// User index. Mapped onto a small identity space so operations collide.
pub type ModelUser = u8;

/// Number of distinct identities operations are spread over.
pub const MODEL_USERS: u8 = 4;

/// Identity string for a model user.
pub fn identity(user: ModelUser) -> String {
    format!("user-{}", user % MODEL_USERS)
}

/// Operations that can be applied to the system.
#[derive(Debug, Clone, Arbitrary)]
pub enum Operation {
    /// `POST session`.
    CreateSession {
        /// Target user
        user: ModelUser,
        /// Selects email and role
        variant: u8,
        /// Whether to send a display name
        named: bool,
    },

    /// `GET session`.
    GetSession {
        /// Target user
        user: ModelUser,
    },

    /// Validate (boolean get).
    ValidateSession {
        /// Target user
        user: ModelUser,
    },

    /// `PUT session`.
    RefreshSession {
        /// Target user
        user: ModelUser,
    },

    /// `DELETE session`.
    DeleteSession {
        /// Target user
        user: ModelUser,
    },

    /// Advance both clocks.
    AdvanceTime {
        /// Milliseconds to advance
        millis: u16,
    },

    /// Issue a prekey batch.
    GenerateBatch {
        /// Target user
        user: ModelUser,
        /// First key id
        start_id: u8,
        /// Batch size (0 and oversized batches are rejected)
        count: u8,
    },

    /// Consume one prekey.
    ConsumePrekey {
        /// Target user
        user: ModelUser,
        /// Key id
        key_id: u8,
    },

    /// List live prekeys.
    ExportPrekeys {
        /// Target user
        user: ModelUser,
    },
}

/// Session as both sides report it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelSession {
    /// Account email
    pub email: String,
    /// Account role
    pub role: String,
    /// Display name
    pub name: Option<String>,
    /// Creation time (Unix ms)
    pub created_at_ms: u64,
    /// Expiry time (Unix ms)
    pub expires_at_ms: u64,
}

impl ModelSession {
    /// Attributes selected by an operation's `variant`.
    pub fn attributes(variant: u8, named: bool) -> (String, String, Option<String>) {
        let email = format!("u{variant}@x.com");
        let role = if variant % 2 == 0 { "student" } else { "instructor" }.to_string();
        let name = named.then(|| format!("Name {variant}"));
        (email, role, name)
    }
}

/// Result of applying an operation.
///
/// Used to compare model and real system behavior.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum OperationResult {
    /// Mutation applied, nothing to report.
    Ok,
    /// Lookup result.
    Session(Option<ModelSession>),
    /// Validate result.
    Valid(bool),
    /// Whether a refresh applied.
    Refreshed(bool),
    /// Whether a delete removed something.
    Deleted(bool),
    /// Batch outcome: issued ids and ids that were still live.
    Issued {
        /// Issued ids, ascending
        issued: Vec<u32>,
        /// Rejected ids, ascending
        failed: Vec<u32>,
    },
    /// Live prekey ids, ascending.
    Prekeys(Vec<u32>),
    /// Consumed id.
    Consumed(u32),
    /// Expected failure.
    Error(OperationError),
}

/// Expected errors that can occur during operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OperationError {
    /// Prekey never issued or already consumed.
    NotFound,
    /// Batch parameters rejected.
    InvalidBatch,
}
