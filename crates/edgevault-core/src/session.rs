//! Session records.
//!
//! A [`SessionRecord`] belongs to exactly one identity. Attributes are replaced
//! wholesale on create; refresh only moves `expires_at_ms` forward. Records
//! carry wall-clock milliseconds so they remain meaningful after a restart.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::env::duration_millis;

/// Maximum identity length in bytes.
pub const MAX_IDENTITY_LEN: usize = 256;

/// Caller-supplied session attributes.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionAttributes {
    /// Account email.
    pub email: String,
    /// Optional display name.
    pub display_name: Option<String>,
    /// Account role (e.g. "student").
    pub role: String,
}

impl SessionAttributes {
    /// Attributes without a display name.
    pub fn new(email: impl Into<String>, role: impl Into<String>) -> Self {
        Self { email: email.into(), display_name: None, role: role.into() }
    }

    /// Set the display name.
    #[must_use]
    pub fn with_display_name(mut self, name: impl Into<String>) -> Self {
        self.display_name = Some(name.into());
        self
    }
}

/// Authentication session state for one identity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionRecord {
    /// Owning identity. Immutable.
    pub identity: String,
    /// Attributes from the most recent create.
    pub attributes: SessionAttributes,
    /// Creation time (Unix ms). Immutable.
    pub created_at_ms: u64,
    /// Expiry time (Unix ms). Never decreases.
    pub expires_at_ms: u64,
}

impl SessionRecord {
    /// New record created at `now_ms`, valid for `window`.
    pub fn new(
        identity: impl Into<String>,
        attributes: SessionAttributes,
        now_ms: u64,
        window: Duration,
    ) -> Self {
        Self {
            identity: identity.into(),
            attributes,
            created_at_ms: now_ms,
            expires_at_ms: now_ms.saturating_add(duration_millis(window)),
        }
    }

    /// Whether the record must be treated as absent at `now_ms`.
    ///
    /// A record is still valid at the exact instant it expires.
    pub fn is_expired_at(&self, now_ms: u64) -> bool {
        self.expires_at_ms < now_ms
    }

    /// Slide expiry to `now_ms + window`.
    ///
    /// Never moves expiry backwards, even if the wall clock stepped back.
    pub fn refresh(&mut self, now_ms: u64, window: Duration) {
        let candidate = now_ms.saturating_add(duration_millis(window));
        self.expires_at_ms = self.expires_at_ms.max(candidate);
    }
}

/// Internal lookup outcome.
///
/// `Expired` and `Missing` both surface as "absent" to callers; the split
/// exists so the two can be logged and counted separately.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SessionStatus {
    /// A valid record.
    Active(SessionRecord),
    /// A record existed but had passed its expiry; it has been evicted.
    Expired {
        /// Expiry of the evicted record
        expired_at_ms: u64,
    },
    /// No record.
    Missing,
}

impl SessionStatus {
    /// The record, if active.
    pub fn into_active(self) -> Option<SessionRecord> {
        match self {
            Self::Active(record) => Some(record),
            Self::Expired { .. } | Self::Missing => None,
        }
    }

    /// Whether a valid record was found.
    pub fn is_active(&self) -> bool {
        matches!(self, Self::Active(_))
    }
}

/// Validate an identity key.
///
/// Returns a description of the problem, or `None` if the identity is usable.
pub fn identity_problem(identity: &str) -> Option<&'static str> {
    if identity.is_empty() {
        Some("identity must not be empty")
    } else if identity.len() > MAX_IDENTITY_LEN {
        Some("identity exceeds 256 bytes")
    } else {
        None
    }
}
