//! Storage abstraction for sessions and prekeys.
//!
//! Trait-based abstraction so the same actor and manager logic runs against
//! in-memory, durable, and fault-injecting backends. The trait is synchronous;
//! every call completes one indivisible backend operation.

mod chaotic;
mod error;
mod memory;
mod redb;

pub use chaotic::ChaoticStorage;
use edgevault_core::{KeyId, PrekeyPair, PublicPrekey, SessionRecord};
pub use error::StorageError;
pub use memory::MemoryStorage;

pub use self::redb::RedbStorage;

/// Storage for session records and prekey material.
///
/// Must be Clone (shared by the gateway, actors and prekey manager), Send +
/// Sync (thread-safe), and synchronous. Implementations share internal state
/// via Arc, so clones access the same underlying storage.
///
/// A failed call applies nothing. Implementations never panic on lock
/// poisoning; they report [`StorageError::Io`].
pub trait Storage: Clone + Send + Sync + 'static {
    /// Store a session record, replacing any previous record for the identity.
    fn store_session(&self, record: &SessionRecord) -> Result<(), StorageError>;

    /// Load the session record for an identity, expired or not.
    ///
    /// Expiry is the caller's concern; storage returns what it holds.
    fn load_session(&self, identity: &str) -> Result<Option<SessionRecord>, StorageError>;

    /// Remove the session record for an identity.
    ///
    /// Returns whether a record existed. Idempotent.
    fn delete_session(&self, identity: &str) -> Result<bool, StorageError>;

    /// All stored session records. Order is not guaranteed.
    ///
    /// Used by the expiry sweep to find records nobody has read recently.
    fn list_sessions(&self) -> Result<Vec<SessionRecord>, StorageError>;

    /// Store a prekey for an identity.
    ///
    /// # Errors
    ///
    /// [`StorageError::Conflict`] if the id is still live for the identity or
    /// was ever taken. Unconsumed key material is never overwritten, and a
    /// consumed id is never issued again.
    fn store_prekey(&self, identity: &str, pair: &PrekeyPair) -> Result<(), StorageError>;

    /// Remove a prekey and return it, as one indivisible step.
    ///
    /// Returns `None` if the id was never stored or was already taken. Of any
    /// number of calls for the same `(identity, key_id)`, concurrent or not,
    /// at most one observes `Some`. The same step records the id as consumed.
    fn take_prekey(
        &self,
        identity: &str,
        key_id: KeyId,
    ) -> Result<Option<PrekeyPair>, StorageError>;

    /// Public halves of the live prekeys for an identity, ascending by id.
    fn list_prekeys(&self, identity: &str) -> Result<Vec<PublicPrekey>, StorageError>;
}
