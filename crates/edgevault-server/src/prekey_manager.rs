//! Prekey Manager
//!
//! Issues one-time prekeys in bounded batches and hands out each private half
//! exactly once.
//!
//! Batches are not transactional. Each id is generated and stored on its own;
//! a failure is recorded against that id and the batch moves on, so earlier
//! ids stay issued and the caller learns exactly which ids to retry.
//!
//! Consumption is a single [`Storage::take_prekey`] call. There is no read
//! step before it, which is what makes concurrent consumers of the same id
//! see exactly one success.

use edgevault_core::{
    EdgeConfig, Environment, ErrorKind, KeyId, MAX_PREKEYS_PER_RESPONSE, PrekeyPair,
    PublicPrekey, config::MAX_BATCH_SIZE_LIMIT, session,
};
use thiserror::Error;

use crate::storage::{Storage, StorageError};

/// Errors from prekey operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PrekeyError {
    /// Never issued, or already consumed.
    #[error("prekey {key_id} not found")]
    NotFound {
        /// Requested id
        key_id: KeyId,
    },

    /// Storage failed. Nothing was applied; retryable.
    #[error("prekey storage failure: {0}")]
    Storage(#[from] StorageError),

    /// Identity rejected before reaching storage.
    #[error("invalid identity: {0}")]
    InvalidIdentity(&'static str),

    /// Batch parameters rejected before any key was generated.
    #[error("invalid batch: {0}")]
    InvalidBatch(String),
}

impl PrekeyError {
    /// Classification for callers.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::Storage(err) => err.kind(),
            Self::InvalidIdentity(_) | Self::InvalidBatch(_) => ErrorKind::InvalidRequest,
        }
    }

    /// Whether retrying the same call may succeed.
    pub fn is_retryable(&self) -> bool {
        self.kind().is_retryable()
    }
}

/// One id of a batch that was not issued.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BatchFailure {
    /// Id that failed
    pub key_id: KeyId,
    /// Why
    pub error: StorageError,
}

/// Per-id result of [`PrekeyManager::generate_batch`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct BatchOutcome {
    /// Issued public halves, ascending by id
    pub issued: Vec<PublicPrekey>,
    /// Ids that were not issued
    pub failed: Vec<BatchFailure>,
}

impl BatchOutcome {
    /// Whether every requested id was issued.
    pub fn is_complete(&self) -> bool {
        self.failed.is_empty()
    }

    /// Failed ids that may succeed if requested again.
    pub fn retry_ids(&self) -> Vec<KeyId> {
        self.failed.iter().filter(|f| f.error.is_retryable()).map(|f| f.key_id).collect()
    }
}

/// One page of [`PrekeyManager::export_page`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExportPage {
    /// Public halves, ascending by id
    pub prekeys: Vec<PublicPrekey>,
    /// Last id of this page when more live ids follow it
    pub next_after: Option<KeyId>,
}

/// Issues, lists and consumes one-time prekeys.
#[derive(Clone)]
pub struct PrekeyManager<E: Environment, S: Storage> {
    env: E,
    storage: S,
    config: EdgeConfig,
}

impl<E: Environment, S: Storage> PrekeyManager<E, S> {
    /// Create a manager over `storage`.
    pub fn new(env: E, storage: S, config: EdgeConfig) -> Self {
        Self { env, storage, config }
    }

    /// Underlying storage.
    pub fn storage(&self) -> &S {
        &self.storage
    }

    /// Generate and store `count` prekeys with ids `start_id..start_id+count`.
    ///
    /// Returns only public halves. Per-id failures (storage errors, an id
    /// still live or already consumed) are listed in
    /// [`BatchOutcome::failed`] and do not stop the batch.
    ///
    /// # Errors
    ///
    /// Whole-request errors only: invalid identity, `count` of zero or above
    /// `maxBatchSize` (never more than [`MAX_BATCH_SIZE_LIMIT`]), or an id
    /// range that overflows.
    pub fn generate_batch(
        &self,
        identity: &str,
        start_id: KeyId,
        count: u32,
    ) -> Result<BatchOutcome, PrekeyError> {
        check_identity(identity)?;

        let max = self.config.max_batch_size.min(MAX_BATCH_SIZE_LIMIT);
        if count == 0 || count > max {
            return Err(PrekeyError::InvalidBatch(format!(
                "count must be in 1..={max}, got {count}"
            )));
        }
        let Some(end_id) = start_id.checked_add(count - 1) else {
            return Err(PrekeyError::InvalidBatch(format!(
                "ids {start_id}+{count} overflow the key id space"
            )));
        };

        let mut outcome = BatchOutcome::default();
        for key_id in start_id..=end_id {
            let pair = PrekeyPair::generate(&self.env, key_id);
            match self.storage.store_prekey(identity, &pair) {
                Ok(()) => outcome.issued.push(pair.public()),
                Err(error) => {
                    tracing::warn!(identity, key_id, error = %error, "prekey not issued");
                    outcome.failed.push(BatchFailure { key_id, error });
                },
            }
        }

        tracing::info!(
            identity,
            start_id,
            issued = outcome.issued.len(),
            failed = outcome.failed.len(),
            "prekey batch issued"
        );
        Ok(outcome)
    }

    /// Batch using the configured `defaultStartId` and `defaultBatchSize`.
    pub fn generate_default_batch(&self, identity: &str) -> Result<BatchOutcome, PrekeyError> {
        self.generate_batch(identity, self.config.default_start_id, self.config.default_batch_size)
    }

    /// Public halves of every live prekey, ascending by id.
    ///
    /// Consumed ids never appear.
    pub fn export_public(&self, identity: &str) -> Result<Vec<PublicPrekey>, PrekeyError> {
        check_identity(identity)?;
        self.storage.list_prekeys(identity).map_err(|e| {
            tracing::warn!(identity, error = %e, "prekey export failed");
            PrekeyError::Storage(e)
        })
    }

    /// Up to `limit` live public halves with ids above `after`, ascending.
    ///
    /// `limit` is capped at [`MAX_PREKEYS_PER_RESPONSE`] so a page always fits
    /// one response. Pass the returned `next_after` back as `after` to
    /// continue; `None` means the listing is complete.
    pub fn export_page(
        &self,
        identity: &str,
        after: Option<KeyId>,
        limit: usize,
    ) -> Result<ExportPage, PrekeyError> {
        let limit = limit.clamp(1, MAX_PREKEYS_PER_RESPONSE);
        let mut remaining = self
            .export_public(identity)?
            .into_iter()
            .filter(|p| after.is_none_or(|after| p.key_id > after));

        let prekeys: Vec<PublicPrekey> = remaining.by_ref().take(limit).collect();
        let next_after = match remaining.next() {
            Some(_) => prekeys.last().map(|p| p.key_id),
            None => None,
        };
        Ok(ExportPage { prekeys, next_after })
    }

    /// Take the keypair for `key_id`, removing it.
    ///
    /// Succeeds at most once per key id, ever: storage remembers consumed ids
    /// and refuses to issue them again. Retrying after a success reports
    /// [`PrekeyError::NotFound`]; retrying after a storage failure may succeed,
    /// since a failed take removes nothing.
    pub fn consume(&self, identity: &str, key_id: KeyId) -> Result<PrekeyPair, PrekeyError> {
        check_identity(identity)?;

        match self.storage.take_prekey(identity, key_id) {
            Ok(Some(pair)) => {
                tracing::debug!(identity, key_id, "prekey consumed");
                Ok(pair)
            },
            Ok(None) => {
                tracing::warn!(identity, key_id, "prekey absent or already consumed");
                Err(PrekeyError::NotFound { key_id })
            },
            Err(e) => {
                tracing::error!(identity, key_id, error = %e, "prekey consume failed");
                Err(PrekeyError::Storage(e))
            },
        }
    }
}

fn check_identity(identity: &str) -> Result<(), PrekeyError> {
    match session::identity_problem(identity) {
        Some(problem) => Err(PrekeyError::InvalidIdentity(problem)),
        None => Ok(()),
    }
}

#[cfg(test)]
mod tests {
    use edgevault_harness::SimEnv;

    use super::*;
    use crate::storage::{ChaoticStorage, MemoryStorage};

    fn manager() -> PrekeyManager<SimEnv, MemoryStorage> {
        PrekeyManager::new(SimEnv::with_seed(7), MemoryStorage::new(), EdgeConfig::default())
    }

    #[test]
    fn batch_returns_sequential_public_halves() {
        let manager = manager();
        let outcome = manager.generate_batch("u1", 1000, 3).unwrap();

        assert!(outcome.is_complete());
        let ids: Vec<KeyId> = outcome.issued.iter().map(|p| p.key_id).collect();
        assert_eq!(ids, vec![1000, 1001, 1002]);
    }

    #[test]
    fn default_batch_uses_configured_options() {
        let manager = manager();
        let outcome = manager.generate_default_batch("u1").unwrap();

        assert_eq!(outcome.issued.len(), 20);
        assert_eq!(outcome.issued.first().map(|p| p.key_id), Some(1000));
        assert_eq!(outcome.issued.last().map(|p| p.key_id), Some(1019));
    }

    #[test]
    fn consumed_key_matches_issued_public_half() {
        let manager = manager();
        let outcome = manager.generate_batch("u1", 1, 2).unwrap();

        let pair = manager.consume("u1", 2).unwrap();
        assert_eq!(pair.public(), outcome.issued[1]);
        assert!(pair.public_matches());

        assert_eq!(manager.consume("u1", 2), Err(PrekeyError::NotFound { key_id: 2 }));
    }

    #[test]
    fn invalid_batches_are_rejected_whole() {
        let manager = manager();

        assert!(matches!(
            manager.generate_batch("u1", 1, 0),
            Err(PrekeyError::InvalidBatch(_))
        ));
        assert!(matches!(
            manager.generate_batch("u1", 1, 1001),
            Err(PrekeyError::InvalidBatch(_))
        ));
        assert!(matches!(
            manager.generate_batch("u1", KeyId::MAX, 2),
            Err(PrekeyError::InvalidBatch(_))
        ));
        assert_eq!(manager.storage().prekey_count().unwrap(), 0);

        // The last id of the space is still issuable.
        assert!(manager.generate_batch("u1", KeyId::MAX, 1).unwrap().is_complete());
    }

    #[test]
    fn overlapping_batch_reports_live_ids() {
        let manager = manager();
        manager.generate_batch("u1", 10, 3).unwrap();

        let outcome = manager.generate_batch("u1", 12, 2).unwrap();
        assert_eq!(outcome.issued.len(), 1);
        assert_eq!(outcome.issued[0].key_id, 13);
        assert_eq!(outcome.failed.len(), 1);
        assert_eq!(outcome.failed[0].key_id, 12);
        assert!(outcome.retry_ids().is_empty());
    }

    #[test]
    fn consumed_id_is_retired() {
        let manager = manager();
        manager.generate_batch("u1", 1001, 1).unwrap();
        manager.consume("u1", 1001).unwrap();

        let reissue = manager.generate_batch("u1", 1001, 1).unwrap();
        assert!(reissue.issued.is_empty());
        assert_eq!(reissue.failed.len(), 1);
        assert!(matches!(reissue.failed[0].error, StorageError::Conflict { key_id: 1001, .. }));
        assert!(reissue.retry_ids().is_empty());

        assert_eq!(manager.consume("u1", 1001), Err(PrekeyError::NotFound { key_id: 1001 }));
    }

    #[test]
    fn storage_failures_are_listed_for_retry() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 1.0);
        let manager = PrekeyManager::new(SimEnv::with_seed(1), chaotic, EdgeConfig::default());

        let outcome = manager.generate_batch("u1", 1, 3).unwrap();
        assert!(outcome.issued.is_empty());
        assert_eq!(outcome.retry_ids(), vec![1, 2, 3]);

        let err = manager.consume("u1", 1).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::StorageFailure);
    }

    #[test]
    fn batch_cap_holds_even_without_validated_config() {
        let config = EdgeConfig { max_batch_size: 10_000, ..EdgeConfig::default() };
        let manager = PrekeyManager::new(SimEnv::with_seed(3), MemoryStorage::new(), config);

        assert!(matches!(
            manager.generate_batch("u1", 1, MAX_BATCH_SIZE_LIMIT + 1),
            Err(PrekeyError::InvalidBatch(_))
        ));
        assert!(manager.generate_batch("u1", 1, MAX_BATCH_SIZE_LIMIT).unwrap().is_complete());
    }

    #[test]
    fn export_pages_walk_every_live_id() {
        let manager = manager();
        manager.generate_batch("u1", 1, 5).unwrap();
        manager.consume("u1", 3).unwrap();

        let first = manager.export_page("u1", None, 2).unwrap();
        assert_eq!(first.prekeys.iter().map(|p| p.key_id).collect::<Vec<_>>(), vec![1, 2]);
        assert_eq!(first.next_after, Some(2));

        let second = manager.export_page("u1", first.next_after, 2).unwrap();
        assert_eq!(second.prekeys.iter().map(|p| p.key_id).collect::<Vec<_>>(), vec![4, 5]);
        assert_eq!(second.next_after, None);

        let exact = manager.export_page("u1", None, 4).unwrap();
        assert_eq!(exact.prekeys.len(), 4);
        assert_eq!(exact.next_after, None);

        assert!(manager.export_page("nobody", None, 10).unwrap().prekeys.is_empty());
    }

    #[test]
    fn keyspaces_are_per_identity() {
        let manager = manager();
        manager.generate_batch("alice", 1, 1).unwrap();

        assert_eq!(manager.consume("bob", 1), Err(PrekeyError::NotFound { key_id: 1 }));
        assert!(manager.consume("alice", 1).is_ok());
    }
}
