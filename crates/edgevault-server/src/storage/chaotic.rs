//! Chaotic storage wrapper for fault injection testing
//!
//! Storage wrapper that randomly fails operations to test error handling and
//! recovery. An injected failure happens before the inner call, so a failed
//! operation never applies anything, matching the [`Storage`] contract.

#![allow(clippy::disallowed_types, reason = "Locking simple RNG state")]

use std::sync::{
    Arc, Mutex,
    atomic::{AtomicUsize, Ordering},
};

use edgevault_core::{KeyId, PrekeyPair, PublicPrekey, SessionRecord};

use super::{Storage, StorageError};

/// Chaotic storage wrapper that randomly injects failures
///
/// Delegates to an underlying storage implementation but randomly fails
/// operations based on a configured failure rate. Clones share the RNG, so a
/// seeded wrapper produces one reproducible failure sequence no matter how
/// many components hold it.
#[derive(Clone)]
pub struct ChaoticStorage<S: Storage> {
    inner: S,
    /// Failure rate (0.0 = never fail, 1.0 = always fail)
    failure_rate: f64,
    /// RNG state for deterministic chaos
    rng: Arc<Mutex<ChaoticRng>>,
    /// Operations attempted
    operation_count: Arc<AtomicUsize>,
    /// Operations failed by injection
    injected_failures: Arc<AtomicUsize>,
}

/// Simple deterministic RNG for chaos injection
///
/// Linear congruential generator: fast, and reproducible from a seed.
struct ChaoticRng {
    state: u64,
}

impl ChaoticRng {
    fn new(seed: u64) -> Self {
        Self { state: seed }
    }

    /// Next value in [0.0, 1.0)
    fn next(&mut self) -> f64 {
        // LCG constants from Numerical Recipes
        const A: u64 = 1_664_525;
        const C: u64 = 1_013_904_223;
        const M: u64 = 1u64 << 32;

        self.state = (A.wrapping_mul(self.state).wrapping_add(C)) % M;
        (self.state as f64) / (M as f64)
    }
}

impl<S: Storage> ChaoticStorage<S> {
    /// Create a new chaotic storage wrapper with a fixed default seed.
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn new(inner: S, failure_rate: f64) -> Self {
        Self::with_seed(inner, failure_rate, 0x1234_5678_9ABC_DEF0)
    }

    /// Create with explicit seed for reproducible chaos
    ///
    /// # Panics
    ///
    /// Panics if `failure_rate` is not in [0.0, 1.0]
    pub fn with_seed(inner: S, failure_rate: f64, seed: u64) -> Self {
        assert!(
            (0.0..=1.0).contains(&failure_rate),
            "failure_rate must be between 0.0 and 1.0, got {failure_rate}"
        );

        Self {
            inner,
            failure_rate,
            rng: Arc::new(Mutex::new(ChaoticRng::new(seed))),
            operation_count: Arc::new(AtomicUsize::new(0)),
            injected_failures: Arc::new(AtomicUsize::new(0)),
        }
    }

    /// Underlying storage (for checking invariants after chaos).
    pub fn inner(&self) -> &S {
        &self.inner
    }

    /// Total number of storage operations attempted.
    pub fn operation_count(&self) -> usize {
        self.operation_count.load(Ordering::Relaxed)
    }

    /// Number of operations failed by injection.
    pub fn injected_failures(&self) -> usize {
        self.injected_failures.load(Ordering::Relaxed)
    }

    /// Count the operation and decide whether it fails.
    fn inject(&self, operation: &'static str) -> Result<(), StorageError> {
        self.operation_count.fetch_add(1, Ordering::Relaxed);

        let roll = self
            .rng
            .lock()
            .map_err(|_| StorageError::Io("chaos rng lock poisoned".to_string()))?
            .next();

        if roll < self.failure_rate {
            self.injected_failures.fetch_add(1, Ordering::Relaxed);
            tracing::trace!(operation, "injecting storage failure");
            return Err(StorageError::Io(format!("chaotic failure injection: {operation}")));
        }
        Ok(())
    }
}

impl<S: Storage> Storage for ChaoticStorage<S> {
    fn store_session(&self, record: &SessionRecord) -> Result<(), StorageError> {
        self.inject("store_session")?;
        self.inner.store_session(record)
    }

    fn load_session(&self, identity: &str) -> Result<Option<SessionRecord>, StorageError> {
        self.inject("load_session")?;
        self.inner.load_session(identity)
    }

    fn delete_session(&self, identity: &str) -> Result<bool, StorageError> {
        self.inject("delete_session")?;
        self.inner.delete_session(identity)
    }

    fn list_sessions(&self) -> Result<Vec<SessionRecord>, StorageError> {
        self.inject("list_sessions")?;
        self.inner.list_sessions()
    }

    fn store_prekey(&self, identity: &str, pair: &PrekeyPair) -> Result<(), StorageError> {
        self.inject("store_prekey")?;
        self.inner.store_prekey(identity, pair)
    }

    fn take_prekey(
        &self,
        identity: &str,
        key_id: KeyId,
    ) -> Result<Option<PrekeyPair>, StorageError> {
        self.inject("take_prekey")?;
        self.inner.take_prekey(identity, key_id)
    }

    fn list_prekeys(&self, identity: &str) -> Result<Vec<PublicPrekey>, StorageError> {
        self.inject("list_prekeys")?;
        self.inner.list_prekeys(identity)
    }
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use edgevault_core::{PrivateKey, SessionAttributes};

    use super::*;
    use crate::storage::MemoryStorage;

    fn record(i: u64) -> SessionRecord {
        SessionRecord::new(
            format!("user-{i}"),
            SessionAttributes::new("a@x.com", "student"),
            i,
            Duration::from_secs(1),
        )
    }

    #[test]
    fn test_chaotic_with_zero_failure_rate() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 0.0);

        for i in 0..100 {
            chaotic.store_session(&record(i)).expect("should not fail with 0% rate");
        }

        assert_eq!(chaotic.list_sessions().expect("query failed").len(), 100);
        assert_eq!(chaotic.injected_failures(), 0);
    }

    #[test]
    fn test_chaotic_with_100_failure_rate() {
        let chaotic = ChaoticStorage::new(MemoryStorage::new(), 1.0);

        assert!(chaotic.store_session(&record(0)).is_err());
        assert!(chaotic.load_session("user-0").is_err());
        assert!(chaotic.take_prekey("user-0", 1).is_err());
        assert_eq!(chaotic.operation_count(), 3);
        assert_eq!(chaotic.inner().session_count().unwrap(), 0);
    }

    #[test]
    fn test_failed_take_leaves_prekey_in_place() {
        let memory = MemoryStorage::new();
        let private_key = PrivateKey::from_bytes([9; 32]);
        let pair = PrekeyPair { key_id: 3, public_key: private_key.public_key(), private_key };
        memory.store_prekey("u", &pair).unwrap();

        let chaotic = ChaoticStorage::new(memory.clone(), 1.0);
        assert!(chaotic.take_prekey("u", 3).is_err());
        assert_eq!(memory.take_prekey("u", 3).unwrap(), Some(pair));
    }

    #[test]
    fn test_chaotic_deterministic_with_seed() {
        let chaotic1 = ChaoticStorage::with_seed(MemoryStorage::new(), 0.5, 42);
        let chaotic2 = ChaoticStorage::with_seed(MemoryStorage::new(), 0.5, 42);

        for i in 0..100 {
            let result1 = chaotic1.store_session(&record(i));
            let result2 = chaotic2.store_session(&record(i));

            assert_eq!(result1.is_ok(), result2.is_ok(), "determinism violated at iteration {i}");
        }
    }
}
