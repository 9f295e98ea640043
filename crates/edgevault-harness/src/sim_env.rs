//! Simulation environment with virtual time and seeded randomness.
//!
//! Time follows tokio's clock, which turmoil drives in simulations and which
//! `#[tokio::test(start_paused = true)]` freezes until something sleeps. On top
//! of that, [`SimEnv::advance`] jumps the clock forward without sleeping, so a
//! test can move past a session's expiry in one call.
//!
//! Randomness comes from a ChaCha20 stream seeded at construction: the same
//! seed yields the same prekeys, byte for byte.

#![allow(clippy::disallowed_types, reason = "Locking RNG state for synchronous draws")]

use std::{
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use edgevault_core::{Environment, env::duration_millis};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Wall-clock reading of a fresh environment: 2023-11-14T22:13:20Z.
pub const SIM_EPOCH_MS: u64 = 1_700_000_000_000;

/// Deterministic environment for simulation and tests.
///
/// Clones share the clock offset and the RNG stream.
#[derive(Clone)]
pub struct SimEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
    start: tokio::time::Instant,
    offset_ms: Arc<AtomicU64>,
}

impl SimEnv {
    /// Environment seeded with 0.
    pub fn new() -> Self {
        Self::with_seed(0)
    }

    /// Environment with an explicit RNG seed.
    pub fn with_seed(seed: u64) -> Self {
        Self {
            rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))),
            start: tokio::time::Instant::now(),
            offset_ms: Arc::new(AtomicU64::new(0)),
        }
    }

    /// Move both clocks forward by `duration` without sleeping.
    ///
    /// Sleepers are not woken; only readings of `now` and
    /// `wall_clock_millis` change.
    pub fn advance(&self, duration: Duration) {
        self.offset_ms.fetch_add(duration_millis(duration), Ordering::SeqCst);
    }

    fn offset(&self) -> Duration {
        Duration::from_millis(self.offset_ms.load(Ordering::SeqCst))
    }
}

impl Default for SimEnv {
    fn default() -> Self {
        Self::new()
    }
}

impl Environment for SimEnv {
    type Instant = tokio::time::Instant;

    fn now(&self) -> Self::Instant {
        tokio::time::Instant::now() + self.offset()
    }

    fn wall_clock_millis(&self) -> u64 {
        let elapsed = self.now().saturating_duration_since(self.start);
        SIM_EPOCH_MS.saturating_add(duration_millis(elapsed))
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        // A panic elsewhere cannot leave a ChaCha state half-written.
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}
