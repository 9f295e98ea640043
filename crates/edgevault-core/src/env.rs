//! Time and randomness as injected capabilities.
//!
//! Session expiry and prekey generation never read the host clock or RNG
//! directly. The server passes a system-backed [`Environment`]; tests pass a
//! simulated one with a virtual clock and seeded RNG, so every expiry and
//! every generated key is reproducible.

use std::time::Duration;

/// Clock, sleep and entropy for session and prekey logic.
///
/// Implementations must keep `now()` monotonic and must draw
/// `random_bytes()` from a cryptographically secure source outside of
/// simulation. No method fails short of OS entropy exhaustion.
pub trait Environment: Clone + Send + Sync + 'static {
    /// Monotonic instant: `std::time::Instant` on the host, tokio's virtual
    /// instant under a paused or turmoil-driven clock.
    type Instant: Copy + Ord + Send + Sync + std::ops::Sub<Output = Duration>;

    /// Monotonic time for measuring elapsed intervals. Never persisted.
    fn now(&self) -> Self::Instant;

    /// Milliseconds since the Unix epoch.
    ///
    /// `created_at_ms` and `expires_at_ms` are stored and must stay meaningful
    /// across restarts, so they come from here rather than [`Self::now`].
    /// Simulated environments never go backwards. The system clock can; a
    /// backwards step lengthens a session but never revives an evicted one.
    fn wall_clock_millis(&self) -> u64;

    /// Sleep for `duration`.
    ///
    /// Only the expiry sweeper waits on this. Actors and the prekey manager
    /// never sleep.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fill `buffer` with random bytes. A seeded environment yields the same
    /// bytes for the same seed.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Random `u64`, used for connection ids.
    fn random_u64(&self) -> u64 {
        let mut bytes = [0u8; 8];
        self.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }
}

/// Convert a duration to whole milliseconds, saturating at `u64::MAX`.
pub fn duration_millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}
