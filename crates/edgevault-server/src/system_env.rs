//! Host clock and OS entropy.
//!
//! [`SystemEnv`] backs [`Environment`] with `std::time` for elapsed and
//! wall-clock time, tokio for sleeping and `getrandom` for prekey private
//! halves. Nothing here is reproducible; simulation uses the harness instead.

use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use edgevault_core::{Environment, env::duration_millis};

/// Environment of the running server process.
///
/// Every private prekey is drawn from the OS RNG through `getrandom`
/// (`getrandom(2)` on Linux, `BCryptGenRandom` on Windows).
///
/// # Panics
///
/// `random_bytes` panics if the OS RNG fails. Minting key material from
/// anything else is not an option.
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Environment over the host clock and RNG.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    type Instant = Instant;

    #[allow(clippy::disallowed_methods)]
    fn now(&self) -> Instant {
        Instant::now()
    }

    /// A host clock set before 1970 reads as 0, which expires nothing.
    #[allow(clippy::disallowed_methods)]
    fn wall_clock_millis(&self) -> u64 {
        match SystemTime::now().duration_since(UNIX_EPOCH) {
            Ok(since_epoch) => duration_millis(since_epoch),
            Err(_) => 0,
        }
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    #[allow(clippy::expect_used)]
    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).expect("OS RNG unavailable; refusing to mint key material");
    }
}
