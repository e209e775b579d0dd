//! Environment abstraction for deterministic testing.
//!
//! The `Environment` trait decouples the loops from system resources (time,
//! randomness), so the same driver code runs against the system clock in
//! production and a seeded clock/RNG in tests.
//!
//! # Invariants
//!
//! - Monotonicity: `env.now()` must never go backwards
//! - Determinism: given the same seed, `random_bytes()` produces the same
//!   sequence
//! - Isolation: implementations must not share hidden global state

use std::time::{Duration, Instant};

use rand::{CryptoRng, RngCore};

/// Abstract environment providing time and randomness.
///
/// # Safety
///
/// Implementations MUST guarantee:
///
/// 1. Time monotonicity: `now()` never goes backwards
/// 2. RNG quality: `random_bytes()` uses cryptographically secure entropy in
///    production - envelope seals and ephemeral dummy keys are derived from
///    it directly
pub trait Environment: Clone + Send + Sync + 'static {
    /// Returns the current time.
    fn now(&self) -> Instant;

    /// Sleeps for the specified duration.
    ///
    /// This is the ONLY async method in the trait, and it is only used by
    /// driver code between cycles, never inside protocol logic.
    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send;

    /// Fills the provided buffer with random bytes.
    fn random_bytes(&self, buffer: &mut [u8]);

    /// Borrow this environment as an [`RngCore`] + [`CryptoRng`] for the
    /// crypto layer's caller-provided-entropy APIs.
    fn rng(&self) -> EnvRng<'_, Self>
    where
        Self: Sized,
    {
        EnvRng(self)
    }
}

/// RNG adapter over an [`Environment`].
///
/// The crypto layer takes `RngCore + CryptoRng`; this bridges those bounds
/// to `Environment::random_bytes` without committing to any RNG type.
pub struct EnvRng<'a, E: Environment>(&'a E);

impl<E: Environment> RngCore for EnvRng<'_, E> {
    fn next_u32(&mut self) -> u32 {
        let mut bytes = [0u8; 4];
        self.0.random_bytes(&mut bytes);
        u32::from_be_bytes(bytes)
    }

    fn next_u64(&mut self) -> u64 {
        let mut bytes = [0u8; 8];
        self.0.random_bytes(&mut bytes);
        u64::from_be_bytes(bytes)
    }

    fn fill_bytes(&mut self, dest: &mut [u8]) {
        self.0.random_bytes(dest);
    }

    fn try_fill_bytes(&mut self, dest: &mut [u8]) -> Result<(), rand::Error> {
        self.0.random_bytes(dest);
        Ok(())
    }
}

// The trait contract requires implementations to source `random_bytes` from
// a cryptographically secure generator.
impl<E: Environment> CryptoRng for EnvRng<'_, E> {}
