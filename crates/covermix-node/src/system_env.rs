//! Production Environment implementation using system time and RNG.

use std::time::Duration;

use covermix_core::Environment;

/// Production environment using system time and cryptographic RNG.
///
/// - `std::time::Instant::now()` for time
/// - `tokio::time::sleep()` for async sleeping
/// - `getrandom` (OS entropy pool) for randomness
///
/// # Security
///
/// Every seal, nonce, and ephemeral dummy key in the pipeline draws from
/// `random_bytes`, so this implementation must never be swapped for a
/// non-cryptographic generator.
#[derive(Clone, Default)]
pub struct SystemEnv;

impl SystemEnv {
    /// Create a new system environment.
    #[must_use]
    pub fn new() -> Self {
        Self
    }
}

impl Environment for SystemEnv {
    fn now(&self) -> std::time::Instant {
        std::time::Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        getrandom::fill(buffer).unwrap_or_else(|e| {
            // NOTE: This should never fail on supported platforms; if it
            // does, refusing to emit predictable bytes matters more than
            // this process staying up.
            tracing::error!("getrandom failed: {}", e);
            std::process::abort();
        });
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_env_time_advances() {
        let env = SystemEnv::new();

        let t1 = env.now();
        std::thread::sleep(Duration::from_millis(10));
        let t2 = env.now();

        assert!(t2 > t1, "Time should advance");
    }

    #[test]
    fn system_env_random_bytes_are_random() {
        let env = SystemEnv::new();

        let mut bytes1 = [0u8; 32];
        let mut bytes2 = [0u8; 32];

        env.random_bytes(&mut bytes1);
        env.random_bytes(&mut bytes2);

        assert_ne!(bytes1, bytes2, "Random bytes should differ");
    }

    #[tokio::test]
    async fn system_env_sleep_works() {
        let env = SystemEnv::new();

        let start = env.now();
        env.sleep(Duration::from_millis(50)).await;
        let elapsed = env.now() - start;

        assert!(elapsed >= Duration::from_millis(50), "Sleep should wait at least 50ms");
    }
}
