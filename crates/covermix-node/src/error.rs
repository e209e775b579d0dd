//! Node error types.
//!
//! Unlike the per-envelope drop values inside the pipeline, everything here
//! is fatal at process start: missing key files, bad key material, or an
//! unusable relay mean the node must not come up.

use covermix_core::{ConfigError, RelayError};
use covermix_crypto::CryptoError;
use thiserror::Error;

/// Fatal startup errors for the node binary.
#[derive(Debug, Error)]
pub enum NodeError {
    /// Key file could not be read or written.
    #[error("key file I/O failed: {0}")]
    Io(#[from] std::io::Error),

    /// Key material failed to parse or did not match its published half.
    #[error(transparent)]
    Crypto(#[from] CryptoError),

    /// Batching thresholds were rejected.
    #[error(transparent)]
    MixConfig(#[from] ConfigError),

    /// The relay was unreachable or refused the node at startup.
    #[error(transparent)]
    Relay(#[from] RelayError),

    /// Published keys do not match the local private material.
    #[error("key self-check failed: {0}")]
    SelfCheck(String),
}
