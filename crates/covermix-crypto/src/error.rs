//! Crypto error types.
//!
//! Only conditions a caller must handle are errors here. Expected per-envelope
//! drops (dummies, undecryptable traffic, bad signatures) are values - see
//! [`crate::envelope::Classified`] and [`crate::envelope::DropReason`].

use covermix_proto::WireError;
use thiserror::Error;

/// Errors from key handling and envelope construction.
#[derive(Debug, Error)]
pub enum CryptoError {
    /// Caller tried to encode a plaintext over the 255-byte limit.
    ///
    /// This is a contract violation at the call site, not a runtime
    /// condition to recover from.
    #[error("message of {len} bytes exceeds the 255-byte limit")]
    ContentTooLarge {
        /// Length of the offending plaintext.
        len: usize,
    },

    /// Produced or consumed bytes did not match the shape's fixed length.
    #[error(transparent)]
    Wire(#[from] WireError),

    /// Key bytes were malformed (wrong length, invalid point, bad hex).
    #[error("invalid key material: {0}")]
    InvalidKey(String),

    /// An AEAD operation failed while building an envelope.
    ///
    /// Encryption with valid keys does not fail in practice; this exists so
    /// the failure is propagated instead of panicking.
    #[error("encryption failed")]
    Encryption,
}
