//! Envelope byte-level constants and the hex boundary encoding.
//!
//! Every envelope shape has exactly one valid length. The table is derived
//! from the underlying constructions rather than written as magic numbers,
//! so a change to any primitive overhead surfaces as a compile-visible shift
//! in the whole column:
//!
//! | Shape            | Bytes |
//! |------------------|-------|
//! | Source -> Mixer  | 385   |
//! | Mixer -> Contact | 400   |
//! | Contact -> Mixer | 345   |
//! | Mixer -> Source  | 360   |
//!
//! Anything that does not match its shape's length is a protocol violation
//! and must be rejected at decode time, never silently accepted.

use thiserror::Error;

/// Maximum plaintext message length in bytes.
///
/// Messages are always embedded in a padded field of exactly this size plus
/// a one-byte length prefix, so ciphertext size never depends on content.
pub const MAX_MESSAGE_LEN: usize = 255;

/// Length of an X25519 or Ed25519 public key.
pub const KEY_LEN: usize = 32;

/// Overhead of an anonymous seal: ephemeral public key (32) + Poly1305 tag (16).
pub const SEAL_OVERHEAD: usize = KEY_LEN + 16;

/// Overhead of an authenticated box on the wire: nonce (24) + Poly1305 tag (16).
pub const BOX_OVERHEAD: usize = 24 + 16;

/// Length of an Ed25519 signature.
pub const SIGNATURE_LEN: usize = 64;

/// Real-flag byte marking an envelope the mixer must forward.
pub const FLAG_REAL: u8 = 0x01;

/// Real-flag byte marking cover traffic the mixer discards.
pub const FLAG_DUMMY: u8 = 0x00;

/// Padded plaintext carried on the source lane: sender key, length, message.
pub const SOURCE_PADDED_LEN: usize = KEY_LEN + 1 + MAX_MESSAGE_LEN;

/// Inner ciphertext forwarded to the contact (sealed source plaintext).
pub const SOURCE_LANE_PAYLOAD_LEN: usize = SOURCE_PADDED_LEN + SEAL_OVERHEAD;

/// Full Source -> Mixer envelope: flag + inner ciphertext, sealed to the mixer.
pub const SOURCE_ENVELOPE_LEN: usize = 1 + SOURCE_LANE_PAYLOAD_LEN + SEAL_OVERHEAD;

/// Padded plaintext carried on the contact lane: length, message.
///
/// The contact's public key is published, so unlike the source lane it is
/// not repeated inside the envelope.
pub const CONTACT_PADDED_LEN: usize = 1 + MAX_MESSAGE_LEN;

/// Inner ciphertext forwarded to the source (authenticated box, nonce prefixed).
pub const CONTACT_LANE_PAYLOAD_LEN: usize = CONTACT_PADDED_LEN + BOX_OVERHEAD;

/// Full Contact -> Mixer envelope: flag + inner ciphertext, sealed to the mixer.
pub const CONTACT_ENVELOPE_LEN: usize = 1 + CONTACT_LANE_PAYLOAD_LEN + SEAL_OVERHEAD;

/// Mixer -> Contact drop: signature followed by the inner ciphertext.
pub const SIGNED_TO_CONTACT_LEN: usize = SIGNATURE_LEN + SOURCE_LANE_PAYLOAD_LEN;

/// Mixer -> Source drop: signature followed by the inner ciphertext.
pub const SIGNED_TO_SOURCE_LEN: usize = SIGNATURE_LEN + CONTACT_LANE_PAYLOAD_LEN;

/// Wire-level decoding failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum WireError {
    /// Byte string does not have the one valid length for its shape.
    #[error("length mismatch: expected {expected} bytes, got {actual}")]
    LengthMismatch {
        /// The shape's fixed length.
        expected: usize,
        /// What arrived.
        actual: usize,
    },

    /// Hex string could not be decoded.
    #[error("invalid hex encoding: {0}")]
    InvalidHex(String),
}

/// Check that `bytes` has exactly the expected fixed length.
pub fn check_len(bytes: &[u8], expected: usize) -> Result<(), WireError> {
    if bytes.len() == expected {
        Ok(())
    } else {
        Err(WireError::LengthMismatch { expected, actual: bytes.len() })
    }
}

/// Encode envelope bytes for the relay boundary.
pub fn encode_hex(bytes: &[u8]) -> String {
    hex::encode(bytes)
}

/// Decode envelope bytes arriving from the relay boundary.
pub fn decode_hex(s: &str) -> Result<Vec<u8>, WireError> {
    hex::decode(s).map_err(|e| WireError::InvalidHex(e.to_string()))
}
