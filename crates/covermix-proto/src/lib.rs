//! Covermix wire contract.
//!
//! This crate pins down everything two processes must agree on without
//! sharing code: the closed set of roles and directions, the exact byte
//! lengths of the four envelope shapes, the hex encoding used whenever
//! envelope bytes cross the relay boundary, and the relay payload types.
//!
//! No cryptography lives here - envelopes are opaque, fixed-length byte
//! strings at this layer. The construction rules are in `covermix-crypto`.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod direction;
pub mod payloads;
pub mod wire;

pub use direction::{Direction, Role};
pub use payloads::{BatchSubmission, PublishedKeys, QueuedEnvelope};
pub use wire::{
    BOX_OVERHEAD, CONTACT_ENVELOPE_LEN, CONTACT_LANE_PAYLOAD_LEN, CONTACT_PADDED_LEN, FLAG_DUMMY,
    FLAG_REAL, KEY_LEN, MAX_MESSAGE_LEN, SEAL_OVERHEAD, SIGNATURE_LEN, SIGNED_TO_CONTACT_LEN,
    SIGNED_TO_SOURCE_LEN, SOURCE_ENVELOPE_LEN, SOURCE_LANE_PAYLOAD_LEN, SOURCE_PADDED_LEN,
    WireError, check_len, decode_hex, encode_hex,
};
