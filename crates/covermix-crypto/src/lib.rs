//! Covermix cryptographic layer.
//!
//! This crate owns the key material of the three roles and the construction
//! and parsing of the four envelope shapes (Source->Mixer, Mixer->Contact,
//! Contact->Mixer, Mixer->Source).
//!
//! # Design
//!
//! All functions are pure: entropy is provided by the caller as an
//! `RngCore + CryptoRng`, never pulled from ambient state. This keeps the
//! codec deterministic under a seeded RNG and free of coupling to any
//! runtime.
//!
//! # Security properties
//!
//! - Sender hiding: the outer layer of every envelope is an anonymous seal,
//!   so nothing on the wire identifies the sender.
//! - Mixer blindness: the mixer can read only the real/dummy flag; the inner
//!   layer is sealed to the far role and opaque to the mixer.
//! - Flag invisibility: the real/dummy flag lives in the outer layer only,
//!   so the far role (and any observer) cannot distinguish cover traffic.
//! - Forgery resistance: every drop leaving the mixer carries an Ed25519
//!   signature under the mixer's sole signing key.

#![forbid(unsafe_code)]
#![deny(missing_docs)]

pub mod envelope;
pub mod error;
pub mod keys;

pub use envelope::{
    Classified, DiscardReason, DropReason, classify_envelope, dummy_lane_payload,
    open_contact_drop, open_source_drop, seal_contact_message, seal_source_message, sign_drop,
    verify_drop,
};
pub use error::CryptoError;
pub use keys::{EncryptionKeyPair, EncryptionPublicKey, MixerKeySet, SigningKeyPair, VerifyKey};
