//! Fuzz target for envelope decoding on all four shapes
//!
//! The deaddrop carries attacker-controllable bytes by design, so every
//! decode path must absorb arbitrary input.
//!
//! # Invariants
//!
//! - NEVER panic on any byte string, any length
//! - Any length other than the shape's fixed length MUST be rejected
//! - Rejections are values (Discard / DropReason), never process failures

#![no_main]

use arbitrary::Arbitrary;
use covermix_crypto::{
    classify_envelope, open_contact_drop, open_source_drop, verify_drop, Classified,
    EncryptionKeyPair, MixerKeySet,
};
use covermix_proto::Direction;
use libfuzzer_sys::fuzz_target;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    /// Seed for deterministic key material.
    seed: u64,
    /// Which lane's shapes to decode against.
    source_lane: bool,
    /// The hostile bytes.
    bytes: Vec<u8>,
}

fuzz_target!(|input: FuzzInput| {
    let mut rng = ChaCha20Rng::seed_from_u64(input.seed);
    let mixer = MixerKeySet::generate(&mut rng);
    let source = EncryptionKeyPair::generate(&mut rng);
    let contact = EncryptionKeyPair::generate(&mut rng);

    let direction = if input.source_lane {
        Direction::SourceToContact
    } else {
        Direction::ContactToSource
    };

    let classified = classify_envelope(&mixer.encryption, direction, &input.bytes);
    if input.bytes.len() != direction.envelope_len() {
        assert!(matches!(classified, Classified::Discard(_)));
    }

    let verified = verify_drop(mixer.signing.verify_key(), direction, &input.bytes);
    if input.bytes.len() != direction.signed_len() {
        assert!(verified.is_err());
    }

    let _ = open_contact_drop(&contact, mixer.signing.verify_key(), &input.bytes);
    let _ = open_source_drop(&source, contact.public(), mixer.signing.verify_key(), &input.bytes);
});
