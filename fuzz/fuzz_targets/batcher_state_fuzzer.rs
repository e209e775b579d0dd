//! Fuzz target for the [`MixBatcher`] state machine
//!
//! # Strategy
//!
//! - Arbitrary interleavings of absorb, plan, commit, and delete
//!   confirmation
//! - Arbitrary (mostly garbage) envelope bytes and colliding relay ids
//!
//! # Invariants
//!
//! - Every planned batch holds exactly `output_threshold` signed drops of
//!   the direction's fixed signed length
//! - A commit never drains more than `input_threshold` entries
//! - Re-absorbing a buffered or parked id never duplicates it
//! - NEVER panic on any operation sequence

#![no_main]

use arbitrary::Arbitrary;
use bytes::Bytes;
use covermix_core::{FetchedDrop, MixBatcher, MixConfig};
use covermix_crypto::MixerKeySet;
use covermix_proto::Direction;
use libfuzzer_sys::fuzz_target;
use rand::SeedableRng;
use rand_chacha::ChaCha20Rng;

#[derive(Debug, Arbitrary)]
enum Op {
    Absorb { ids: Vec<u8>, envelope_len: u16 },
    Plan { commit: bool },
    ConfirmDeletes,
}

#[derive(Debug, Arbitrary)]
struct FuzzInput {
    seed: u64,
    ops: Vec<Op>,
}

fuzz_target!(|input: FuzzInput| {
    let mut rng = ChaCha20Rng::seed_from_u64(input.seed);
    let keys = MixerKeySet::generate(&mut rng);
    let config = MixConfig::default();

    let Ok(mut batcher) = MixBatcher::new(Direction::SourceToContact, config) else {
        return;
    };

    for op in input.ops.into_iter().take(64) {
        match op {
            Op::Absorb { ids, envelope_len } => {
                let before = batcher.buffered();
                let arrivals: Vec<FetchedDrop> = ids
                    .iter()
                    .take(8)
                    .map(|&id| FetchedDrop {
                        id: u64::from(id),
                        envelope: Bytes::from(vec![id; usize::from(envelope_len) % 1024]),
                    })
                    .collect();
                let appended = batcher.absorb(arrivals);
                assert_eq!(batcher.buffered(), before + appended);
            },
            Op::Plan { commit } => {
                if let Ok(Some(plan)) = batcher.plan(&keys, &mut rng) {
                    assert_eq!(plan.outputs.len(), config.output_threshold);
                    for output in &plan.outputs {
                        assert_eq!(output.len(), Direction::SourceToContact.signed_len());
                    }
                    if commit {
                        let drained = batcher.commit();
                        assert!(drained.len() <= config.input_threshold);
                    }
                }
            },
            Op::ConfirmDeletes => {
                for id in batcher.unconfirmed_deletes() {
                    batcher.confirm_delete(id);
                }
                assert!(batcher.unconfirmed_deletes().is_empty());
            },
        }
    }
});
