//! Mix batching engine.
//!
//! One [`MixBatcher`] instance owns one direction's buffer; there is no
//! module-level state. The scheduler advances it explicitly:
//!
//! 1. `absorb` newly fetched envelopes (dedup by relay id, since inputs stay
//!    in the relay until their replacement output is durably posted)
//! 2. `plan` a batch once the input threshold is reached: strip outer
//!    layers, keep real inner ciphertexts, pad with encrypted fillers to the
//!    fixed output count, sign everything
//! 3. after the relay accepted the batch, `commit` the drained entries and
//!    delete them from the relay; deletes that fail stay parked until a
//!    later cycle confirms them
//!
//! `plan` is pure with respect to the buffer, so a relay failure between
//! `plan` and `commit` leaves nothing to undo.

use std::collections::VecDeque;

use bytes::Bytes;
use covermix_crypto::{
    Classified, CryptoError, DiscardReason, MixerKeySet, classify_envelope, dummy_lane_payload,
    sign_drop,
};
use covermix_proto::Direction;
use rand::{CryptoRng, RngCore};
use thiserror::Error;

use crate::relay::{DropId, FetchedDrop};

/// Batching thresholds and fetch sizing for one direction.
#[derive(Debug, Clone, Copy)]
pub struct MixConfig {
    /// Minimum buffered envelopes before a batch may be drained.
    pub input_threshold: usize,
    /// Exact size of every emitted batch.
    pub output_threshold: usize,
    /// How many envelopes to request from the relay per cycle.
    pub fetch_count: usize,
}

impl Default for MixConfig {
    fn default() -> Self {
        // Deployed configuration: drain pairs, always emit four.
        Self { input_threshold: 2, output_threshold: 4, fetch_count: 2 }
    }
}

/// Rejected [`MixConfig`] values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// An input threshold of zero would emit unprompted batches.
    #[error("input threshold must be at least 1")]
    ZeroInputThreshold,

    /// More drained real envelopes than output slots would force drops.
    #[error("output threshold {output} is below input threshold {input}")]
    OutputBelowInput {
        /// Configured input threshold.
        input: usize,
        /// Configured output threshold.
        output: usize,
    },
}

impl MixConfig {
    /// Validate the threshold relationship.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.input_threshold == 0 {
            return Err(ConfigError::ZeroInputThreshold);
        }
        if self.output_threshold < self.input_threshold {
            return Err(ConfigError::OutputBelowInput {
                input: self.input_threshold,
                output: self.output_threshold,
            });
        }
        Ok(())
    }
}

/// Per-cycle classification counts, for observability only.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    /// Envelopes drained from the buffer this cycle.
    pub drained: usize,
    /// Real envelopes forwarded.
    pub real: usize,
    /// Encrypted fillers added to reach the output threshold.
    pub fillers: usize,
    /// Well-formed cover traffic discarded.
    pub dummies: usize,
    /// Envelopes dropped for bad length or failed decryption.
    pub invalid: usize,
}

/// A signed output batch ready for the relay, plus its cycle counts.
#[derive(Debug, Clone)]
pub struct BatchPlan {
    /// Signed drops, exactly `output_threshold` of them.
    pub outputs: Vec<Bytes>,
    /// What the classification pass saw.
    pub stats: CycleStats,
}

/// Stateful per-direction batching engine run by the mixer.
#[derive(Debug)]
pub struct MixBatcher {
    direction: Direction,
    config: MixConfig,
    buffer: VecDeque<FetchedDrop>,
    pending_deletes: Vec<DropId>,
}

impl MixBatcher {
    /// Create an empty batcher for one direction.
    pub fn new(direction: Direction, config: MixConfig) -> Result<Self, ConfigError> {
        config.validate()?;
        Ok(Self { direction, config, buffer: VecDeque::new(), pending_deletes: Vec::new() })
    }

    /// The direction this batcher serves.
    pub fn direction(&self) -> Direction {
        self.direction
    }

    /// Relay fetch size for this lane.
    pub fn fetch_count(&self) -> usize {
        self.config.fetch_count
    }

    /// Currently buffered envelope count.
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Ingest newly fetched envelopes, oldest first.
    ///
    /// Because inputs are deleted from the relay only after their batch is
    /// posted, a re-fetch can hand back envelopes we already hold or have
    /// already consumed; those are skipped by id. Returns how many entries
    /// were actually appended.
    pub fn absorb(&mut self, arrivals: Vec<FetchedDrop>) -> usize {
        let mut appended = 0;
        for drop in arrivals {
            let known = self.buffer.iter().any(|b| b.id == drop.id)
                || self.pending_deletes.contains(&drop.id);
            if !known {
                self.buffer.push_back(drop);
                appended += 1;
            }
        }
        appended
    }

    /// Plan a batch if the input threshold is reached.
    ///
    /// Classifies the oldest `input_threshold` buffered envelopes without
    /// removing them: real inner ciphertexts are kept, dummies and
    /// undecodable envelopes are counted and excluded, and the real set is
    /// padded with freshly encrypted fillers so the batch always holds
    /// exactly `output_threshold` signed drops.
    pub fn plan(
        &self,
        keys: &MixerKeySet,
        rng: &mut (impl RngCore + CryptoRng),
    ) -> Result<Option<BatchPlan>, CryptoError> {
        if self.buffer.len() < self.config.input_threshold {
            return Ok(None);
        }

        let mut stats = CycleStats::default();
        let mut forwarded = Vec::new();

        for drop in self.buffer.iter().take(self.config.input_threshold) {
            stats.drained += 1;
            match classify_envelope(&keys.encryption, self.direction, &drop.envelope) {
                Classified::Forward(inner) => {
                    stats.real += 1;
                    forwarded.push(inner);
                },
                Classified::Discard(DiscardReason::Dummy) => stats.dummies += 1,
                Classified::Discard(_) => stats.invalid += 1,
            }
        }

        stats.fillers = self.config.output_threshold.saturating_sub(forwarded.len());
        for _ in 0..stats.fillers {
            forwarded.push(dummy_lane_payload(rng, self.direction)?);
        }

        let mut outputs = Vec::with_capacity(forwarded.len());
        for payload in &forwarded {
            outputs.push(sign_drop(&keys.signing, self.direction, payload)?);
        }

        debug_assert_eq!(outputs.len(), self.config.output_threshold);
        Ok(Some(BatchPlan { outputs, stats }))
    }

    /// Drain the planned entries after the relay accepted the batch.
    ///
    /// The drained ids are parked as unconfirmed deletes and returned so the
    /// caller can issue the relay deletions; confirm each success with
    /// [`Self::confirm_delete`].
    pub fn commit(&mut self) -> Vec<DropId> {
        let take = self.config.input_threshold.min(self.buffer.len());
        let mut ids = Vec::with_capacity(take);
        for _ in 0..take {
            if let Some(drop) = self.buffer.pop_front() {
                ids.push(drop.id);
            }
        }
        self.pending_deletes.extend(&ids);
        ids
    }

    /// Mark a relay deletion as confirmed.
    pub fn confirm_delete(&mut self, id: DropId) {
        self.pending_deletes.retain(|pending| *pending != id);
    }

    /// Ids whose relay deletion has not been confirmed yet.
    pub fn unconfirmed_deletes(&self) -> Vec<DropId> {
        self.pending_deletes.clone()
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use covermix_crypto::{
        EncryptionKeyPair, open_contact_drop, seal_contact_message, seal_source_message,
    };
    use rand::SeedableRng;
    use rand_chacha::ChaCha20Rng;

    use super::*;

    struct World {
        keys: MixerKeySet,
        source: EncryptionKeyPair,
        contact: EncryptionKeyPair,
        rng: ChaCha20Rng,
    }

    fn world(seed: u64) -> World {
        let mut rng = ChaCha20Rng::seed_from_u64(seed);
        World {
            keys: MixerKeySet::generate(&mut rng),
            source: EncryptionKeyPair::generate(&mut rng),
            contact: EncryptionKeyPair::generate(&mut rng),
            rng,
        }
    }

    impl World {
        fn source_envelope(&mut self, body: &[u8], is_real: bool) -> Bytes {
            seal_source_message(
                &mut self.rng,
                self.source.public(),
                self.keys.encryption.public(),
                self.contact.public(),
                body,
                is_real,
            )
            .unwrap()
        }
    }

    fn drops(envelopes: Vec<Bytes>, first_id: DropId) -> Vec<FetchedDrop> {
        envelopes
            .into_iter()
            .enumerate()
            .map(|(i, envelope)| FetchedDrop { id: first_id + i as DropId, envelope })
            .collect()
    }

    #[test]
    fn config_validation() {
        assert_eq!(MixConfig::default().validate(), Ok(()));
        assert_eq!(
            MixConfig { input_threshold: 0, ..MixConfig::default() }.validate(),
            Err(ConfigError::ZeroInputThreshold)
        );
        assert_eq!(
            MixConfig { input_threshold: 4, output_threshold: 2, fetch_count: 2 }.validate(),
            Err(ConfigError::OutputBelowInput { input: 4, output: 2 })
        );
    }

    #[test]
    fn below_threshold_never_emits() {
        let mut w = world(1);
        let envelope = w.source_envelope(b"one", true);

        let mut batcher =
            MixBatcher::new(Direction::SourceToContact, MixConfig::default()).unwrap();
        batcher.absorb(drops(vec![envelope], 0));

        assert!(batcher.plan(&w.keys, &mut w.rng).unwrap().is_none());
        assert_eq!(batcher.buffered(), 1);
    }

    #[test]
    fn batch_size_is_always_output_threshold() {
        let mut w = world(2);

        // All real, mixed, all dummy: the emitted size never moves.
        let mixes: [Vec<Bytes>; 3] = [
            vec![w.source_envelope(b"a", true), w.source_envelope(b"b", true)],
            vec![w.source_envelope(b"c", true), w.source_envelope(b"d", false)],
            vec![w.source_envelope(b"e", false), w.source_envelope(b"f", false)],
        ];

        let mut next_id = 0;
        for envelopes in mixes {
            let mut batcher =
                MixBatcher::new(Direction::SourceToContact, MixConfig::default()).unwrap();
            let count = envelopes.len();
            batcher.absorb(drops(envelopes, next_id));
            next_id += count as DropId;

            let plan = batcher.plan(&w.keys, &mut w.rng).unwrap().unwrap();
            assert_eq!(plan.outputs.len(), 4);
            assert_eq!(plan.stats.real + plan.stats.fillers, 4);
            for output in &plan.outputs {
                assert_eq!(output.len(), Direction::SourceToContact.signed_len());
            }
        }
    }

    #[test]
    fn fifo_oldest_pair_drains_first() {
        let mut w = world(3);
        let envelopes = vec![
            w.source_envelope(b"A", true),
            w.source_envelope(b"B", true),
            w.source_envelope(b"C", true),
            w.source_envelope(b"D", true),
        ];

        let mut batcher =
            MixBatcher::new(Direction::SourceToContact, MixConfig::default()).unwrap();
        batcher.absorb(drops(envelopes, 10));

        let plan = batcher.plan(&w.keys, &mut w.rng).unwrap().unwrap();
        let drained = batcher.commit();
        assert_eq!(drained, vec![10, 11]);
        assert_eq!(batcher.buffered(), 2);

        // The emitted real drops are exactly A and B, in order.
        let bodies: Vec<Vec<u8>> = plan
            .outputs
            .iter()
            .filter_map(|signed| {
                open_contact_drop(&w.contact, w.keys.signing.verify_key(), signed).ok()
            })
            .map(|(_, body)| body)
            .collect();
        assert_eq!(bodies, vec![b"A".to_vec(), b"B".to_vec()]);
    }

    #[test]
    fn malformed_envelope_is_excluded_not_fatal() {
        let mut w = world(4);
        let envelopes = vec![Bytes::from(vec![0u8; 385]), w.source_envelope(b"ok", true)];

        let mut batcher =
            MixBatcher::new(Direction::SourceToContact, MixConfig::default()).unwrap();
        batcher.absorb(drops(envelopes, 0));

        let plan = batcher.plan(&w.keys, &mut w.rng).unwrap().unwrap();
        assert_eq!(plan.stats.invalid, 1);
        assert_eq!(plan.stats.real, 1);
        assert_eq!(plan.stats.fillers, 3);
        assert_eq!(plan.outputs.len(), 4);
    }

    #[test]
    fn contact_lane_batches_too() {
        let mut w = world(5);
        let envelopes: Vec<Bytes> = (0..2)
            .map(|i| {
                seal_contact_message(
                    &mut w.rng,
                    &w.contact,
                    w.keys.encryption.public(),
                    w.source.public(),
                    &[b'r', i],
                    true,
                )
                .unwrap()
            })
            .collect();

        let mut batcher =
            MixBatcher::new(Direction::ContactToSource, MixConfig::default()).unwrap();
        batcher.absorb(drops(envelopes, 0));

        let plan = batcher.plan(&w.keys, &mut w.rng).unwrap().unwrap();
        assert_eq!(plan.outputs.len(), 4);
        for output in &plan.outputs {
            assert_eq!(output.len(), Direction::ContactToSource.signed_len());
        }
    }

    #[test]
    fn absorb_skips_known_and_parked_ids() {
        let mut w = world(6);
        let a = w.source_envelope(b"a", true);
        let b = w.source_envelope(b"b", true);

        let mut batcher =
            MixBatcher::new(Direction::SourceToContact, MixConfig::default()).unwrap();
        assert_eq!(batcher.absorb(drops(vec![a.clone(), b.clone()], 0)), 2);

        // Re-fetch of the same ids adds nothing.
        assert_eq!(batcher.absorb(drops(vec![a.clone(), b.clone()], 0)), 0);

        // After a commit the ids are parked until the deletes confirm.
        batcher.plan(&w.keys, &mut w.rng).unwrap().unwrap();
        let drained = batcher.commit();
        assert_eq!(batcher.absorb(drops(vec![a, b], 0)), 0);

        for id in drained {
            batcher.confirm_delete(id);
        }
        assert!(batcher.unconfirmed_deletes().is_empty());
    }

    #[test]
    fn plan_without_commit_leaves_buffer_intact() {
        let mut w = world(7);
        let envelopes = vec![w.source_envelope(b"a", true), w.source_envelope(b"b", true)];

        let mut batcher =
            MixBatcher::new(Direction::SourceToContact, MixConfig::default()).unwrap();
        batcher.absorb(drops(envelopes, 0));

        // Simulates a relay post failure: the plan is dropped, nothing moved.
        let first = batcher.plan(&w.keys, &mut w.rng).unwrap().unwrap();
        assert_eq!(batcher.buffered(), 2);

        let second = batcher.plan(&w.keys, &mut w.rng).unwrap().unwrap();
        assert_eq!(second.stats.real, first.stats.real);
        assert_eq!(batcher.buffered(), 2);
    }

    mod props {
        use proptest::prelude::*;

        use super::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(16))]

            #[test]
            fn emitted_batches_always_have_fixed_size(flags in proptest::collection::vec(any::<bool>(), 0..12), seed in any::<u64>()) {
                let mut w = world(seed);
                let envelopes: Vec<Bytes> =
                    flags.iter().map(|&real| w.source_envelope(b"m", real)).collect();

                let mut batcher =
                    MixBatcher::new(Direction::SourceToContact, MixConfig::default()).unwrap();
                batcher.absorb(drops(envelopes, 0));

                while let Some(plan) = batcher.plan(&w.keys, &mut w.rng).unwrap() {
                    prop_assert_eq!(plan.outputs.len(), 4);
                    for id in batcher.commit() {
                        batcher.confirm_delete(id);
                    }
                }
                prop_assert!(batcher.buffered() < 2);
            }
        }
    }
}
