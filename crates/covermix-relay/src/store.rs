//! In-memory dead-drop store.
//!
//! Two kinds of storage per direction:
//!
//! - a *pending queue* of enqueued envelopes awaiting the mixer, with
//!   strictly increasing ids, oldest-first retrieval, and idempotent
//!   deletion (single delivery is the mixer's fetch/delete contract)
//! - a *deaddrop* of mixer output, a broadcast list the consuming role
//!   polls in full; entries age out after the retention window instead of
//!   being consumed
//!
//! Cloning the store shares state, so one instance can back several
//! in-process clients.

use std::{
    collections::VecDeque,
    sync::{Arc, Mutex, PoisonError},
    time::{Duration, Instant},
};

use covermix_proto::{Direction, PublishedKeys, QueuedEnvelope, Role, wire};
use thiserror::Error;

use crate::auth::AccessTokens;

/// Store tuning.
#[derive(Debug, Clone, Copy)]
pub struct StoreConfig {
    /// How long deaddrop entries stay visible.
    pub retention: Duration,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self { retention: Duration::from_secs(24 * 60 * 60) }
    }
}

/// Store-level failures.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum StoreError {
    /// The presented token is not one of the three configured tokens.
    #[error("unknown bearer token")]
    UnknownToken,

    /// The token's role may not perform this operation.
    #[error("role {actual} may not perform this operation (requires {required})")]
    Forbidden {
        /// Role the operation requires.
        required: Role,
        /// Role the token resolved to.
        actual: Role,
    },

    /// The envelope failed hex decoding or has the wrong fixed length.
    #[error("invalid envelope: {0}")]
    InvalidEnvelope(#[from] covermix_proto::WireError),
}

#[derive(Debug, Default)]
struct PendingQueue {
    next_id: u64,
    entries: VecDeque<QueuedEnvelope>,
}

#[derive(Debug, Default)]
struct DeadDrop {
    entries: VecDeque<(Instant, String)>,
}

#[derive(Debug)]
struct Inner {
    queues: [PendingQueue; 2],
    deaddrops: [DeadDrop; 2],
    published: PublishedKeys,
}

fn lane(direction: Direction) -> usize {
    match direction {
        Direction::SourceToContact => 0,
        Direction::ContactToSource => 1,
    }
}

/// Shared in-memory relay store.
#[derive(Debug, Clone)]
pub struct MemoryDropStore {
    tokens: Arc<AccessTokens>,
    config: StoreConfig,
    inner: Arc<Mutex<Inner>>,
}

impl MemoryDropStore {
    /// Create a store holding the given published key material.
    pub fn new(tokens: AccessTokens, published: PublishedKeys, config: StoreConfig) -> Self {
        let inner = Inner {
            queues: [PendingQueue::default(), PendingQueue::default()],
            deaddrops: [DeadDrop::default(), DeadDrop::default()],
            published,
        };
        Self { tokens: Arc::new(tokens), config, inner: Arc::new(Mutex::new(inner)) }
    }

    /// The configured tokens, for handing out to in-process clients.
    pub fn tokens(&self) -> &AccessTokens {
        &self.tokens
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn authorize(&self, token: &str, required: Role) -> Result<Role, StoreError> {
        let actual = self.tokens.role_for(token).ok_or(StoreError::UnknownToken)?;
        if actual == required {
            Ok(actual)
        } else {
            Err(StoreError::Forbidden { required, actual })
        }
    }

    /// Append one envelope to a direction's pending queue.
    ///
    /// Only the direction's producing role may enqueue, and the envelope
    /// must decode to the direction's exact input length.
    pub fn enqueue(
        &self,
        token: &str,
        direction: Direction,
        envelope_hex: &str,
    ) -> Result<u64, StoreError> {
        self.authorize(token, direction.producer())?;

        let bytes = wire::decode_hex(envelope_hex)?;
        wire::check_len(&bytes, direction.envelope_len())?;

        let mut inner = self.lock();
        let queue = &mut inner.queues[lane(direction)];
        let id = queue.next_id;
        queue.next_id += 1;
        queue.entries.push_back(QueuedEnvelope { id, envelope: envelope_hex.to_string() });
        tracing::debug!(%direction, id, "envelope enqueued");
        Ok(id)
    }

    /// Return up to `count` oldest queued envelopes. Mixer only.
    pub fn fetch_oldest(
        &self,
        token: &str,
        direction: Direction,
        count: usize,
    ) -> Result<Vec<QueuedEnvelope>, StoreError> {
        self.authorize(token, Role::Mixer)?;

        let inner = self.lock();
        Ok(inner.queues[lane(direction)].entries.iter().take(count).cloned().collect())
    }

    /// Remove a fetched envelope by id. Mixer only; idempotent.
    pub fn delete(&self, token: &str, direction: Direction, id: u64) -> Result<(), StoreError> {
        self.authorize(token, Role::Mixer)?;

        let mut inner = self.lock();
        inner.queues[lane(direction)].entries.retain(|entry| entry.id != id);
        Ok(())
    }

    /// Publish a signed batch into the direction's deaddrop. Mixer only.
    ///
    /// The whole batch becomes visible in one call; every entry must have
    /// the direction's exact signed output length.
    pub fn post_batch(
        &self,
        token: &str,
        direction: Direction,
        batch: &[String],
    ) -> Result<(), StoreError> {
        self.authorize(token, Role::Mixer)?;

        for message in batch {
            let bytes = wire::decode_hex(message)?;
            wire::check_len(&bytes, direction.signed_len())?;
        }

        let now = Instant::now();
        let mut inner = self.lock();
        let deaddrop = &mut inner.deaddrops[lane(direction)];
        for message in batch {
            deaddrop.entries.push_back((now, message.clone()));
        }
        tracing::debug!(%direction, count = batch.len(), "batch posted to deaddrop");
        Ok(())
    }

    /// Poll every retained drop for the direction's consuming role.
    pub fn fetch_deaddrop(
        &self,
        token: &str,
        direction: Direction,
    ) -> Result<Vec<String>, StoreError> {
        self.authorize(token, direction.consumer())?;

        let cutoff = Instant::now().checked_sub(self.config.retention);
        let mut inner = self.lock();
        let deaddrop = &mut inner.deaddrops[lane(direction)];
        if let Some(cutoff) = cutoff {
            while deaddrop.entries.front().is_some_and(|(at, _)| *at <= cutoff) {
                deaddrop.entries.pop_front();
            }
        }
        Ok(deaddrop.entries.iter().map(|(_, message)| message.clone()).collect())
    }

    /// The published public key material. Any valid token may read it.
    pub fn published_keys(&self, token: &str) -> Result<PublishedKeys, StoreError> {
        self.tokens.role_for(token).ok_or(StoreError::UnknownToken)?;
        Ok(self.lock().published.clone())
    }

    /// Queue depth for one direction (diagnostics).
    pub fn pending_len(&self, direction: Direction) -> usize {
        self.lock().queues[lane(direction)].entries.len()
    }

    /// Deaddrop depth for one direction (diagnostics).
    pub fn deaddrop_len(&self, direction: Direction) -> usize {
        self.lock().deaddrops[lane(direction)].entries.len()
    }
}
