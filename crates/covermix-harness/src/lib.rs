//! Deterministic test harness for the covermix pipeline.
//!
//! Real deployments differ from tests in exactly two seams: the
//! [`Environment`] (time + entropy) and the [`RelayClient`]. This crate
//! pins both down:
//!
//! - [`TestEnv`]: a seeded ChaCha20 RNG behind the `Environment` trait, so
//!   every envelope, nonce, and ephemeral dummy key is reproducible from a
//!   seed
//! - [`KeyFixture`] / [`store_fixture`]: one call to a fully keyed world
//! - [`FlakyRelay`]: a wrapper that fails a configured number of relay
//!   operations, for exercising the abort-cycle-and-retry paths

#![forbid(unsafe_code)]
#![warn(missing_docs)]

use std::{
    collections::BTreeMap,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicUsize, Ordering},
    },
    time::{Duration, Instant},
};

use async_trait::async_trait;
use bytes::Bytes;
use covermix_core::{DropId, Environment, FetchedDrop, RelayClient, RelayError};
use covermix_crypto::{EncryptionKeyPair, MixerKeySet};
use covermix_proto::{Direction, PublishedKeys};
use covermix_relay::{AccessTokens, MemoryDropStore, StoreConfig};
use rand::{RngCore, SeedableRng};
use rand_chacha::ChaCha20Rng;

/// Deterministic environment: seeded RNG, real tokio sleep.
#[derive(Clone)]
pub struct TestEnv {
    rng: Arc<Mutex<ChaCha20Rng>>,
}

impl TestEnv {
    /// Create an environment whose entropy is fully determined by `seed`.
    pub fn new(seed: u64) -> Self {
        Self { rng: Arc::new(Mutex::new(ChaCha20Rng::seed_from_u64(seed))) }
    }
}

impl Environment for TestEnv {
    fn now(&self) -> Instant {
        Instant::now()
    }

    fn sleep(&self, duration: Duration) -> impl std::future::Future<Output = ()> + Send {
        tokio::time::sleep(duration)
    }

    fn random_bytes(&self, buffer: &mut [u8]) {
        self.rng.lock().unwrap_or_else(PoisonError::into_inner).fill_bytes(buffer);
    }
}

/// A fully keyed three-role world.
pub struct KeyFixture {
    /// The mixer's private key set.
    pub mixer: MixerKeySet,
    /// The source's encryption pair.
    pub source: EncryptionKeyPair,
    /// The contact's encryption pair (published as contact id 1).
    pub contact: EncryptionKeyPair,
}

/// Generate all role keys from one seed.
pub fn key_fixture(seed: u64) -> KeyFixture {
    let mut rng = ChaCha20Rng::seed_from_u64(seed);
    KeyFixture {
        mixer: MixerKeySet::generate(&mut rng),
        source: EncryptionKeyPair::generate(&mut rng),
        contact: EncryptionKeyPair::generate(&mut rng),
    }
}

/// Build a relay store publishing the fixture's public keys, with the
/// default tokens and retention.
pub fn store_fixture(keys: &KeyFixture) -> MemoryDropStore {
    let published = PublishedKeys {
        mixer_key: keys.mixer.encryption.public().to_hex(),
        mixer_sign_key: keys.mixer.signing.verify_key().to_hex(),
        contact_keys: BTreeMap::from([(1, keys.contact.public().to_hex())]),
    };
    MemoryDropStore::new(AccessTokens::default(), published, StoreConfig::default())
}

/// Relay wrapper that fails the next `n` operations of chosen kinds.
///
/// Failures surface as [`RelayError::Transport`], the transient kind the
/// drivers must absorb by aborting the cycle and retrying later.
#[derive(Clone)]
pub struct FlakyRelay<R> {
    inner: R,
    failing_posts: Arc<AtomicUsize>,
    failing_deletes: Arc<AtomicUsize>,
}

impl<R> FlakyRelay<R> {
    /// Wrap `inner` with independent failure budgets for `post_batch` and
    /// `delete`.
    pub fn new(inner: R, failing_posts: usize, failing_deletes: usize) -> Self {
        Self {
            inner,
            failing_posts: Arc::new(AtomicUsize::new(failing_posts)),
            failing_deletes: Arc::new(AtomicUsize::new(failing_deletes)),
        }
    }

    fn take_failure(budget: &AtomicUsize) -> bool {
        budget
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok()
    }
}

#[async_trait]
impl<R: RelayClient> RelayClient for FlakyRelay<R> {
    async fn enqueue(&self, direction: Direction, envelope: Bytes) -> Result<DropId, RelayError> {
        self.inner.enqueue(direction, envelope).await
    }

    async fn fetch_oldest(
        &self,
        direction: Direction,
        count: usize,
    ) -> Result<Vec<FetchedDrop>, RelayError> {
        self.inner.fetch_oldest(direction, count).await
    }

    async fn delete(&self, direction: Direction, id: DropId) -> Result<(), RelayError> {
        if Self::take_failure(&self.failing_deletes) {
            return Err(RelayError::Transport("injected delete failure".to_string()));
        }
        self.inner.delete(direction, id).await
    }

    async fn post_batch(&self, direction: Direction, batch: Vec<Bytes>) -> Result<(), RelayError> {
        if Self::take_failure(&self.failing_posts) {
            return Err(RelayError::Transport("injected post failure".to_string()));
        }
        self.inner.post_batch(direction, batch).await
    }

    async fn fetch_deaddrop(&self, direction: Direction) -> Result<Vec<Bytes>, RelayError> {
        self.inner.fetch_deaddrop(direction).await
    }

    async fn published_keys(&self) -> Result<PublishedKeys, RelayError> {
        self.inner.published_keys().await
    }
}
