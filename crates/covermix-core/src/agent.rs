//! Source and contact agent state machines.
//!
//! Both agents follow the same cycle: poll the deaddrop, try to open every
//! drop (most are dummies or addressed to other keys - failures are silent
//! by design), surface previously unseen payloads, then emit exactly one
//! real envelope if application content is pending and exactly one dummy
//! envelope always. The dummy is addressed to a freshly generated ephemeral
//! key so it carries no reusable identity and is byte-identical in shape to
//! a real envelope.

use std::collections::{HashSet, VecDeque};

use bytes::Bytes;
use covermix_crypto::{
    CryptoError, EncryptionKeyPair, EncryptionPublicKey, VerifyKey, open_contact_drop,
    open_source_drop, seal_contact_message, seal_source_message,
};
use covermix_proto::{Direction, MAX_MESSAGE_LEN};
use rand::{CryptoRng, RngCore};
use sha2::{Digest, Sha256};

/// Bounded set of already-surfaced message identities.
///
/// Keyed by a SHA-256 digest of the full decoded content. The window is
/// FIFO-bounded so dedup state cannot grow without limit; a replay older
/// than the window would surface once more, which the relay's deaddrop
/// retention makes a non-issue in practice.
#[derive(Debug)]
pub struct SeenSet {
    digests: HashSet<[u8; 32]>,
    order: VecDeque<[u8; 32]>,
    capacity: usize,
}

impl SeenSet {
    /// Default dedup window.
    pub const DEFAULT_CAPACITY: usize = 4096;

    /// Create a set bounded to `capacity` entries (minimum 1).
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self { digests: HashSet::new(), order: VecDeque::new(), capacity }
    }

    /// Record `content`; returns `true` if it was not in the window.
    pub fn insert(&mut self, content: &[u8]) -> bool {
        let digest: [u8; 32] = Sha256::digest(content).into();
        if !self.digests.insert(digest) {
            return false;
        }
        self.order.push_back(digest);
        while self.order.len() > self.capacity {
            if let Some(evicted) = self.order.pop_front() {
                self.digests.remove(&evicted);
            }
        }
        true
    }

    /// Number of identities currently tracked.
    pub fn len(&self) -> usize {
        self.order.len()
    }

    /// True if nothing has been recorded yet.
    pub fn is_empty(&self) -> bool {
        self.order.is_empty()
    }
}

impl Default for SeenSet {
    fn default() -> Self {
        Self::new(Self::DEFAULT_CAPACITY)
    }
}

/// A decoded, previously unseen payload surfaced to the application layer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IncomingMessage {
    /// The sender's public key, when the lane carries one (contact side).
    pub sender: Option<EncryptionPublicKey>,
    /// The recovered plaintext.
    pub body: Vec<u8>,
}

/// What one receive pass saw, for observability.
#[derive(Debug)]
pub struct InboxReport {
    /// Drops fetched from the deaddrop.
    pub fetched: usize,
    /// Drops this agent could open.
    pub decoded: usize,
    /// Decoded payloads not seen before, in arrival order.
    pub fresh: Vec<IncomingMessage>,
}

/// A per-role agent cycle: decode incoming drops, compose outgoing cover.
///
/// Implementations are pure state machines; the [`crate::AgentDriver`]
/// owns all relay I/O.
pub trait Agent: Send + 'static {
    /// Application content this agent can queue for sending.
    type Outbound: Send + 'static;

    /// Deaddrop direction this agent polls.
    fn inbound_direction(&self) -> Direction;

    /// Pending-queue direction this agent feeds.
    fn outbound_direction(&self) -> Direction;

    /// Queue application content for the next cycle.
    ///
    /// Fails loudly if the body exceeds the 255-byte limit; nothing is ever
    /// silently truncated.
    fn queue(&mut self, item: Self::Outbound) -> Result<(), CryptoError>;

    /// Decode and dedup one deaddrop poll.
    fn receive(&mut self, drops: &[Bytes]) -> InboxReport;

    /// Produce this cycle's outbound envelopes: one real if content is
    /// pending, then always one dummy.
    fn compose(&mut self, rng: &mut (impl RngCore + CryptoRng)) -> Result<Vec<Bytes>, CryptoError>;
}

fn ensure_fits(body: &[u8]) -> Result<(), CryptoError> {
    if body.len() > MAX_MESSAGE_LEN {
        return Err(CryptoError::ContentTooLarge { len: body.len() });
    }
    Ok(())
}

/// The anonymous submitting role.
pub struct SourceAgent {
    keys: EncryptionKeyPair,
    contact_pub: EncryptionPublicKey,
    mixer_pub: EncryptionPublicKey,
    mixer_verify: VerifyKey,
    seen: SeenSet,
    outbox: VecDeque<Vec<u8>>,
}

impl SourceAgent {
    /// Create an agent writing to one published contact.
    pub fn new(
        keys: EncryptionKeyPair,
        contact_pub: EncryptionPublicKey,
        mixer_pub: EncryptionPublicKey,
        mixer_verify: VerifyKey,
    ) -> Self {
        Self {
            keys,
            contact_pub,
            mixer_pub,
            mixer_verify,
            seen: SeenSet::default(),
            outbox: VecDeque::new(),
        }
    }

    /// This agent's own public key, as embedded in its envelopes.
    pub fn public_key(&self) -> &EncryptionPublicKey {
        self.keys.public()
    }
}

impl Agent for SourceAgent {
    type Outbound = Vec<u8>;

    fn inbound_direction(&self) -> Direction {
        Direction::ContactToSource
    }

    fn outbound_direction(&self) -> Direction {
        Direction::SourceToContact
    }

    fn queue(&mut self, body: Vec<u8>) -> Result<(), CryptoError> {
        ensure_fits(&body)?;
        self.outbox.push_back(body);
        Ok(())
    }

    fn receive(&mut self, drops: &[Bytes]) -> InboxReport {
        let mut report = InboxReport { fetched: drops.len(), decoded: 0, fresh: Vec::new() };
        for drop in drops {
            let Ok(body) =
                open_source_drop(&self.keys, &self.contact_pub, &self.mixer_verify, drop)
            else {
                continue;
            };
            report.decoded += 1;
            if self.seen.insert(&body) {
                report.fresh.push(IncomingMessage { sender: None, body });
            }
        }
        report
    }

    fn compose(&mut self, rng: &mut (impl RngCore + CryptoRng)) -> Result<Vec<Bytes>, CryptoError> {
        let mut out = Vec::with_capacity(2);

        if let Some(body) = self.outbox.pop_front() {
            out.push(seal_source_message(
                rng,
                self.keys.public(),
                &self.mixer_pub,
                &self.contact_pub,
                &body,
                true,
            )?);
        }

        // Cover traffic: sealed to a throwaway key nobody can open.
        let ephemeral = EncryptionKeyPair::generate(rng);
        let filler = random_body(rng);
        out.push(seal_source_message(
            rng,
            self.keys.public(),
            &self.mixer_pub,
            ephemeral.public(),
            &filler,
            false,
        )?);

        Ok(out)
    }
}

/// The published receiving role.
pub struct ContactAgent {
    keys: EncryptionKeyPair,
    mixer_pub: EncryptionPublicKey,
    mixer_verify: VerifyKey,
    seen: SeenSet,
    outbox: VecDeque<(EncryptionPublicKey, Vec<u8>)>,
}

impl ContactAgent {
    /// Create an agent for one published contact identity.
    pub fn new(
        keys: EncryptionKeyPair,
        mixer_pub: EncryptionPublicKey,
        mixer_verify: VerifyKey,
    ) -> Self {
        Self { keys, mixer_pub, mixer_verify, seen: SeenSet::default(), outbox: VecDeque::new() }
    }
}

impl Agent for ContactAgent {
    type Outbound = (EncryptionPublicKey, Vec<u8>);

    fn inbound_direction(&self) -> Direction {
        Direction::SourceToContact
    }

    fn outbound_direction(&self) -> Direction {
        Direction::ContactToSource
    }

    fn queue(&mut self, (remote, body): Self::Outbound) -> Result<(), CryptoError> {
        ensure_fits(&body)?;
        self.outbox.push_back((remote, body));
        Ok(())
    }

    fn receive(&mut self, drops: &[Bytes]) -> InboxReport {
        let mut report = InboxReport { fetched: drops.len(), decoded: 0, fresh: Vec::new() };
        for drop in drops {
            let Ok((sender, body)) = open_contact_drop(&self.keys, &self.mixer_verify, drop)
            else {
                continue;
            };
            report.decoded += 1;

            // Identity is the full decoded content: sender key plus body.
            let mut content = Vec::with_capacity(32 + body.len());
            content.extend_from_slice(sender.as_bytes());
            content.extend_from_slice(&body);
            if self.seen.insert(&content) {
                report.fresh.push(IncomingMessage { sender: Some(sender), body });
            }
        }
        report
    }

    fn compose(&mut self, rng: &mut (impl RngCore + CryptoRng)) -> Result<Vec<Bytes>, CryptoError> {
        let mut out = Vec::with_capacity(2);

        if let Some((remote, body)) = self.outbox.pop_front() {
            out.push(seal_contact_message(rng, &self.keys, &self.mixer_pub, &remote, &body, true)?);
        }

        let ephemeral = EncryptionKeyPair::generate(rng);
        let filler = random_body(rng);
        out.push(seal_contact_message(
            rng,
            &self.keys,
            &self.mixer_pub,
            ephemeral.public(),
            &filler,
            false,
        )?);

        Ok(out)
    }
}

/// Random-length random content for dummy envelopes.
///
/// Padding fixes the ciphertext length either way; random content just
/// keeps the dummy plaintext free of any recognizable marker.
fn random_body(rng: &mut (impl RngCore + CryptoRng)) -> Vec<u8> {
    let len = (rng.next_u32() as usize) % (MAX_MESSAGE_LEN + 1);
    let mut body = vec![0u8; len];
    rng.fill_bytes(&mut body);
    body
}
