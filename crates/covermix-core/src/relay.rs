//! The injected relay capability.
//!
//! The relay is the only shared resource between the three processes. Core
//! logic never constructs one; it receives an implementation of
//! [`RelayClient`] explicitly (never a hidden singleton) and treats every
//! failure as transient: abort the cycle, keep in-memory state untouched,
//! retry on the next tick.

use async_trait::async_trait;
use bytes::Bytes;
use covermix_proto::{Direction, PublishedKeys};
use thiserror::Error;

/// Relay-assigned envelope id, unique within a direction.
pub type DropId = u64;

/// An envelope fetched from a pending queue, still owned by the relay until
/// explicitly deleted.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FetchedDrop {
    /// Handle for single-delivery deletion.
    pub id: DropId,
    /// The opaque envelope bytes.
    pub envelope: Bytes,
}

/// Transient relay failures.
///
/// All variants are recoverable by retrying on a later cycle; none of them
/// may be allowed to corrupt buffered state.
#[derive(Debug, Error)]
pub enum RelayError {
    /// The bearer token was rejected or the role may not perform this call.
    #[error("relay refused the caller's token for this operation")]
    Unauthorized,

    /// Transport or storage failure.
    #[error("relay transport error: {0}")]
    Transport(String),

    /// The relay returned bytes that fail wire-level decoding.
    #[error("relay payload invalid: {0}")]
    InvalidPayload(String),
}

/// Capability handle to the external dead-drop relay.
///
/// Semantics the core depends on (anything beyond this, such as transport
/// framing, is the relay's own business):
///
/// - `enqueue` is append-only and returns a strictly increasing id per
///   direction
/// - `fetch_oldest` is non-destructive and oldest-first
/// - `delete` is idempotent
/// - `post_batch` makes a whole output batch visible in one call
/// - `fetch_deaddrop` is a broadcast poll; consumption is the reader's
///   dedup problem
#[async_trait]
pub trait RelayClient: Send + Sync {
    /// Append one envelope to a direction's pending queue.
    async fn enqueue(&self, direction: Direction, envelope: Bytes) -> Result<DropId, RelayError>;

    /// Return up to `count` oldest still-queued envelopes, oldest first.
    async fn fetch_oldest(
        &self,
        direction: Direction,
        count: usize,
    ) -> Result<Vec<FetchedDrop>, RelayError>;

    /// Remove a previously fetched envelope. Idempotent.
    async fn delete(&self, direction: Direction, id: DropId) -> Result<(), RelayError>;

    /// Publish a signed output batch into the direction's deaddrop.
    async fn post_batch(&self, direction: Direction, batch: Vec<Bytes>) -> Result<(), RelayError>;

    /// Poll every currently visible drop for the direction's consumer.
    async fn fetch_deaddrop(&self, direction: Direction) -> Result<Vec<Bytes>, RelayError>;

    /// Fetch the published public key material.
    async fn published_keys(&self) -> Result<PublishedKeys, RelayError>;
}
