//! Covermix relay: the external dead-drop collaborator.
//!
//! The relay owns the only state shared between the three processes. This
//! crate provides the reference in-memory implementation:
//!
//! - [`MemoryDropStore`]: per-direction pending queues (monotonic ids,
//!   oldest-first, idempotent deletes) and retention-windowed broadcast
//!   deaddrops, plus the published key material
//! - [`AccessTokens`]: the three bearer tokens and their role mapping
//! - [`InProcessRelay`]: a [`covermix_core::RelayClient`] bound to a store
//!   and one caller token
//!
//! Envelope bytes are hex strings everywhere inside the relay; transport
//! framing beyond that is deliberately out of the core contract, so this
//! store binds in-process rather than over a socket.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod auth;
mod client;
mod store;

pub use auth::AccessTokens;
pub use client::InProcessRelay;
pub use store::{MemoryDropStore, StoreConfig, StoreError};
