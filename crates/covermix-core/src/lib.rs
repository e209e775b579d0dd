//! Covermix core state machines.
//!
//! This crate holds the protocol logic that sits between the crypto layer
//! and any runtime: the mixer's per-direction batching engine, the source
//! and contact agent cycles, and the periodic drivers that advance them.
//!
//! ## Architecture
//!
//! ```text
//! covermix-core
//!   ├─ Environment     (time/randomness seam, production + test impls)
//!   ├─ RelayClient     (injected dead-drop capability)
//!   ├─ MixBatcher      (per-direction buffer, absorb/plan/commit)
//!   ├─ SourceAgent /
//!   │  ContactAgent    (decode, dedup, one real + one dummy per cycle)
//!   └─ MixerDriver /
//!      AgentDriver     (periodic loops, backoff, graceful shutdown)
//! ```
//!
//! State machines do no I/O. The drivers own the only suspension points
//! (relay calls and the inter-cycle sleep), which keeps every invariant
//! testable without a network.

#![forbid(unsafe_code)]
#![warn(missing_docs)]

pub mod agent;
pub mod driver;
pub mod env;
pub mod mixer;
pub mod relay;

pub use agent::{Agent, ContactAgent, InboxReport, IncomingMessage, SeenSet, SourceAgent};
pub use driver::{AgentDriver, DriverError, MixerDriver};
pub use env::{EnvRng, Environment};
pub use mixer::{BatchPlan, ConfigError, CycleStats, MixBatcher, MixConfig};
pub use relay::{DropId, FetchedDrop, RelayClient, RelayError};
