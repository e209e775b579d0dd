//! Covermix runnable node.
//!
//! This crate provides the process plumbing around the protocol crates:
//! the production [`Environment`](covermix_core::Environment)
//! implementation, single-line hex key-file persistence, a startup key
//! self-check, and the demo pipeline that runs relay + mixer + both agents
//! in one process.
//!
//! ## Architecture
//!
//! ```text
//! covermix-node
//!   ├─ SystemEnv      (system clock + getrandom)
//!   ├─ KeyDir         (hex key files, seed/load)
//!   └─ run_demo       (store + MixerDriver + 2x AgentDriver, ctrl-c aware)
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]

mod demo;
mod error;
mod keyfiles;
mod system_env;

pub use demo::{DemoConfig, run_demo};
pub use error::NodeError;
pub use keyfiles::KeyDir;
pub use system_env::SystemEnv;
