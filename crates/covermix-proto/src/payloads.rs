//! Relay payload types.
//!
//! These are the values that cross the relay boundary. Envelope bytes are
//! always carried as hex strings of the exact lengths in [`crate::wire`];
//! the relay itself never inspects them beyond length checks.

use std::collections::BTreeMap;

use bytes::Bytes;
use serde::{Deserialize, Serialize};

use crate::wire::{self, WireError};

/// A still-queued envelope handed to the mixer, with its relay id.
///
/// Ids are assigned by the relay, strictly increasing per direction, and are
/// the handle for single-delivery deletion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueuedEnvelope {
    /// Relay-assigned id, unique within its direction.
    pub id: u64,
    /// Hex-encoded envelope bytes.
    pub envelope: String,
}

impl QueuedEnvelope {
    /// Decode the hex payload back into envelope bytes.
    pub fn envelope_bytes(&self) -> Result<Bytes, WireError> {
        wire::decode_hex(&self.envelope).map(Bytes::from)
    }
}

/// A signed output batch posted by the mixer in one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchSubmission {
    /// Hex-encoded signed drops, all of one direction's fixed output length.
    pub messages: Vec<String>,
}

/// The publicly distributed key material.
///
/// The mixer's keys are global; contact keys are published per contact id so
/// a source can pick whom to write to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PublishedKeys {
    /// Mixer public encryption key, hex.
    pub mixer_key: String,
    /// Mixer public verify key, hex.
    pub mixer_sign_key: String,
    /// Published contact public encryption keys by contact id, hex.
    pub contact_keys: BTreeMap<u32, String>,
}

impl PublishedKeys {
    /// Look up a contact's published key.
    pub fn contact_key(&self, contact_id: u32) -> Option<&str> {
        self.contact_keys.get(&contact_id).map(String::as_str)
    }
}
