//! Roles and traffic directions.
//!
//! Both sets are closed by design: the protocol supports exactly two message
//! directions through exactly one mix hop, and exactly three principals.
//! Keeping them as enums (instead of runtime-extensible lookups) lets every
//! dispatch site match exhaustively.

use serde::{Deserialize, Serialize};
use serde_repr::{Deserialize_repr, Serialize_repr};

use crate::wire::{
    CONTACT_ENVELOPE_LEN, CONTACT_LANE_PAYLOAD_LEN, SIGNED_TO_CONTACT_LEN, SIGNED_TO_SOURCE_LEN,
    SOURCE_ENVELOPE_LEN, SOURCE_LANE_PAYLOAD_LEN,
};

/// The three principals of the protocol.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Submits content anonymously.
    Source,
    /// Receives and replies under a published identity.
    Contact,
    /// Trusted intermediary enforcing fixed-size, fixed-cadence batches.
    Mixer,
}

impl std::fmt::Display for Role {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Source => write!(f, "source"),
            Self::Contact => write!(f, "contact"),
            Self::Mixer => write!(f, "mixer"),
        }
    }
}

/// One of the two message directions through the mixer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize_repr, Deserialize_repr)]
#[repr(u8)]
pub enum Direction {
    /// Source -> Mixer -> Contact.
    SourceToContact = 0,
    /// Contact -> Mixer -> Source.
    ContactToSource = 1,
}

impl Direction {
    /// Both directions, in a fixed order for per-lane iteration.
    pub const ALL: [Self; 2] = [Self::SourceToContact, Self::ContactToSource];

    /// The role that enqueues envelopes into this direction.
    pub fn producer(self) -> Role {
        match self {
            Self::SourceToContact => Role::Source,
            Self::ContactToSource => Role::Contact,
        }
    }

    /// The role that polls this direction's deaddrop.
    pub fn consumer(self) -> Role {
        match self {
            Self::SourceToContact => Role::Contact,
            Self::ContactToSource => Role::Source,
        }
    }

    /// Fixed length of an envelope entering the mixer on this direction.
    pub fn envelope_len(self) -> usize {
        match self {
            Self::SourceToContact => SOURCE_ENVELOPE_LEN,
            Self::ContactToSource => CONTACT_ENVELOPE_LEN,
        }
    }

    /// Fixed length of the inner ciphertext the mixer forwards.
    pub fn lane_payload_len(self) -> usize {
        match self {
            Self::SourceToContact => SOURCE_LANE_PAYLOAD_LEN,
            Self::ContactToSource => CONTACT_LANE_PAYLOAD_LEN,
        }
    }

    /// Fixed length of a signed drop leaving the mixer on this direction.
    pub fn signed_len(self) -> usize {
        match self {
            Self::SourceToContact => SIGNED_TO_CONTACT_LEN,
            Self::ContactToSource => SIGNED_TO_SOURCE_LEN,
        }
    }
}

impl std::fmt::Display for Direction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::SourceToContact => write!(f, "source->contact"),
            Self::ContactToSource => write!(f, "contact->source"),
        }
    }
}
