//! Network message types for Tempo node-to-node communication.
//!
//! Every message sent between nodes is wrapped in [`TempoMessage`] and framed
//! by [`codec`]. Delivery is the transport's concern; the core only sees the
//! [`PeerMessenger`] contract.

pub mod codec;
pub mod error;
pub mod messenger;
pub mod peer;

pub use error::MessageError;
pub use messenger::PeerMessenger;
pub use peer::Peer;

use serde::{Deserialize, Serialize};
use tempo_types::{AtomId, ConflictTag, Hash, LogicalClockCursor, TemporalProof};

/// Ask a peer for its atoms from a logical clock position.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryRequestMessage {
    pub cursor: LogicalClockCursor,
}

/// A page of a peer's atom sequence.
///
/// `cursor` is the position that was served; `cursor.next`, when present, is
/// where the following page starts. `commitments.len() >= aids.len()`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DiscoveryResponseMessage {
    pub cursor: LogicalClockCursor,
    pub commitments: Vec<Hash>,
    pub aids: Vec<AtomId>,
}

/// Ask a peer for its temporal proofs of the atoms in a conflict.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleRequestMessage {
    pub tag: ConflictTag,
    pub aids: Vec<AtomId>,
}

/// Temporal proofs for the requested atoms the peer knows of.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SampleResponseMessage {
    pub tag: ConflictTag,
    pub proofs: Vec<TemporalProof>,
}

/// Top-level wire message.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum TempoMessage {
    DiscoveryRequest(DiscoveryRequestMessage),
    DiscoveryResponse(DiscoveryResponseMessage),
    SampleRequest(SampleRequestMessage),
    SampleResponse(SampleResponseMessage),
}

/// Discriminant of a [`TempoMessage`], used to route inbound messages.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum MessageKind {
    DiscoveryRequest,
    DiscoveryResponse,
    SampleRequest,
    SampleResponse,
}

impl TempoMessage {
    pub fn kind(&self) -> MessageKind {
        match self {
            TempoMessage::DiscoveryRequest(_) => MessageKind::DiscoveryRequest,
            TempoMessage::DiscoveryResponse(_) => MessageKind::DiscoveryResponse,
            TempoMessage::SampleRequest(_) => MessageKind::SampleRequest,
            TempoMessage::SampleResponse(_) => MessageKind::SampleResponse,
        }
    }
}

impl From<DiscoveryRequestMessage> for TempoMessage {
    fn from(m: DiscoveryRequestMessage) -> Self {
        TempoMessage::DiscoveryRequest(m)
    }
}

impl From<DiscoveryResponseMessage> for TempoMessage {
    fn from(m: DiscoveryResponseMessage) -> Self {
        TempoMessage::DiscoveryResponse(m)
    }
}

impl From<SampleRequestMessage> for TempoMessage {
    fn from(m: SampleRequestMessage) -> Self {
        TempoMessage::SampleRequest(m)
    }
}

impl From<SampleResponseMessage> for TempoMessage {
    fn from(m: SampleResponseMessage) -> Self {
        TempoMessage::SampleResponse(m)
    }
}
