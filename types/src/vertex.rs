//! Temporal vertex: one node's signed attestation to an atom.

use crate::hash::Hash;
use crate::ids::NodeId;
use crate::keys::{PublicKey, Signature};
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;
use std::fmt;

/// A node's attestation that it has witnessed an atom.
///
/// Per owner, `clock` strictly increases along the vertex chain, and each
/// `commitment` is chained from the owner's previous commitment. `previous`
/// is the id of the owner's previous vertex ([`Hash::ZERO`] at the root).
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalVertex {
    /// Public key of the attesting node.
    pub owner: PublicKey,
    /// The owner's logical clock value at attestation.
    pub clock: u64,
    /// Secondary round clock.
    pub rclock: u64,
    /// Commitment chained from the owner's previous vertex.
    pub commitment: Hash,
    /// Id of the owner's previous vertex.
    pub previous: Hash,
    /// Nodes the vertex was relayed through.
    pub nids: BTreeSet<NodeId>,
    /// Signature over every other field, set once signed.
    pub signature: Option<Signature>,
}

impl TemporalVertex {
    /// Create an unsigned vertex.
    pub fn new(
        owner: PublicKey,
        clock: u64,
        rclock: u64,
        commitment: Hash,
        previous: Hash,
        nids: impl IntoIterator<Item = NodeId>,
    ) -> Self {
        Self {
            owner,
            clock,
            rclock,
            commitment,
            previous,
            nids: nids.into_iter().collect(),
            signature: None,
        }
    }

    /// The node id of the owner.
    pub fn owner_nid(&self) -> NodeId {
        self.owner.node_id()
    }

    /// Canonical bytes covered by the signature.
    pub fn signing_bytes(&self) -> Vec<u8> {
        let mut bytes = Vec::with_capacity(32 + 8 + 8 + 32 + 32 + 4 + 16 * self.nids.len());
        bytes.extend_from_slice(self.owner.as_bytes());
        bytes.extend_from_slice(&self.clock.to_be_bytes());
        bytes.extend_from_slice(&self.rclock.to_be_bytes());
        bytes.extend_from_slice(self.commitment.as_bytes());
        bytes.extend_from_slice(self.previous.as_bytes());
        bytes.extend_from_slice(&(self.nids.len() as u32).to_be_bytes());
        for nid in &self.nids {
            bytes.extend_from_slice(nid.as_bytes());
        }
        bytes
    }

    /// Content id of this vertex, referenced by the owner's next vertex.
    pub fn id(&self) -> Hash {
        let digest = Blake2b::<U32>::digest(self.signing_bytes());
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Hash::new(bytes)
    }

    pub fn is_signed(&self) -> bool {
        self.signature.is_some()
    }
}

impl fmt::Display for TemporalVertex {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}:{}:{}:{} -> {:?}",
            self.owner_nid(),
            self.clock,
            self.commitment,
            self.previous,
            self.nids
        )
    }
}
