//! Tempo atom: an atom together with its temporal proof.

use crate::ids::AtomId;
use crate::proof::TemporalProof;
use crate::vertex::TemporalVertex;
use serde::{Deserialize, Serialize};

/// An atom plus the [`TemporalProof`] of every node that has witnessed it.
///
/// Created when first validated or received; gains a vertex each time a node
/// re-attests to it. Immutable once committed to the ledger.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TempoAtom {
    payload: Vec<u8>,
    temporal_proof: TemporalProof,
}

impl TempoAtom {
    /// Wrap a payload; the atom id is derived from its content.
    pub fn new(payload: Vec<u8>) -> Self {
        let aid = AtomId::from_content(&payload);
        Self {
            payload,
            temporal_proof: TemporalProof::new(aid),
        }
    }

    /// Wrap a payload with an existing proof. The proof's atom id is authoritative.
    pub fn with_proof(payload: Vec<u8>, temporal_proof: TemporalProof) -> Self {
        Self {
            payload,
            temporal_proof,
        }
    }

    pub fn aid(&self) -> AtomId {
        self.temporal_proof.atom_id()
    }

    pub fn payload(&self) -> &[u8] {
        &self.payload
    }

    pub fn temporal_proof(&self) -> &TemporalProof {
        &self.temporal_proof
    }

    /// Record another node's attestation.
    pub fn add_vertex(&mut self, vertex: TemporalVertex) -> bool {
        self.temporal_proof.add_vertex(vertex)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::hash::Hash;
    use crate::keys::PublicKey;

    #[test]
    fn aid_is_content_derived() {
        let a = TempoAtom::new(b"transfer 10".to_vec());
        let b = TempoAtom::new(b"transfer 10".to_vec());
        let c = TempoAtom::new(b"transfer 11".to_vec());
        assert_eq!(a.aid(), b.aid());
        assert_ne!(a.aid(), c.aid());
    }

    #[test]
    fn add_vertex_grows_proof() {
        let mut atom = TempoAtom::new(b"atom".to_vec());
        let vertex = TemporalVertex::new(PublicKey([1u8; 32]), 1, 0, Hash::ZERO, Hash::ZERO, []);
        assert!(atom.add_vertex(vertex));
        assert_eq!(atom.temporal_proof().len(), 1);
    }
}
