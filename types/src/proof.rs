//! Temporal proof: the per-atom DAG of vertices from every witnessing node.

use crate::error::TypesError;
use crate::ids::{AtomId, NodeId};
use crate::vertex::TemporalVertex;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Every [`TemporalVertex`] known for one atom.
///
/// An atom "has a vertex by node N" iff some vertex in its proof is owned by N.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TemporalProof {
    atom_id: AtomId,
    vertices: Vec<TemporalVertex>,
}

impl TemporalProof {
    /// An empty proof for `atom_id`.
    pub fn new(atom_id: AtomId) -> Self {
        Self {
            atom_id,
            vertices: Vec::new(),
        }
    }

    pub fn with_vertices(atom_id: AtomId, vertices: impl IntoIterator<Item = TemporalVertex>) -> Self {
        let mut proof = Self::new(atom_id);
        for vertex in vertices {
            proof.add_vertex(vertex);
        }
        proof
    }

    pub fn atom_id(&self) -> AtomId {
        self.atom_id
    }

    pub fn vertices(&self) -> &[TemporalVertex] {
        &self.vertices
    }

    pub fn is_empty(&self) -> bool {
        self.vertices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.vertices.len()
    }

    /// Add a vertex. Returns `false` if a vertex with the same owner and clock
    /// is already present.
    pub fn add_vertex(&mut self, vertex: TemporalVertex) -> bool {
        let duplicate = self
            .vertices
            .iter()
            .any(|v| v.owner == vertex.owner && v.clock == vertex.clock);
        if duplicate {
            return false;
        }
        self.vertices.push(vertex);
        true
    }

    pub fn has_vertex_by(&self, nid: &NodeId) -> bool {
        self.vertices.iter().any(|v| v.owner_nid() == *nid)
    }

    /// The earliest vertex owned by `nid`, if any.
    pub fn vertex_by(&self, nid: &NodeId) -> Option<&TemporalVertex> {
        self.vertices
            .iter()
            .filter(|v| v.owner_nid() == *nid)
            .min_by_key(|v| v.clock)
    }

    /// Node ids of every vertex owner.
    pub fn owners(&self) -> BTreeSet<NodeId> {
        self.vertices.iter().map(TemporalVertex::owner_nid).collect()
    }

    /// Merge the vertices of another proof for the same atom.
    pub fn merge(&mut self, other: &TemporalProof) -> Result<usize, TypesError> {
        if other.atom_id != self.atom_id {
            return Err(TypesError::ProofMismatch {
                expected: self.atom_id,
                actual: other.atom_id,
            });
        }
        let added = other
            .vertices
            .iter()
            .filter(|v| self.add_vertex((*v).clone()))
            .count();
        Ok(added)
    }
}
