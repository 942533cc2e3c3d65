//! Resolve conflicts from this node's own temporal proofs.

use tempo_engine::{
    ConflictResolvedAction, StateBundle, TempoAction, TempoEpic, TempoError,
};
use tempo_types::{NodeId, TempoAtom};

/// Picks the candidate carrying this node's earliest vertex.
///
/// Fails with [`TempoError::NoLocalWitness`] when no candidate has a vertex
/// by this node.
pub struct LocalResolverEpic {
    local: NodeId,
}

impl LocalResolverEpic {
    pub fn new(local: NodeId) -> Self {
        Self { local }
    }

    fn local_clock(&self, atom: &TempoAtom) -> Option<u64> {
        atom.temporal_proof()
            .vertex_by(&self.local)
            .map(|vertex| vertex.clock)
    }
}

impl TempoEpic for LocalResolverEpic {
    fn name(&self) -> &'static str {
        "local_resolver"
    }

    fn epic(
        &self,
        _bundle: &StateBundle,
        action: &TempoAction,
    ) -> Result<Vec<TempoAction>, TempoError> {
        let TempoAction::RaiseConflict(raise) = action else {
            return Ok(Vec::new());
        };

        let winner = raise
            .candidates()
            .filter_map(|atom| self.local_clock(atom).map(|clock| (clock, atom.aid())))
            .min()
            .map(|(_, aid)| aid)
            .ok_or(TempoError::NoLocalWitness(raise.tag))?;

        tracing::info!(tag = %raise.tag, %winner, "resolved conflict locally");
        Ok(vec![ConflictResolvedAction {
            winner,
            aids: raise.aids(),
            tag: raise.tag,
        }
        .into()])
    }
}
