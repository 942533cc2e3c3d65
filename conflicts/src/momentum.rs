//! Momentum: how many sampled nodes witnessed each candidate first.

use std::collections::{BTreeMap, BTreeSet};

use tempo_types::{AtomId, NodeId, TemporalProof};

/// Voting weight of a node when measuring momentum.
pub trait MomentumWeight: Send + Sync {
    fn weight(&self, nid: &NodeId) -> u64;
}

/// Every node counts once.
#[derive(Clone, Copy, Debug, Default)]
pub struct UniformWeight;

impl MomentumWeight for UniformWeight {
    fn weight(&self, _nid: &NodeId) -> u64 {
        1
    }
}

impl<F> MomentumWeight for F
where
    F: Fn(&NodeId) -> u64 + Send + Sync,
{
    fn weight(&self, nid: &NodeId) -> u64 {
        self(nid)
    }
}

/// Map each atom to the nodes that prefer it.
///
/// Every vertex owner across `samples` votes exactly once, for the atom whose
/// proof holds its lowest-clock vertex. Equal clocks go to the smaller atom
/// id.
pub fn extract_preferences(samples: &[TemporalProof]) -> BTreeMap<AtomId, Vec<NodeId>> {
    let mut earliest: BTreeMap<NodeId, (u64, AtomId)> = BTreeMap::new();
    for proof in samples {
        for owner in proof.owners() {
            let Some(vertex) = proof.vertex_by(&owner) else {
                continue;
            };
            let candidate = (vertex.clock, proof.atom_id());
            earliest
                .entry(owner)
                .and_modify(|best| {
                    if candidate < *best {
                        *best = candidate;
                    }
                })
                .or_insert(candidate);
        }
    }

    let mut preferences: BTreeMap<AtomId, Vec<NodeId>> = BTreeMap::new();
    for (nid, (_, aid)) in earliest {
        preferences.entry(aid).or_default().push(nid);
    }
    preferences
}

/// Sum the weights of each atom's supporters, saturating at `u64::MAX`.
pub fn measure(
    preferences: &BTreeMap<AtomId, Vec<NodeId>>,
    weight: &dyn MomentumWeight,
) -> BTreeMap<AtomId, u64> {
    preferences
        .iter()
        .map(|(aid, nids)| {
            let momentum = nids
                .iter()
                .map(|nid| weight.weight(nid))
                .fold(0u64, u64::saturating_add);
            (*aid, momentum)
        })
        .collect()
}

/// The atom with the highest momentum; ties go to the smallest atom id.
pub fn select_winner(momenta: &BTreeMap<AtomId, u64>) -> Option<AtomId> {
    let mut winner: Option<(AtomId, u64)> = None;
    for (aid, momentum) in momenta {
        match winner {
            Some((_, best)) if *momentum <= best => {}
            _ => winner = Some((*aid, *momentum)),
        }
    }
    winner.map(|(aid, _)| aid)
}

/// Drop samples for atoms outside `candidates`.
pub(crate) fn restrict_to(
    samples: &[TemporalProof],
    candidates: &BTreeSet<AtomId>,
) -> Vec<TemporalProof> {
    samples
        .iter()
        .filter(|proof| candidates.contains(&proof.atom_id()))
        .cloned()
        .collect()
}
