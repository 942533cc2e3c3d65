//! Choosing which peers to sample for a conflict.

use std::collections::BTreeSet;

use rand::rngs::StdRng;
use rand::seq::IteratorRandom;
use rand::SeedableRng;
use tempo_types::{NodeId, TempoAtom};

/// Picks the nodes whose temporal proofs decide a conflict.
///
/// Selection must be deterministic for a given input so every node sampling
/// the same conflict converges on the same set.
pub trait SampleSelector: Send + Sync {
    fn select_samples(&self, live: &BTreeSet<NodeId>, reference: &TempoAtom) -> BTreeSet<NodeId>;
}

/// The `sample_size` live nodes closest to the reference atom by XOR distance.
#[derive(Clone, Debug)]
pub struct XorDistanceSelector {
    sample_size: usize,
}

impl XorDistanceSelector {
    pub fn new(sample_size: usize) -> Self {
        Self { sample_size }
    }
}

fn xor_distance(nid: &NodeId, reference: &[u8; 32]) -> [u8; 16] {
    let mut distance = [0u8; 16];
    for (i, byte) in distance.iter_mut().enumerate() {
        *byte = nid.as_bytes()[i] ^ reference[i];
    }
    distance
}

impl SampleSelector for XorDistanceSelector {
    fn select_samples(&self, live: &BTreeSet<NodeId>, reference: &TempoAtom) -> BTreeSet<NodeId> {
        let aid = reference.aid();
        let mut ranked: Vec<NodeId> = live.iter().copied().collect();
        ranked.sort_by_key(|nid| xor_distance(nid, aid.as_bytes()));
        ranked.into_iter().take(self.sample_size).collect()
    }
}

/// A uniform random subset of `sample_size` live nodes, seeded by the
/// reference atom id.
#[derive(Clone, Debug)]
pub struct SeededRandomSelector {
    sample_size: usize,
}

impl SeededRandomSelector {
    pub fn new(sample_size: usize) -> Self {
        Self { sample_size }
    }
}

impl SampleSelector for SeededRandomSelector {
    fn select_samples(&self, live: &BTreeSet<NodeId>, reference: &TempoAtom) -> BTreeSet<NodeId> {
        if live.len() <= self.sample_size {
            return live.clone();
        }
        let mut rng = StdRng::from_seed(*reference.aid().as_bytes());
        live.iter()
            .copied()
            .choose_multiple(&mut rng, self.sample_size)
            .into_iter()
            .collect()
    }
}
