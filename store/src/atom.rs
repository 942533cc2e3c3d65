//! Local atoms indexed by logical clock.

use tempo_types::{AtomId, TempoAtom, TemporalProof};

use crate::StoreError;

/// Read access to the local atom sequence, as needed to serve peers.
pub trait AtomStoreView: Send + Sync {
    /// Up to `limit` atom ids at contiguous logical clock positions starting
    /// at `from`.
    fn get_next_aids(&self, from: u64, limit: usize) -> Result<Vec<AtomId>, StoreError>;

    fn get_temporal_proof(&self, aid: &AtomId) -> Result<Option<TemporalProof>, StoreError>;
}

/// Writable atom store. The ledger appends committed atoms here.
pub trait AtomStore: AtomStoreView {
    /// Record `atom` at logical clock `clock`, replacing the proof held for
    /// its id.
    fn store_atom(&self, clock: u64, atom: &TempoAtom) -> Result<(), StoreError>;
}
