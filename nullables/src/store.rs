//! Nullable stores: thread-safe in-memory storage for testing.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tempo_store::{
    last_position, AtomStore, AtomStoreView, CommitmentStore, CursorKind, CursorStore, StoreError,
};
use tempo_types::{AtomId, Hash, NodeId, TempoAtom, TemporalProof};

/// An in-memory cursor store.
pub struct NullCursorStore {
    cursors: Mutex<HashMap<(NodeId, CursorKind), u64>>,
    closed: AtomicBool,
}

impl NullCursorStore {
    pub fn new() -> Self {
        Self {
            cursors: Mutex::new(HashMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    pub fn len(&self) -> usize {
        self.cursors.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl Default for NullCursorStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CursorStore for NullCursorStore {
    fn put_cursor(&self, nid: &NodeId, kind: CursorKind, position: u64) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.cursors.lock().unwrap().insert((*nid, kind), position);
        Ok(())
    }

    fn get_cursor(&self, nid: &NodeId, kind: CursorKind) -> Result<Option<u64>, StoreError> {
        self.ensure_open()?;
        Ok(self.cursors.lock().unwrap().get(&(*nid, kind)).copied())
    }

    fn reset_cursors(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.cursors.lock().unwrap().clear();
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// An in-memory commitment store.
pub struct NullCommitmentStore {
    commitments: Mutex<BTreeMap<(NodeId, u64), Hash>>,
    closed: AtomicBool,
}

impl NullCommitmentStore {
    pub fn new() -> Self {
        Self {
            commitments: Mutex::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Number of commitments held for `nid`.
    pub fn count_for(&self, nid: &NodeId) -> usize {
        self.commitments
            .lock()
            .unwrap()
            .keys()
            .filter(|(owner, _)| owner == nid)
            .count()
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.is_closed() {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl Default for NullCommitmentStore {
    fn default() -> Self {
        Self::new()
    }
}

impl CommitmentStore for NullCommitmentStore {
    fn put_commitments(
        &self,
        nid: &NodeId,
        commitments: &[Hash],
        start: u64,
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        last_position(start, commitments.len())?;
        let mut stored = self.commitments.lock().unwrap();
        for (offset, commitment) in commitments.iter().enumerate() {
            stored.insert((*nid, start + offset as u64), *commitment);
        }
        Ok(())
    }

    fn get_next_commitments(
        &self,
        nid: &NodeId,
        from: u64,
        limit: usize,
    ) -> Result<Vec<Hash>, StoreError> {
        self.ensure_open()?;
        let stored = self.commitments.lock().unwrap();
        Ok((from..=u64::MAX)
            .map_while(|position| stored.get(&(*nid, position)).copied())
            .take(limit)
            .collect())
    }

    fn reset_commitments(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        self.commitments.lock().unwrap().clear();
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }
}

/// An in-memory local atom sequence.
pub struct NullAtomStore {
    aids: Mutex<BTreeMap<u64, AtomId>>,
    proofs: Mutex<HashMap<AtomId, TemporalProof>>,
}

impl NullAtomStore {
    pub fn new() -> Self {
        Self {
            aids: Mutex::new(BTreeMap::new()),
            proofs: Mutex::new(HashMap::new()),
        }
    }

    /// Append `atom` at the next free clock and return that clock.
    pub fn append(&self, atom: &TempoAtom) -> u64 {
        let mut aids = self.aids.lock().unwrap();
        let clock = aids.keys().next_back().map_or(0, |last| last + 1);
        aids.insert(clock, atom.aid());
        self.proofs
            .lock()
            .unwrap()
            .insert(atom.aid(), atom.temporal_proof().clone());
        clock
    }

    pub fn len(&self) -> usize {
        self.aids.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for NullAtomStore {
    fn default() -> Self {
        Self::new()
    }
}

impl AtomStoreView for NullAtomStore {
    fn get_next_aids(&self, from: u64, limit: usize) -> Result<Vec<AtomId>, StoreError> {
        let aids = self.aids.lock().unwrap();
        Ok((from..=u64::MAX)
            .map_while(|clock| aids.get(&clock).copied())
            .take(limit)
            .collect())
    }

    fn get_temporal_proof(&self, aid: &AtomId) -> Result<Option<TemporalProof>, StoreError> {
        Ok(self.proofs.lock().unwrap().get(aid).cloned())
    }
}

impl AtomStore for NullAtomStore {
    fn store_atom(&self, clock: u64, atom: &TempoAtom) -> Result<(), StoreError> {
        self.aids.lock().unwrap().insert(clock, atom.aid());
        self.proofs
            .lock()
            .unwrap()
            .insert(atom.aid(), atom.temporal_proof().clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nid(n: u8) -> NodeId {
        NodeId::new([n; 16])
    }

    #[test]
    fn cursor_put_get() {
        let store = NullCursorStore::new();
        store.put_cursor(&nid(1), CursorKind::Discovery, 7).unwrap();
        assert_eq!(store.get_cursor(&nid(1), CursorKind::Discovery).unwrap(), Some(7));
        assert_eq!(store.get_cursor(&nid(1), CursorKind::Lag).unwrap(), None);
    }

    #[test]
    fn cursor_reset_is_idempotent() {
        let store = NullCursorStore::new();
        store.put_cursor(&nid(1), CursorKind::Discovery, 7).unwrap();
        store.reset_cursors().unwrap();
        store.reset_cursors().unwrap();
        assert!(store.is_empty());
    }

    #[test]
    fn closed_cursor_store_errors() {
        let store = NullCursorStore::new();
        store.close();
        assert!(matches!(
            store.put_cursor(&nid(1), CursorKind::Discovery, 1),
            Err(StoreError::Closed)
        ));
    }

    #[test]
    fn commitments_stop_at_gap() {
        let store = NullCommitmentStore::new();
        let hashes: Vec<Hash> = (1..=3).map(|i| Hash::new([i; 32])).collect();
        store.put_commitments(&nid(1), &hashes, 0).unwrap();
        store.put_commitments(&nid(1), &hashes, 10).unwrap();
        assert_eq!(store.get_next_commitments(&nid(1), 1, 10).unwrap(), hashes[1..].to_vec());
        assert_eq!(store.get_next_commitments(&nid(1), 0, 2).unwrap().len(), 2);
        assert_eq!(store.count_for(&nid(1)), 6);
        store.reset_commitments().unwrap();
        store.reset_commitments().unwrap();
        assert_eq!(store.count_for(&nid(1)), 0);
    }

    #[test]
    fn commitments_past_the_last_position_are_rejected() {
        let store = NullCommitmentStore::new();
        let hashes = [Hash::new([1; 32]), Hash::new([2; 32])];
        assert!(matches!(
            store.put_commitments(&nid(1), &hashes, u64::MAX),
            Err(StoreError::PositionOverflow { .. })
        ));
        assert_eq!(store.count_for(&nid(1)), 0);

        store.put_commitments(&nid(1), &hashes[..1], u64::MAX).unwrap();
        assert_eq!(store.count_for(&nid(1)), 1);
        assert_eq!(store.get_next_commitments(&nid(1), u64::MAX, 5).unwrap(), hashes[..1].to_vec());
    }

    #[test]
    fn atoms_append_in_order() {
        let store = NullAtomStore::new();
        let a = TempoAtom::new(b"a".to_vec());
        let b = TempoAtom::new(b"b".to_vec());
        assert_eq!(store.append(&a), 0);
        assert_eq!(store.append(&b), 1);
        assert_eq!(store.get_next_aids(0, 10).unwrap(), vec![a.aid(), b.aid()]);
        assert_eq!(store.get_next_aids(1, 1).unwrap(), vec![b.aid()]);
        assert!(store.get_temporal_proof(&a.aid()).unwrap().is_some());
    }
}
