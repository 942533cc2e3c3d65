//! LMDB implementation of AtomStore.

use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env};

use tempo_store::{AtomStore, AtomStoreView, StoreError};
use tempo_types::{AtomId, TempoAtom, TemporalProof};

use crate::{position_key, LmdbError};

/// Local atom sequence: `clock -> aid` plus `aid -> bincode(TemporalProof)`.
pub struct LmdbAtomStore {
    env: Arc<Env>,
    atoms_db: Database<Bytes, Bytes>,
    proofs_db: Database<Bytes, Bytes>,
}

impl LmdbAtomStore {
    pub(crate) fn new(
        env: Arc<Env>,
        atoms_db: Database<Bytes, Bytes>,
        proofs_db: Database<Bytes, Bytes>,
    ) -> Self {
        Self {
            env,
            atoms_db,
            proofs_db,
        }
    }
}

impl AtomStoreView for LmdbAtomStore {
    fn get_next_aids(&self, from: u64, limit: usize) -> Result<Vec<AtomId>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut aids = Vec::new();
        let mut clock = from;
        while aids.len() < limit {
            let Some(val) = self
                .atoms_db
                .get(&rtxn, &position_key(clock))
                .map_err(LmdbError::from)?
            else {
                break;
            };
            let arr: [u8; 32] = val.try_into().map_err(|_| {
                StoreError::Corruption(format!("atom id at clock {clock} is not 32 bytes"))
            })?;
            aids.push(AtomId::new(arr));
            clock += 1;
        }
        Ok(aids)
    }

    fn get_temporal_proof(&self, aid: &AtomId) -> Result<Option<TemporalProof>, StoreError> {
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let Some(val) = self
            .proofs_db
            .get(&rtxn, aid.as_bytes())
            .map_err(LmdbError::from)?
        else {
            return Ok(None);
        };
        let proof: TemporalProof = bincode::deserialize(val).map_err(LmdbError::from)?;
        Ok(Some(proof))
    }
}

impl AtomStore for LmdbAtomStore {
    fn store_atom(&self, clock: u64, atom: &TempoAtom) -> Result<(), StoreError> {
        let aid = atom.aid();
        let proof = bincode::serialize(atom.temporal_proof()).map_err(LmdbError::from)?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.atoms_db
            .put(&mut wtxn, &position_key(clock), aid.as_bytes())
            .map_err(LmdbError::from)?;
        self.proofs_db
            .put(&mut wtxn, aid.as_bytes(), &proof)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::LmdbEnvironment;
    use tempo_types::{Hash, PublicKey, TemporalVertex};

    #[test]
    fn stores_sequence_and_proofs() {
        let dir = tempfile::tempdir().unwrap();
        let env = LmdbEnvironment::open(dir.path(), 8, 10 * 1024 * 1024).unwrap();
        let store = env.atom_store();

        let mut first = TempoAtom::new(b"first".to_vec());
        first.add_vertex(TemporalVertex::new(
            PublicKey([1u8; 32]),
            1,
            0,
            Hash::new([9u8; 32]),
            Hash::ZERO,
            [],
        ));
        let second = TempoAtom::new(b"second".to_vec());
        store.store_atom(0, &first).unwrap();
        store.store_atom(1, &second).unwrap();

        assert_eq!(
            store.get_next_aids(0, 10).unwrap(),
            vec![first.aid(), second.aid()]
        );
        assert_eq!(store.get_next_aids(1, 10).unwrap(), vec![second.aid()]);
        assert!(store.get_next_aids(2, 10).unwrap().is_empty());

        let proof = store.get_temporal_proof(&first.aid()).unwrap().unwrap();
        assert_eq!(proof.len(), 1);
        assert!(store
            .get_temporal_proof(&AtomId::new([0u8; 32]))
            .unwrap()
            .is_none());
    }
}
