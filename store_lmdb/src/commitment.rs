//! LMDB implementation of CommitmentStore.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env};

use tempo_store::{last_position, CommitmentStore, StoreError};
use tempo_types::{Hash, NodeId};

use crate::{position_key, LmdbError};

/// Commitments keyed by `[nid][position]`.
pub struct LmdbCommitmentStore {
    env: Arc<Env>,
    commitments_db: Database<Bytes, Bytes>,
    closed: AtomicBool,
}

fn commitment_key(nid: &NodeId, position: u64) -> [u8; 24] {
    let mut key = [0u8; 24];
    key[..16].copy_from_slice(nid.as_bytes());
    key[16..].copy_from_slice(&position_key(position));
    key
}

impl LmdbCommitmentStore {
    pub(crate) fn new(env: Arc<Env>, commitments_db: Database<Bytes, Bytes>) -> Self {
        Self {
            env,
            commitments_db,
            closed: AtomicBool::new(false),
        }
    }

    fn ensure_open(&self) -> Result<(), StoreError> {
        if self.closed.load(Ordering::Acquire) {
            return Err(StoreError::Closed);
        }
        Ok(())
    }
}

impl CommitmentStore for LmdbCommitmentStore {
    fn put_commitments(
        &self,
        nid: &NodeId,
        commitments: &[Hash],
        start: u64,
    ) -> Result<(), StoreError> {
        self.ensure_open()?;
        if last_position(start, commitments.len())?.is_none() {
            return Ok(());
        }
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        for (offset, commitment) in commitments.iter().enumerate() {
            let key = commitment_key(nid, start + offset as u64);
            self.commitments_db
                .put(&mut wtxn, &key, commitment.as_bytes())
                .map_err(LmdbError::from)?;
        }
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_next_commitments(
        &self,
        nid: &NodeId,
        from: u64,
        limit: usize,
    ) -> Result<Vec<Hash>, StoreError> {
        self.ensure_open()?;
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let mut commitments = Vec::new();
        let mut position = from;
        while commitments.len() < limit {
            let Some(val) = self
                .commitments_db
                .get(&rtxn, &commitment_key(nid, position))
                .map_err(LmdbError::from)?
            else {
                break;
            };
            let arr: [u8; 32] = val.try_into().map_err(|_| {
                StoreError::Corruption(format!("commitment {nid}@{position} is not 32 bytes"))
            })?;
            commitments.push(Hash::new(arr));
            let Some(next) = position.checked_add(1) else {
                break;
            };
            position = next;
        }
        Ok(commitments)
    }

    fn reset_commitments(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.commitments_db
            .clear(&mut wtxn)
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
