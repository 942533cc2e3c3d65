//! LMDB implementation of CursorStore.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env};

use tempo_store::{CursorKind, CursorStore, StoreError};
use tempo_types::NodeId;

use crate::LmdbError;

/// Cursor positions keyed by `[kind][nid]`, values are big-endian `u64`.
pub struct LmdbCursorStore {
    env: Arc<Env>,
    cursors_db: Database<Bytes, Bytes>,
    closed: AtomicBool,
}

fn cursor_key(nid: &NodeId, kind: CursorKind) -> [u8; 17] {
    let mut key = [0u8; 17];
    key[0] = kind.prefix();
    key[1..].copy_from_slice(nid.as_bytes());
    key
}

impl LmdbCursorStore {
    pub(crate) fn new(env: Arc<Env>, cursors_db: Database<Bytes, Bytes>) -> Self {
        Self {
            env,
            cursors_db,
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

impl CursorStore for LmdbCursorStore {
    fn put_cursor(&self, nid: &NodeId, kind: CursorKind, position: u64) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.cursors_db
            .put(&mut wtxn, &cursor_key(nid, kind), &position.to_be_bytes())
            .map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn get_cursor(&self, nid: &NodeId, kind: CursorKind) -> Result<Option<u64>, StoreError> {
        self.ensure_open()?;
        let rtxn = self.env.read_txn().map_err(LmdbError::from)?;
        let val = self
            .cursors_db
            .get(&rtxn, &cursor_key(nid, kind))
            .map_err(LmdbError::from)?;
        match val {
            Some(bytes) => {
                let arr: [u8; 8] = bytes.try_into().map_err(|_| {
                    StoreError::Corruption(format!("cursor for {nid} has {} bytes", bytes.len()))
                })?;
                Ok(Some(u64::from_be_bytes(arr)))
            }
            None => Ok(None),
        }
    }

    fn reset_cursors(&self) -> Result<(), StoreError> {
        self.ensure_open()?;
        let mut wtxn = self.env.write_txn().map_err(LmdbError::from)?;
        self.cursors_db.clear(&mut wtxn).map_err(LmdbError::from)?;
        wtxn.commit().map_err(LmdbError::from)?;
        Ok(())
    }

    fn close(&self) {
        self.closed.store(true, Ordering::Release);
    }
}
