//! LMDB environment setup.

use std::path::Path;
use std::sync::Arc;

use heed::types::Bytes;
use heed::{Database, Env, EnvOpenOptions};

use crate::{LmdbAtomStore, LmdbCommitmentStore, LmdbCursorStore, LmdbError};

const CURSORS_DB: &str = "tempo.cursors";
const COMMITMENTS_DB: &str = "tempo.commitments";
const ATOMS_DB: &str = "tempo.atoms";
const PROOFS_DB: &str = "tempo.proofs";

/// Wraps the LMDB environment and all database handles.
pub struct LmdbEnvironment {
    env: Arc<Env>,
    cursors_db: Database<Bytes, Bytes>,
    commitments_db: Database<Bytes, Bytes>,
    atoms_db: Database<Bytes, Bytes>,
    proofs_db: Database<Bytes, Bytes>,
}

impl LmdbEnvironment {
    /// Open or create an LMDB environment at the given path.
    pub fn open(path: &Path, max_dbs: u32, map_size: usize) -> Result<Self, LmdbError> {
        std::fs::create_dir_all(path)?;
        // SAFETY: the environment is opened once per path by this process and
        // the memory map is not modified outside of heed.
        let env = unsafe {
            EnvOpenOptions::new()
                .map_size(map_size)
                .max_dbs(max_dbs)
                .open(path)?
        };

        let mut wtxn = env.write_txn()?;
        let cursors_db = env.create_database::<Bytes, Bytes>(&mut wtxn, Some(CURSORS_DB))?;
        let commitments_db =
            env.create_database::<Bytes, Bytes>(&mut wtxn, Some(COMMITMENTS_DB))?;
        let atoms_db = env.create_database::<Bytes, Bytes>(&mut wtxn, Some(ATOMS_DB))?;
        let proofs_db = env.create_database::<Bytes, Bytes>(&mut wtxn, Some(PROOFS_DB))?;
        wtxn.commit()?;

        tracing::debug!(path = %path.display(), map_size, "opened LMDB environment");

        Ok(Self {
            env: Arc::new(env),
            cursors_db,
            commitments_db,
            atoms_db,
            proofs_db,
        })
    }

    pub fn cursor_store(&self) -> LmdbCursorStore {
        LmdbCursorStore::new(Arc::clone(&self.env), self.cursors_db)
    }

    pub fn commitment_store(&self) -> LmdbCommitmentStore {
        LmdbCommitmentStore::new(Arc::clone(&self.env), self.commitments_db)
    }

    pub fn atom_store(&self) -> LmdbAtomStore {
        LmdbAtomStore::new(Arc::clone(&self.env), self.atoms_db, self.proofs_db)
    }

    /// Flush the memory map to disk.
    pub fn sync(&self) -> Result<(), LmdbError> {
        self.env.force_sync()?;
        Ok(())
    }
}
