//! LMDB storage backend for Tempo.
//!
//! Implements the storage traits from `tempo-store` using the `heed` LMDB
//! bindings. Each logical store maps to one or more named databases within a
//! single environment.

pub mod atom;
pub mod commitment;
pub mod cursor;
pub mod environment;
pub mod error;

pub use atom::LmdbAtomStore;
pub use commitment::LmdbCommitmentStore;
pub use cursor::LmdbCursorStore;
pub use environment::LmdbEnvironment;
pub use error::LmdbError;

/// Big-endian so that LMDB's byte ordering matches numeric ordering.
pub(crate) fn position_key(position: u64) -> [u8; 8] {
    position.to_be_bytes()
}
