//! Abstract storage traits for Tempo.
//!
//! Every storage backend (LMDB, in-memory for testing) implements these
//! traits. The discovery engine and sampling service depend only on the
//! traits.

pub mod atom;
pub mod commitment;
pub mod cursor;
pub mod error;

pub use atom::{AtomStore, AtomStoreView};
pub use commitment::{last_position, CommitmentStore};
pub use cursor::{CursorKind, CursorStore};
pub use error::StoreError;
