//! Fundamental types for Tempo.
//!
//! This crate defines the core types shared across every other crate in the
//! workspace: node and atom identifiers, commitment hashes, keys, the logical
//! clock cursor, and the temporal proof DAG attached to every atom.

pub mod atom;
pub mod cursor;
pub mod error;
pub mod hash;
pub mod ids;
pub mod keys;
pub mod proof;
pub mod vertex;

pub use atom::TempoAtom;
pub use cursor::LogicalClockCursor;
pub use error::TypesError;
pub use hash::Hash;
pub use ids::{AtomId, ConflictTag, NodeId};
pub use keys::{KeyPair, PrivateKey, PublicKey, Signature};
pub use proof::TemporalProof;
pub use vertex::TemporalVertex;
