//! Cryptographic primitives for Tempo.
//!
//! - **Ed25519** for node keys and vertex signatures
//! - **Blake2b** for atom ids and chained vertex commitments
//! - Vertex attestation and verification helpers

pub mod error;
pub mod hash;
pub mod keys;
pub mod sign;
pub mod vertex;

pub use error::CryptoError;
pub use hash::{blake2b_256, blake2b_256_multi, hash_atom, next_commitment};
pub use keys::{generate_keypair, keypair_from_private, keypair_from_seed, public_from_private};
pub use sign::{sign_message, verify_signature};
pub use vertex::{attest, sign_vertex, verify_commitment_chain, verify_owner_chain, verify_vertex};
