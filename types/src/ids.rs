//! Identifiers for nodes, atoms, and conflict episodes.

use crate::hash::{write_hex, write_short};
use crate::keys::PublicKey;
use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use serde::{Deserialize, Serialize};
use std::fmt;

/// A 16-byte node identifier, derived from the node's public key.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct NodeId([u8; 16]);

impl NodeId {
    pub const ZERO: Self = Self([0u8; 16]);

    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Derive the node id owning `key`: the first 16 bytes of its Blake2b-256 digest.
    pub fn from_public_key(key: &PublicKey) -> Self {
        let digest = Blake2b::<U32>::digest(key.as_bytes());
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_short("NodeId", &self.0, f)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(&self.0, f)
    }
}

/// A 32-byte content-derived atom identifier.
///
/// Ordering is lexicographic over the raw bytes; conflict resolution relies on
/// it to break momentum ties deterministically.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct AtomId([u8; 32]);

impl AtomId {
    pub fn new(bytes: [u8; 32]) -> Self {
        Self(bytes)
    }

    /// Derive an atom id from the atom's serialized content.
    pub fn from_content(content: &[u8]) -> Self {
        let digest = Blake2b::<U32>::digest(content);
        let mut bytes = [0u8; 32];
        bytes.copy_from_slice(&digest);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 32] {
        &self.0
    }
}

impl fmt::Debug for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_short("AtomId", &self.0, f)
    }
}

impl fmt::Display for AtomId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(&self.0, f)
    }
}

/// Caller-chosen identifier grouping every action of one conflict episode.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default, Serialize, Deserialize)]
pub struct ConflictTag([u8; 16]);

impl ConflictTag {
    pub fn new(bytes: [u8; 16]) -> Self {
        Self(bytes)
    }

    /// Tag a dispute by the atom ids involved, independent of their order.
    pub fn from_aids<'a>(aids: impl IntoIterator<Item = &'a AtomId>) -> Self {
        let mut sorted: Vec<&AtomId> = aids.into_iter().collect();
        sorted.sort();
        sorted.dedup();
        let mut hasher = Blake2b::<U32>::new();
        for aid in sorted {
            hasher.update(aid.as_bytes());
        }
        let digest = hasher.finalize();
        let mut bytes = [0u8; 16];
        bytes.copy_from_slice(&digest[..16]);
        Self(bytes)
    }

    pub fn as_bytes(&self) -> &[u8; 16] {
        &self.0
    }
}

impl fmt::Debug for ConflictTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_short("ConflictTag", &self.0, f)
    }
}

impl fmt::Display for ConflictTag {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write_hex(&self.0, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn node_id_derivation_is_deterministic() {
        let key = PublicKey([7u8; 32]);
        assert_eq!(NodeId::from_public_key(&key), NodeId::from_public_key(&key));
        assert_ne!(
            NodeId::from_public_key(&key),
            NodeId::from_public_key(&PublicKey([8u8; 32]))
        );
    }

    #[test]
    fn atom_ids_order_lexicographically() {
        let mut low = [0u8; 32];
        low[0] = 1;
        let mut high = [0u8; 32];
        high[0] = 2;
        assert!(AtomId::new(low) < AtomId::new(high));
    }

    #[test]
    fn conflict_tag_ignores_aid_order() {
        let a = AtomId::new([1u8; 32]);
        let b = AtomId::new([2u8; 32]);
        assert_eq!(ConflictTag::from_aids([&a, &b]), ConflictTag::from_aids([&b, &a]));
        assert_ne!(ConflictTag::from_aids([&a]), ConflictTag::from_aids([&a, &b]));
    }

    #[test]
    fn display_is_full_hex() {
        let nid = NodeId::new([0xab; 16]);
        assert_eq!(nid.to_string(), "ab".repeat(16));
    }
}
