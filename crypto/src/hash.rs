//! Blake2b hashing for atoms and commitments.

use blake2::digest::consts::U32;
use blake2::{Blake2b, Digest};
use tempo_types::{AtomId, Hash};

type Blake2b256 = Blake2b<U32>;

/// 256-bit Blake2b digest of `data`.
pub fn blake2b_256(data: &[u8]) -> [u8; 32] {
    blake2b_256_multi(&[data])
}

/// Digest of the concatenation of `parts`, without building it.
pub fn blake2b_256_multi(parts: &[&[u8]]) -> [u8; 32] {
    let digest = parts
        .iter()
        .fold(Blake2b256::new(), |hasher, part| hasher.chain_update(part))
        .finalize();
    let mut output = [0u8; 32];
    output.copy_from_slice(&digest);
    output
}

/// Content id of an encoded atom.
pub fn hash_atom(atom_bytes: &[u8]) -> AtomId {
    AtomId::new(blake2b_256(atom_bytes))
}

/// The commitment following `previous` once `aid` is appended to a node's chain.
pub fn next_commitment(previous: &Hash, aid: &AtomId) -> Hash {
    Hash::new(blake2b_256_multi(&[previous.as_bytes(), aid.as_bytes()]))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn blake2b_deterministic() {
        assert_eq!(blake2b_256(b"hello tempo"), blake2b_256(b"hello tempo"));
    }

    #[test]
    fn split_input_hashes_like_joined_input() {
        let single = blake2b_256(b"helloworld");
        let multi = blake2b_256_multi(&[b"hello", b"world"]);
        assert_eq!(single, multi);
    }

    #[test]
    fn hash_atom_matches_content_id() {
        assert_eq!(hash_atom(b"atom"), AtomId::from_content(b"atom"));
    }

    #[test]
    fn commitments_chain() {
        let a = AtomId::new([1u8; 32]);
        let b = AtomId::new([2u8; 32]);
        let c1 = next_commitment(&Hash::ZERO, &a);
        let c2 = next_commitment(&c1, &b);
        assert_ne!(c1, c2);
        assert_ne!(c2, next_commitment(&Hash::ZERO, &b));
    }
}
