//! Vertex attestation and verification.

use crate::error::CryptoError;
use crate::hash::next_commitment;
use crate::sign::{sign_message, verify_signature};
use tempo_types::{AtomId, Hash, KeyPair, NodeId, PrivateKey, TemporalVertex};

/// Sign `vertex` in place with `private_key`.
pub fn sign_vertex(vertex: &mut TemporalVertex, private_key: &PrivateKey) {
    let signature = sign_message(&vertex.signing_bytes(), private_key);
    vertex.signature = Some(signature);
}

/// Verify a vertex's signature against its owner key.
pub fn verify_vertex(vertex: &TemporalVertex) -> Result<(), CryptoError> {
    let signature = vertex.signature.as_ref().ok_or(CryptoError::Unsigned)?;
    if verify_signature(&vertex.signing_bytes(), signature, &vertex.owner) {
        Ok(())
    } else {
        Err(CryptoError::InvalidSignature(vertex.owner_nid().to_string()))
    }
}

/// Create a signed vertex attesting to `aid`, chained from `previous`
/// (the owner's last vertex, `None` at the root of its chain).
pub fn attest(
    keypair: &KeyPair,
    aid: &AtomId,
    clock: u64,
    rclock: u64,
    previous: Option<&TemporalVertex>,
    nids: impl IntoIterator<Item = NodeId>,
) -> TemporalVertex {
    let previous_commitment = previous.map_or(Hash::ZERO, |v| v.commitment);
    let previous_id = previous.map_or(Hash::ZERO, TemporalVertex::id);
    let mut vertex = TemporalVertex::new(
        keypair.public.clone(),
        clock,
        rclock,
        next_commitment(&previous_commitment, aid),
        previous_id,
        nids,
    );
    sign_vertex(&mut vertex, &keypair.private);
    vertex
}

/// Verify one owner's vertex chain, oldest first: a single owner, valid
/// signatures, strictly increasing clocks, and back-references to the
/// preceding vertex.
pub fn verify_owner_chain(chain: &[TemporalVertex]) -> Result<(), CryptoError> {
    let Some(first) = chain.first() else {
        return Ok(());
    };
    for (i, vertex) in chain.iter().enumerate() {
        if vertex.owner != first.owner {
            return Err(CryptoError::MixedOwners);
        }
        verify_vertex(vertex)?;
        if i == 0 {
            continue;
        }
        let previous = &chain[i - 1];
        if vertex.clock <= previous.clock {
            return Err(CryptoError::ClockNotIncreasing {
                owner: vertex.owner_nid().to_string(),
                previous: previous.clock,
                clock: vertex.clock,
            });
        }
        if vertex.previous != previous.id() {
            return Err(CryptoError::BrokenChain {
                clock: vertex.clock,
            });
        }
    }
    Ok(())
}

/// Check that `commitments` follow from `root` by appending `aids` in order.
pub fn verify_commitment_chain(root: &Hash, aids: &[AtomId], commitments: &[Hash]) -> bool {
    if aids.len() != commitments.len() {
        return false;
    }
    let mut current = *root;
    for (aid, commitment) in aids.iter().zip(commitments) {
        current = next_commitment(&current, aid);
        if current != *commitment {
            return false;
        }
    }
    true
}
