//! Commitment chains learned from (or produced for) each node.

use tempo_types::{Hash, NodeId};

use crate::StoreError;

/// Position of the last of `count` entries written from `start`, or `None`
/// when `count` is zero.
pub fn last_position(start: u64, count: usize) -> Result<Option<u64>, StoreError> {
    let Some(span) = (count as u64).checked_sub(1) else {
        return Ok(None);
    };
    start
        .checked_add(span)
        .map(Some)
        .ok_or(StoreError::PositionOverflow { start, count })
}

pub trait CommitmentStore: Send + Sync {
    /// Store `commitments` for `nid` at consecutive positions from `start`.
    /// Existing entries at those positions are overwritten. Nothing is written
    /// when the last position would exceed `u64::MAX`.
    fn put_commitments(
        &self,
        nid: &NodeId,
        commitments: &[Hash],
        start: u64,
    ) -> Result<(), StoreError>;

    /// Up to `limit` commitments of `nid` at contiguous positions starting at
    /// `from`. Stops at the first missing position.
    fn get_next_commitments(
        &self,
        nid: &NodeId,
        from: u64,
        limit: usize,
    ) -> Result<Vec<Hash>, StoreError>;

    /// Remove every stored commitment. Idempotent.
    fn reset_commitments(&self) -> Result<(), StoreError>;

    fn close(&self) {}
}
