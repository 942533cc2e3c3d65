//! Persisted logical clock positions per remote node.

use serde::{Deserialize, Serialize};
use tempo_types::NodeId;

use crate::StoreError;

/// Which cursor of a node is being tracked.
///
/// The discriminant doubles as the key prefix byte in persistent backends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[repr(u8)]
pub enum CursorKind {
    /// Position up to which a peer's atoms have been discovered.
    Discovery = 0,
    /// Position a peer is known to lag behind.
    Lag = 1,
}

impl CursorKind {
    pub fn prefix(self) -> u8 {
        self as u8
    }
}

/// Trait for persisting `(node id, cursor kind) -> position`.
///
/// Implementations must be safe for concurrent use; the discovery engine
/// serializes its own read-compare-write sequences.
pub trait CursorStore: Send + Sync {
    fn put_cursor(&self, nid: &NodeId, kind: CursorKind, position: u64) -> Result<(), StoreError>;

    fn get_cursor(&self, nid: &NodeId, kind: CursorKind) -> Result<Option<u64>, StoreError>;

    /// Remove every stored cursor. Calling it on an empty store is a no-op.
    fn reset_cursors(&self) -> Result<(), StoreError>;

    /// Release the store. Further calls may fail with `StoreError::Closed`.
    fn close(&self) {}
}
