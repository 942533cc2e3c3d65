//! Per-peer discovery bookkeeping.

use std::collections::{BTreeSet, HashMap};
use std::sync::{Mutex, PoisonError};

use tempo_types::NodeId;

#[derive(Debug)]
struct PeerDiscoveryState {
    /// Incremented each time the peer starts being tracked; timers armed in
    /// an earlier epoch are stale.
    epoch: u64,
    pending: BTreeSet<u64>,
    backoff: u32,
}

/// Discovery state of every tracked peer.
///
/// All reads and writes for a peer go through one map lock, so timer
/// callbacks and response handlers observe a consistent view.
#[derive(Debug, Default)]
pub struct IterativeDiscoveryState {
    peers: Mutex<HashMap<NodeId, PeerDiscoveryState>>,
    epochs: Mutex<u64>,
}

impl IterativeDiscoveryState {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, HashMap<NodeId, PeerDiscoveryState>> {
        self.peers.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Start tracking `nid`. Returns the new epoch, or `None` if it is
    /// already tracked.
    pub fn add(&self, nid: NodeId) -> Option<u64> {
        let mut peers = self.lock();
        if peers.contains_key(&nid) {
            return None;
        }
        let epoch = {
            let mut epochs = self.epochs.lock().unwrap_or_else(PoisonError::into_inner);
            *epochs += 1;
            *epochs
        };
        peers.insert(
            nid,
            PeerDiscoveryState {
                epoch,
                pending: BTreeSet::new(),
                backoff: 0,
            },
        );
        Some(epoch)
    }

    pub fn remove(&self, nid: &NodeId) -> bool {
        self.lock().remove(nid).is_some()
    }

    pub fn contains(&self, nid: &NodeId) -> bool {
        self.lock().contains_key(nid)
    }

    pub fn epoch(&self, nid: &NodeId) -> Option<u64> {
        self.lock().get(nid).map(|s| s.epoch)
    }

    /// Whether `nid` is still tracked in `epoch`.
    pub fn is_current(&self, nid: &NodeId, epoch: u64) -> bool {
        self.lock().get(nid).is_some_and(|s| s.epoch == epoch)
    }

    /// Mark a request at `position` outstanding. Fails if the peer is not
    /// tracked in `epoch`.
    pub fn add_request(&self, nid: &NodeId, position: u64, epoch: u64) -> bool {
        match self.lock().get_mut(nid) {
            Some(state) if state.epoch == epoch => {
                state.pending.insert(position);
                true
            }
            _ => false,
        }
    }

    pub fn remove_request(&self, nid: &NodeId, position: u64) -> bool {
        self.lock()
            .get_mut(nid)
            .is_some_and(|s| s.pending.remove(&position))
    }

    pub fn is_pending(&self, nid: &NodeId, position: u64, epoch: u64) -> bool {
        self.lock()
            .get(nid)
            .is_some_and(|s| s.epoch == epoch && s.pending.contains(&position))
    }

    /// The peer returned new data: reset its backoff.
    pub fn on_discovering(&self, nid: &NodeId) {
        if let Some(state) = self.lock().get_mut(nid) {
            state.backoff = 0;
        }
    }

    /// The peer is drained: increase and return its backoff.
    pub fn on_discovered(&self, nid: &NodeId) -> Option<u32> {
        self.lock().get_mut(nid).map(|state| {
            state.backoff = state.backoff.saturating_add(1);
            state.backoff
        })
    }

    pub fn backoff(&self, nid: &NodeId) -> Option<u32> {
        self.lock().get(nid).map(|s| s.backoff)
    }

    pub fn pending(&self, nid: &NodeId) -> Vec<u64> {
        self.lock()
            .get(nid)
            .map(|s| s.pending.iter().copied().collect())
            .unwrap_or_default()
    }

    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn nid(n: u8) -> NodeId {
        NodeId::new([n; 16])
    }

    #[test]
    fn add_is_exclusive() {
        let state = IterativeDiscoveryState::new();
        assert!(state.add(nid(1)).is_some());
        assert!(state.add(nid(1)).is_none());
        assert!(state.contains(&nid(1)));
    }

    #[test]
    fn readding_starts_new_epoch() {
        let state = IterativeDiscoveryState::new();
        let first = state.add(nid(1)).unwrap();
        assert!(state.add_request(&nid(1), 0, first));
        assert!(state.remove(&nid(1)));
        let second = state.add(nid(1)).unwrap();
        assert_ne!(first, second);
        assert!(!state.is_current(&nid(1), first));
        assert!(!state.add_request(&nid(1), 0, first));
        assert!(state.pending(&nid(1)).is_empty());
    }

    #[test]
    fn pending_requests_tracked_per_position() {
        let state = IterativeDiscoveryState::new();
        let epoch = state.add(nid(1)).unwrap();
        state.add_request(&nid(1), 0, epoch);
        state.add_request(&nid(1), 10, epoch);
        assert!(state.is_pending(&nid(1), 10, epoch));
        assert!(state.remove_request(&nid(1), 10));
        assert!(!state.is_pending(&nid(1), 10, epoch));
        assert_eq!(state.pending(&nid(1)), vec![0]);
    }

    #[test]
    fn backoff_grows_and_resets() {
        let state = IterativeDiscoveryState::new();
        state.add(nid(1));
        assert_eq!(state.on_discovered(&nid(1)), Some(1));
        assert_eq!(state.on_discovered(&nid(1)), Some(2));
        state.on_discovering(&nid(1));
        assert_eq!(state.backoff(&nid(1)), Some(0));
        assert_eq!(state.on_discovered(&nid(2)), None);
    }
}
