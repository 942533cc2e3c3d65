//! Registry of reachable peers with membership events.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tempo_engine::{LivePeersState, LivePeersView};
use tempo_messages::Peer;
use tempo_types::NodeId;

/// Membership change, carrying only the peers that actually changed.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum PeerEvent {
    Added(Vec<Peer>),
    Removed(Vec<Peer>),
}

type PeerEventListener = Arc<dyn Fn(&PeerEvent) + Send + Sync>;

/// Known live peers keyed by node id.
///
/// Listeners are invoked inline on the calling thread, after the book has
/// been updated and with no lock held.
#[derive(Default)]
pub struct AddressBook {
    peers: RwLock<BTreeMap<NodeId, Peer>>,
    listeners: RwLock<Vec<(u64, PeerEventListener)>>,
    next_listener: AtomicU64,
}

impl AddressBook {
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribe to membership events. Returns an id for `unsubscribe`.
    pub fn subscribe(&self, listener: impl Fn(&PeerEvent) + Send + Sync + 'static) -> u64 {
        let id = self.next_listener.fetch_add(1, Ordering::Relaxed);
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, Arc::new(listener)));
        id
    }

    pub fn unsubscribe(&self, id: u64) -> bool {
        let mut listeners = self
            .listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    /// Insert or update peers. Peers already present with the same address
    /// are not reported again.
    pub fn add_peers(&self, peers: impl IntoIterator<Item = Peer>) {
        let mut added = Vec::new();
        {
            let mut book = self.peers.write().unwrap_or_else(PoisonError::into_inner);
            for peer in peers {
                if book.get(&peer.nid) != Some(&peer) {
                    book.insert(peer.nid, peer.clone());
                    added.push(peer);
                }
            }
        }
        if !added.is_empty() {
            tracing::debug!(count = added.len(), "peers added");
            self.emit(&PeerEvent::Added(added));
        }
    }

    pub fn remove_peers<'a>(&self, nids: impl IntoIterator<Item = &'a NodeId>) {
        let removed: Vec<Peer> = {
            let mut book = self.peers.write().unwrap_or_else(PoisonError::into_inner);
            nids.into_iter().filter_map(|nid| book.remove(nid)).collect()
        };
        if !removed.is_empty() {
            tracing::debug!(count = removed.len(), "peers removed");
            self.emit(&PeerEvent::Removed(removed));
        }
    }

    pub fn peer(&self, nid: &NodeId) -> Option<Peer> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(nid)
            .cloned()
    }

    pub fn contains(&self, nid: &NodeId) -> bool {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .contains_key(nid)
    }

    pub fn peers(&self) -> Vec<Peer> {
        self.peers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }

    pub fn len(&self) -> usize {
        self.peers.read().unwrap_or_else(PoisonError::into_inner).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn emit(&self, event: &PeerEvent) {
        let listeners: Vec<PeerEventListener> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener(event);
        }
    }
}

impl LivePeersView for AddressBook {
    fn live_peers(&self) -> LivePeersState {
        LivePeersState::from_peers(self.peers())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;

    fn peer(n: u8) -> Peer {
        Peer::new(NodeId::new([n; 16]), format!("10.0.0.{n}:7000"))
    }

    fn recording(book: &AddressBook) -> Arc<Mutex<Vec<PeerEvent>>> {
        let events = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&events);
        book.subscribe(move |event| sink.lock().unwrap().push(event.clone()));
        events
    }

    #[test]
    fn add_reports_only_new_peers() {
        let book = AddressBook::new();
        let events = recording(&book);
        book.add_peers([peer(1), peer(2)]);
        book.add_peers([peer(2), peer(3)]);
        assert_eq!(
            *events.lock().unwrap(),
            vec![
                PeerEvent::Added(vec![peer(1), peer(2)]),
                PeerEvent::Added(vec![peer(3)]),
            ]
        );
        assert_eq!(book.len(), 3);
    }

    #[test]
    fn remove_reports_removed_peers() {
        let book = AddressBook::new();
        book.add_peers([peer(1)]);
        let events = recording(&book);
        book.remove_peers(&[NodeId::new([1u8; 16]), NodeId::new([9u8; 16])]);
        assert_eq!(*events.lock().unwrap(), vec![PeerEvent::Removed(vec![peer(1)])]);
        assert!(book.is_empty());
    }

    #[test]
    fn unsubscribed_listener_is_silent() {
        let book = AddressBook::new();
        let events = Arc::new(Mutex::new(0usize));
        let sink = Arc::clone(&events);
        let id = book.subscribe(move |_| *sink.lock().unwrap() += 1);
        assert!(book.unsubscribe(id));
        book.add_peers([peer(1)]);
        assert_eq!(*events.lock().unwrap(), 0);
    }

    #[test]
    fn live_peers_snapshot() {
        let book = AddressBook::new();
        book.add_peers([peer(1), peer(2)]);
        let live = book.live_peers();
        assert_eq!(live.len(), 2);
        assert!(live.peer(&NodeId::new([2u8; 16])).is_some());
    }
}
