use tempo_messages::Peer;
use tempo_types::AtomId;

/// Receives the atom ids learned from a peer, once per response.
pub trait AtomDiscoveryListener: Send + Sync {
    fn on_atoms_discovered(&self, aids: &[AtomId], peer: &Peer);
}

impl<F> AtomDiscoveryListener for F
where
    F: Fn(&[AtomId], &Peer) + Send + Sync,
{
    fn on_atoms_discovered(&self, aids: &[AtomId], peer: &Peer) {
        self(aids, peer)
    }
}

/// Registration handle for [`IterativeDiscoverer::remove_listener`](super::IterativeDiscoverer::remove_listener).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(pub(crate) u64);
