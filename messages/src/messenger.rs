use crate::{MessageError, Peer, TempoMessage};

/// Outbound delivery of messages to peers.
///
/// Implementations wrap the real transport; `send` must not block on the
/// remote side processing the message.
pub trait PeerMessenger: Send + Sync {
    fn send(&self, peer: &Peer, message: TempoMessage) -> Result<(), MessageError>;
}
