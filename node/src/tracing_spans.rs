//! Span constructors for common Tempo node operations.
//!
//! Consistent span names and fields make it easy to filter and correlate
//! traces across discovery, sampling and conflict resolution.

use tempo_messages::{MessageKind, Peer};
use tempo_types::ConflictTag;
use tracing::{info_span, Span};

/// Span covering the handling of a single inbound message.
pub fn message_span(peer: &Peer, kind: MessageKind) -> Span {
    info_span!("message", peer = %peer, kind = ?kind)
}

/// Span covering one conflict from raise to the end of its dispatch cascade.
pub fn conflict_span(tag: &ConflictTag) -> Span {
    info_span!("conflict", tag = %tag)
}

/// Span covering the local attestation of an atom.
pub fn witness_span(clock: u64) -> Span {
    info_span!("witness", clock)
}
