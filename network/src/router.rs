//! Inbound message dispatch by message kind.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, PoisonError, RwLock};

use tempo_messages::{MessageKind, Peer, TempoMessage};

/// Registration handle returned by [`MessageRouter::register`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct HandlerId(u64);

type MessageHandler = Arc<dyn Fn(&Peer, TempoMessage) + Send + Sync>;

/// Delivers messages from the transport to the components that handle them.
#[derive(Default)]
pub struct MessageRouter {
    handlers: RwLock<HashMap<MessageKind, Vec<(HandlerId, MessageHandler)>>>,
    next_id: AtomicU64,
}

impl MessageRouter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(
        &self,
        kind: MessageKind,
        handler: impl Fn(&Peer, TempoMessage) + Send + Sync + 'static,
    ) -> HandlerId {
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .entry(kind)
            .or_default()
            .push((id, Arc::new(handler)));
        id
    }

    pub fn deregister(&self, id: HandlerId) {
        let mut handlers = self
            .handlers
            .write()
            .unwrap_or_else(PoisonError::into_inner);
        for registered in handlers.values_mut() {
            registered.retain(|(handler_id, _)| *handler_id != id);
        }
    }

    /// Hand `message` to every handler of its kind. Returns `false` when no
    /// handler is registered.
    pub fn route(&self, peer: &Peer, message: TempoMessage) -> bool {
        let kind = message.kind();
        let handlers: Vec<MessageHandler> = self
            .handlers
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&kind)
            .map(|registered| registered.iter().map(|(_, h)| Arc::clone(h)).collect())
            .unwrap_or_default();
        if handlers.is_empty() {
            tracing::debug!(peer = %peer, ?kind, "no handler for message");
            return false;
        }
        for handler in handlers {
            handler(peer, message.clone());
        }
        true
    }
}
