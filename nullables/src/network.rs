//! Nullable messenger: record messages instead of sending them.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Mutex;

use tempo_messages::{MessageError, Peer, PeerMessenger, TempoMessage};
use tempo_types::NodeId;

/// A messenger that records every message "sent".
///
/// Tests deliver the recorded messages to the intended node themselves,
/// which keeps multi-node scenarios single-threaded and reproducible.
pub struct NullMessenger {
    sent: Mutex<Vec<(Peer, TempoMessage)>>,
    fail_sends: AtomicBool,
}

impl NullMessenger {
    pub fn new() -> Self {
        Self {
            sent: Mutex::new(Vec::new()),
            fail_sends: AtomicBool::new(false),
        }
    }

    /// Make subsequent sends fail with `MessageError::Unreachable`.
    pub fn fail_sends(&self, fail: bool) {
        self.fail_sends.store(fail, Ordering::SeqCst);
    }

    /// All messages sent so far (for assertions).
    pub fn sent(&self) -> Vec<(Peer, TempoMessage)> {
        self.sent.lock().unwrap().clone()
    }

    /// Messages addressed to `nid`.
    pub fn sent_to(&self, nid: &NodeId) -> Vec<TempoMessage> {
        self.sent
            .lock()
            .unwrap()
            .iter()
            .filter(|(peer, _)| peer.nid == *nid)
            .map(|(_, msg)| msg.clone())
            .collect()
    }

    /// Drain the recorded messages.
    pub fn take_sent(&self) -> Vec<(Peer, TempoMessage)> {
        std::mem::take(&mut *self.sent.lock().unwrap())
    }

    pub fn reset(&self) {
        self.sent.lock().unwrap().clear();
        self.fail_sends.store(false, Ordering::SeqCst);
    }
}

impl Default for NullMessenger {
    fn default() -> Self {
        Self::new()
    }
}

impl PeerMessenger for NullMessenger {
    fn send(&self, peer: &Peer, message: TempoMessage) -> Result<(), MessageError> {
        if self.fail_sends.load(Ordering::SeqCst) {
            return Err(MessageError::Unreachable(peer.to_string()));
        }
        self.sent.lock().unwrap().push((peer.clone(), message));
        Ok(())
    }
}
