use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};

use tempo_engine::TempoError;
use tempo_messages::{
    DiscoveryRequestMessage, DiscoveryResponseMessage, MessageKind, Peer, PeerMessenger,
    TempoMessage,
};
use tempo_store::{last_position, AtomStoreView, CommitmentStore, CursorKind, CursorStore};
use tempo_types::{AtomId, LogicalClockCursor, NodeId};
use tempo_utils::{Scheduler, StatsCounter};
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use super::{
    stats, AtomDiscoveryListener, IterativeDiscovererConfig, IterativeDiscoveryState, ListenerId,
};
use crate::address_book::{AddressBook, PeerEvent};
use crate::router::{HandlerId, MessageRouter};

type InboundRequest = (Peer, DiscoveryRequestMessage);
type SharedReceiver = Arc<tokio::sync::Mutex<mpsc::Receiver<InboundRequest>>>;

/// Discovers atom ids of known peers by walking their logical clocks.
///
/// Inbound requests are served from a bounded queue by a fixed set of
/// workers; responses are handled inline on the caller's thread.
pub struct IterativeDiscoverer {
    this: Weak<IterativeDiscoverer>,
    local: NodeId,
    config: IterativeDiscovererConfig,
    state: IterativeDiscoveryState,

    cursor_store: Arc<dyn CursorStore>,
    commitment_store: Arc<dyn CommitmentStore>,
    atom_store: Arc<dyn AtomStoreView>,
    scheduler: Arc<dyn Scheduler>,
    messenger: Arc<dyn PeerMessenger>,

    listeners: Mutex<Vec<(ListenerId, Arc<dyn AtomDiscoveryListener>)>>,
    next_listener_id: AtomicU64,
    /// Serialises read-compare-write of the discovery cursors.
    cursor_lock: Mutex<()>,

    request_tx: Mutex<Option<mpsc::Sender<InboundRequest>>>,
    request_rx: Mutex<Option<mpsc::Receiver<InboundRequest>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
    stats: StatsCounter,

    routes: Mutex<Option<(Arc<MessageRouter>, Vec<HandlerId>)>>,
    subscription: Mutex<Option<(Arc<AddressBook>, u64)>>,
}

impl IterativeDiscoverer {
    pub fn new(
        local: NodeId,
        config: IterativeDiscovererConfig,
        cursor_store: Arc<dyn CursorStore>,
        commitment_store: Arc<dyn CommitmentStore>,
        atom_store: Arc<dyn AtomStoreView>,
        scheduler: Arc<dyn Scheduler>,
        messenger: Arc<dyn PeerMessenger>,
    ) -> Arc<Self> {
        let (request_tx, request_rx) = mpsc::channel(config.request_queue_capacity.max(1));
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            local,
            config,
            state: IterativeDiscoveryState::new(),
            cursor_store,
            commitment_store,
            atom_store,
            scheduler,
            messenger,
            listeners: Mutex::new(Vec::new()),
            next_listener_id: AtomicU64::new(0),
            cursor_lock: Mutex::new(()),
            request_tx: Mutex::new(Some(request_tx)),
            request_rx: Mutex::new(Some(request_rx)),
            workers: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
            stats: StatsCounter::new(stats::ALL),
            routes: Mutex::new(None),
            subscription: Mutex::new(None),
        })
    }

    /// Spawn the request processors on the current tokio runtime.
    pub fn start(&self) {
        let Some(receiver) = self
            .request_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            tracing::warn!("iterative discoverer already started");
            return;
        };
        let receiver: SharedReceiver = Arc::new(tokio::sync::Mutex::new(receiver));
        let mut workers = self.workers.lock().unwrap_or_else(PoisonError::into_inner);
        for worker in 0..self.config.request_processor_threads.max(1) {
            let receiver = Arc::clone(&receiver);
            let this = self.this.clone();
            workers.push(tokio::spawn(async move {
                loop {
                    let next = receiver.lock().await.recv().await;
                    let Some((peer, request)) = next else { break };
                    let Some(discoverer) = this.upgrade() else { break };
                    // failures are logged where they occur
                    let _ = discoverer.process_request(&peer, &request);
                }
                tracing::debug!(worker, "discovery request processor stopped");
            }));
        }
        tracing::info!(
            workers = workers.len(),
            capacity = self.config.request_queue_capacity,
            "iterative discoverer started"
        );
    }

    /// Feed address book events into discovery.
    pub fn attach(&self, book: &Arc<AddressBook>) {
        let this = self.this.clone();
        let id = book.subscribe(move |event| {
            let Some(discoverer) = this.upgrade() else { return };
            match event {
                PeerEvent::Added(peers) => discoverer.on_peers_added(peers),
                PeerEvent::Removed(peers) => discoverer.on_peers_removed(peers),
            }
        });
        let previous = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((Arc::clone(book), id));
        if let Some((book, id)) = previous {
            book.unsubscribe(id);
        }
    }

    /// Receive discovery traffic from `router`.
    pub fn register(&self, router: &Arc<MessageRouter>) {
        let ids: Vec<HandlerId> = [MessageKind::DiscoveryRequest, MessageKind::DiscoveryResponse]
            .into_iter()
            .map(|kind| {
                let this = self.this.clone();
                router.register(kind, move |peer, message| {
                    if let Some(discoverer) = this.upgrade() {
                        discoverer.on_message(peer, message);
                    }
                })
            })
            .collect();
        let previous = self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .replace((Arc::clone(router), ids));
        if let Some((router, ids)) = previous {
            ids.into_iter().for_each(|id| router.deregister(id));
        }
    }

    pub fn on_message(&self, peer: &Peer, message: TempoMessage) {
        let result = match message {
            TempoMessage::DiscoveryRequest(request) => self.try_enqueue(peer.clone(), request),
            TempoMessage::DiscoveryResponse(response) => self.on_response(peer, response),
            other => {
                tracing::debug!(peer = %peer, kind = ?other.kind(), "ignoring non-discovery message");
                Ok(())
            }
        };
        if let Err(error) = result {
            tracing::debug!(peer = %peer, %error, "discovery message not handled");
        }
    }

    /// Queue an inbound request for the processors. A full queue drops the
    /// request; the requester's timeout resends it.
    pub fn try_enqueue(&self, peer: Peer, request: DiscoveryRequestMessage) -> Result<(), TempoError> {
        if self.is_closed() {
            return Err(TempoError::ShutDown);
        }
        let sender = self
            .request_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
            .ok_or(TempoError::ShutDown)?;
        match sender.try_send((peer, request)) {
            Ok(()) => Ok(()),
            Err(mpsc::error::TrySendError::Full((peer, request))) => {
                self.stats.increment(stats::REQUESTS_DROPPED);
                tracing::warn!(
                    peer = %peer,
                    position = request.cursor.position(),
                    capacity = self.config.request_queue_capacity,
                    "discovery request queue full, dropping request"
                );
                Err(TempoError::RequestQueueFull {
                    capacity: self.config.request_queue_capacity,
                })
            }
            Err(mpsc::error::TrySendError::Closed(_)) => Err(TempoError::ShutDown),
        }
    }

    /// Serve one request: build the response page and send it back.
    pub fn process_request(
        &self,
        peer: &Peer,
        request: &DiscoveryRequestMessage,
    ) -> Result<(), TempoError> {
        let response = match self.fetch_response(peer, &request.cursor) {
            Ok(response) => response,
            Err(error @ TempoError::StoreCorruption { .. }) => {
                tracing::error!(peer = %peer, %error, "refusing to serve discovery request");
                return Err(error);
            }
            Err(error) => {
                tracing::warn!(peer = %peer, %error, "failed to serve discovery request");
                return Err(error);
            }
        };
        tracing::debug!(
            peer = %peer,
            position = response.cursor.position(),
            aids = response.aids.len(),
            "responding to discovery request"
        );
        self.stats.increment(stats::REQUESTS_SERVED);
        if let Err(error) = self.messenger.send(peer, response.into()) {
            self.stats.increment(stats::SEND_FAILURES);
            tracing::warn!(peer = %peer, %error, "failed to send discovery response");
            return Err(error.into());
        }
        Ok(())
    }

    /// Serve queued requests on the calling thread. Does nothing once the
    /// workers own the queue.
    pub fn process_queued(&self) -> usize {
        let queued: Vec<InboundRequest> = {
            let mut receiver = self.request_rx.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(receiver) = receiver.as_mut() else {
                return 0;
            };
            std::iter::from_fn(|| receiver.try_recv().ok()).collect()
        };
        let served = queued.len();
        for (peer, request) in queued {
            // failures are logged where they occur
            let _ = self.process_request(&peer, &request);
        }
        served
    }

    /// Build the page of local atoms starting at `cursor`.
    pub fn fetch_response(
        &self,
        peer: &Peer,
        cursor: &LogicalClockCursor,
    ) -> Result<DiscoveryResponseMessage, TempoError> {
        let position = cursor.position();
        let limit = self.config.response_limit;
        let commitments = self
            .commitment_store
            .get_next_commitments(&self.local, position, limit)?;
        let aids = self.atom_store.get_next_aids(position, limit)?;

        if commitments.len() < aids.len() {
            return Err(TempoError::StoreCorruption {
                peer: peer.nid,
                commitments: commitments.len(),
                aids: aids.len(),
            });
        }

        let next = position + commitments.len() as u64;
        let cursor = if next > position {
            LogicalClockCursor::with_next(position, LogicalClockCursor::new(next))
        } else {
            LogicalClockCursor::new(position)
        };
        Ok(DiscoveryResponseMessage {
            cursor,
            commitments,
            aids,
        })
    }

    pub fn on_response(&self, peer: &Peer, response: DiscoveryResponseMessage) -> Result<(), TempoError> {
        let nid = peer.nid;
        let position = response.cursor.position();
        if let Err(error) = Self::validate_response(&response, nid) {
            tracing::warn!(peer = %peer, position, %error, "dropping discovery response");
            self.stats.increment(stats::MALFORMED_RESPONSES);
            return Err(error);
        }
        self.stats.increment(stats::RESPONSES_RECEIVED);
        self.stats.add(stats::ATOMS_DISCOVERED, response.aids.len() as u64);
        tracing::debug!(peer = %peer, position, aids = response.aids.len(), "discovery response");

        self.notify_listeners(&response.aids, peer);
        self.commitment_store
            .put_commitments(&nid, &response.commitments, position)?;
        self.state.remove_request(&nid, position);

        let is_latest = self.update_cursor(&nid, &response.cursor)?;
        let Some(epoch) = self.state.epoch(&nid) else {
            return Ok(());
        };
        if !is_latest {
            return Ok(());
        }

        match response.cursor.next() {
            Some(next) => {
                self.state.on_discovering(&nid);
                self.request_discovery(peer, next.position(), epoch);
            }
            None => {
                let backoff = self.state.on_discovered(&nid).unwrap_or(0);
                let delay = self.config.backoff_delay(backoff);
                tracing::debug!(peer = %peer, backoff, ?delay, "peer drained, backing off");
                let this = self.this.clone();
                let peer = peer.clone();
                self.scheduler.schedule(
                    delay,
                    Box::new(move || {
                        if let Some(discoverer) = this.upgrade() {
                            discoverer.reinitiate(&peer, epoch);
                        }
                    }),
                );
            }
        }
        Ok(())
    }

    /// A response must carry a commitment per atom id, and its commitments
    /// must fit between its position and `u64::MAX`.
    fn validate_response(response: &DiscoveryResponseMessage, peer: NodeId) -> Result<(), TempoError> {
        if response.commitments.len() < response.aids.len() {
            return Err(TempoError::MalformedResponse {
                peer,
                reason: "fewer commitments than atom ids",
            });
        }
        if last_position(response.cursor.position(), response.commitments.len()).is_err() {
            return Err(TempoError::MalformedResponse {
                peer,
                reason: "commitments overflow the position space",
            });
        }
        Ok(())
    }

    /// Store the response's cursor if it advances; returns whether it is at
    /// least as far as the stored one.
    fn update_cursor(&self, nid: &NodeId, cursor: &LogicalClockCursor) -> Result<bool, TempoError> {
        let position = cursor.next().unwrap_or(cursor).position();
        let _guard = self.cursor_lock.lock().unwrap_or_else(PoisonError::into_inner);
        let latest = self
            .cursor_store
            .get_cursor(nid, CursorKind::Discovery)?
            .unwrap_or(0);
        if position > latest {
            self.cursor_store
                .put_cursor(nid, CursorKind::Discovery, position)?;
        }
        Ok(position >= latest)
    }

    fn latest_position(&self, nid: &NodeId) -> u64 {
        match self.cursor_store.get_cursor(nid, CursorKind::Discovery) {
            Ok(position) => position.unwrap_or(0),
            Err(error) => {
                tracing::warn!(peer = %nid, %error, "failed to read discovery cursor, starting over");
                0
            }
        }
    }

    fn initiate(&self, peer: &Peer) {
        let Some(epoch) = self.state.add(peer.nid) else {
            return;
        };
        tracing::info!(peer = %peer, "initiating iterative discovery");
        let position = self.latest_position(&peer.nid);
        self.request_discovery(peer, position, epoch);
    }

    fn reinitiate(&self, peer: &Peer, epoch: u64) {
        if self.is_closed() || !self.state.is_current(&peer.nid, epoch) {
            return;
        }
        let position = self.latest_position(&peer.nid);
        self.request_discovery(peer, position, epoch);
    }

    fn request_discovery(&self, peer: &Peer, position: u64, epoch: u64) {
        if self.is_closed() || !self.state.add_request(&peer.nid, position, epoch) {
            return;
        }
        let request = DiscoveryRequestMessage {
            cursor: LogicalClockCursor::new(position),
        };
        tracing::debug!(peer = %peer, position, "requesting iterative discovery");
        match self.messenger.send(peer, request.into()) {
            Ok(()) => self.stats.increment(stats::REQUESTS_SENT),
            Err(error) => {
                self.stats.increment(stats::SEND_FAILURES);
                tracing::warn!(peer = %peer, position, %error, "failed to send discovery request");
            }
        }

        let this = self.this.clone();
        let peer = peer.clone();
        self.scheduler.schedule(
            self.config.request_timeout,
            Box::new(move || {
                let Some(discoverer) = this.upgrade() else { return };
                if discoverer.state.is_pending(&peer.nid, position, epoch) {
                    discoverer.stats.increment(stats::TIMEOUTS);
                    tracing::debug!(peer = %peer, position, "discovery request timed out, resending");
                    discoverer.request_discovery(&peer, position, epoch);
                }
            }),
        );
    }

    pub fn on_peers_added(&self, peers: &[Peer]) {
        for peer in peers {
            self.initiate(peer);
        }
    }

    pub fn on_peers_removed(&self, peers: &[Peer]) {
        for peer in peers {
            if self.state.remove(&peer.nid) {
                tracing::info!(peer = %peer, "abandoning iterative discovery");
            }
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn AtomDiscoveryListener>) -> ListenerId {
        let id = ListenerId(self.next_listener_id.fetch_add(1, Ordering::Relaxed));
        self.listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push((id, listener));
        id
    }

    pub fn remove_listener(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.lock().unwrap_or_else(PoisonError::into_inner);
        let before = listeners.len();
        listeners.retain(|(listener_id, _)| *listener_id != id);
        listeners.len() != before
    }

    fn notify_listeners(&self, aids: &[AtomId], peer: &Peer) {
        let listeners: Vec<Arc<dyn AtomDiscoveryListener>> = self
            .listeners
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .map(|(_, listener)| Arc::clone(listener))
            .collect();
        for listener in listeners {
            listener.on_atoms_discovered(aids, peer);
        }
    }

    /// Forget all discovery progress.
    pub fn reset(&self) -> Result<(), TempoError> {
        self.cursor_store.reset_cursors()?;
        self.commitment_store.reset_commitments()?;
        tracing::info!("iterative discovery reset");
        Ok(())
    }

    /// Stop serving and discovering. Safe to call more than once.
    pub fn close(&self) {
        if self.closed.swap(true, Ordering::AcqRel) {
            return;
        }
        self.request_tx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        self.request_rx
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take();
        for worker in self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            worker.abort();
        }
        self.cursor_store.close();
        self.commitment_store.close();

        if let Some((router, ids)) = self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            ids.into_iter().for_each(|id| router.deregister(id));
        }
        if let Some((book, id)) = self
            .subscription
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        {
            book.unsubscribe(id);
        }
        tracing::info!("iterative discoverer closed");
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn state(&self) -> &IterativeDiscoveryState {
        &self.state
    }

    pub fn stats(&self) -> &StatsCounter {
        &self.stats
    }

    pub fn config(&self) -> &IterativeDiscovererConfig {
        &self.config
    }
}
