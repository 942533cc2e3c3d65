//! Temporal proof sampling for momentum conflict resolution.
//!
//! The coordinator turns a `RequestSampling` action into sample requests,
//! gathers the answers, and feeds a single `SamplingComplete` back into the
//! engine once every peer answered or the timeout elapsed.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, Weak};
use std::time::Duration;

use tempo_engine::{
    ActionListener, RequestSamplingAction, SamplingCompleteAction, Tempo, TempoAction,
};
use tempo_messages::{
    MessageKind, Peer, PeerMessenger, SampleRequestMessage, SampleResponseMessage, TempoMessage,
};
use tempo_store::AtomStoreView;
use tempo_types::{ConflictTag, NodeId, TemporalProof};
use tempo_utils::Scheduler;

use crate::router::{HandlerId, MessageRouter};

#[derive(Debug)]
struct SamplingRound {
    id: u64,
    awaiting: BTreeSet<NodeId>,
    samples: Vec<TemporalProof>,
}

pub struct SamplingCoordinator {
    this: Weak<SamplingCoordinator>,
    tempo: Weak<Tempo>,
    atom_store: Arc<dyn AtomStoreView>,
    messenger: Arc<dyn PeerMessenger>,
    scheduler: Arc<dyn Scheduler>,
    timeout: Duration,
    rounds: Mutex<HashMap<ConflictTag, SamplingRound>>,
    next_round: AtomicU64,
    routes: Mutex<Vec<HandlerId>>,
}

impl SamplingCoordinator {
    pub fn new(
        tempo: &Arc<Tempo>,
        atom_store: Arc<dyn AtomStoreView>,
        messenger: Arc<dyn PeerMessenger>,
        scheduler: Arc<dyn Scheduler>,
        timeout: Duration,
    ) -> Arc<Self> {
        Arc::new_cyclic(|this| Self {
            this: this.clone(),
            tempo: Arc::downgrade(tempo),
            atom_store,
            messenger,
            scheduler,
            timeout,
            rounds: Mutex::new(HashMap::new()),
            next_round: AtomicU64::new(0),
            routes: Mutex::new(Vec::new()),
        })
    }

    /// Receive sample traffic from `router`.
    pub fn register(&self, router: &MessageRouter) {
        let mut routes = self.routes.lock().unwrap_or_else(PoisonError::into_inner);
        for kind in [MessageKind::SampleRequest, MessageKind::SampleResponse] {
            let this = self.this.clone();
            routes.push(router.register(kind, move |peer, message| {
                if let Some(coordinator) = this.upgrade() {
                    coordinator.on_message(peer, message);
                }
            }));
        }
    }

    pub fn deregister(&self, router: &MessageRouter) {
        for id in self
            .routes
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            router.deregister(id);
        }
    }

    pub fn on_message(&self, peer: &Peer, message: TempoMessage) {
        match message {
            TempoMessage::SampleRequest(request) => self.on_sample_request(peer, request),
            TempoMessage::SampleResponse(response) => self.on_sample_response(peer, response),
            other => {
                tracing::debug!(peer = %peer, kind = ?other.kind(), "ignoring non-sample message");
            }
        }
    }

    /// Answer with the proofs we hold for the requested atoms.
    pub fn on_sample_request(&self, peer: &Peer, request: SampleRequestMessage) {
        let mut proofs = Vec::with_capacity(request.aids.len());
        for aid in &request.aids {
            match self.atom_store.get_temporal_proof(aid) {
                Ok(Some(proof)) => proofs.push(proof),
                Ok(None) => {}
                Err(error) => {
                    tracing::warn!(peer = %peer, aid = %aid, %error, "failed to load temporal proof");
                }
            }
        }
        tracing::debug!(peer = %peer, tag = %request.tag, proofs = proofs.len(), "serving samples");
        let response = SampleResponseMessage {
            tag: request.tag,
            proofs,
        };
        if let Err(error) = self.messenger.send(peer, response.into()) {
            tracing::warn!(peer = %peer, %error, "failed to send sample response");
        }
    }

    pub fn on_sample_response(&self, peer: &Peer, response: SampleResponseMessage) {
        let tag = response.tag;
        let finished = {
            let mut rounds = self.rounds.lock().unwrap_or_else(PoisonError::into_inner);
            let Some(round) = rounds.get_mut(&tag) else {
                tracing::debug!(peer = %peer, tag = %tag, "sample response for no open round");
                return;
            };
            if !round.awaiting.remove(&peer.nid) {
                tracing::debug!(peer = %peer, tag = %tag, "unsolicited sample response");
                return;
            }
            round.samples.extend(response.proofs);
            if round.awaiting.is_empty() {
                rounds.remove(&tag)
            } else {
                None
            }
        };
        if let Some(round) = finished {
            self.complete(tag, round.samples);
        }
    }

    fn request_sampling(&self, request: &RequestSamplingAction) {
        let tag = request.tag;
        if request.peers.is_empty() {
            tracing::debug!(tag = %tag, "no peers to sample");
            self.complete(tag, Vec::new());
            return;
        }

        let id = self.next_round.fetch_add(1, Ordering::Relaxed);
        let awaiting: BTreeSet<NodeId> = request.peers.iter().map(|peer| peer.nid).collect();
        {
            let mut rounds = self.rounds.lock().unwrap_or_else(PoisonError::into_inner);
            if rounds.contains_key(&tag) {
                tracing::warn!(tag = %tag, "sampling already in progress");
                return;
            }
            rounds.insert(
                tag,
                SamplingRound {
                    id,
                    awaiting,
                    samples: Vec::new(),
                },
            );
        }

        let aids: Vec<_> = request.aids.iter().copied().collect();
        for peer in &request.peers {
            let message = SampleRequestMessage {
                tag,
                aids: aids.clone(),
            };
            if let Err(error) = self.messenger.send(peer, message.into()) {
                tracing::warn!(peer = %peer, tag = %tag, %error, "failed to request samples");
                self.abandon_peer(tag, id, &peer.nid);
            }
        }
        tracing::debug!(tag = %tag, peers = request.peers.len(), "sampling requested");

        let this = self.this.clone();
        self.scheduler.schedule(
            self.timeout,
            Box::new(move || {
                if let Some(coordinator) = this.upgrade() {
                    coordinator.on_timeout(tag, id);
                }
            }),
        );
    }

    /// Stop waiting for a peer we could not reach.
    fn abandon_peer(&self, tag: ConflictTag, id: u64, nid: &NodeId) {
        let finished = {
            let mut rounds = self.rounds.lock().unwrap_or_else(PoisonError::into_inner);
            match rounds.get_mut(&tag) {
                Some(round) if round.id == id => {
                    round.awaiting.remove(nid);
                    if round.awaiting.is_empty() {
                        rounds.remove(&tag)
                    } else {
                        None
                    }
                }
                _ => None,
            }
        };
        if let Some(round) = finished {
            self.complete(tag, round.samples);
        }
    }

    fn on_timeout(&self, tag: ConflictTag, id: u64) {
        let expired = {
            let mut rounds = self.rounds.lock().unwrap_or_else(PoisonError::into_inner);
            match rounds.get(&tag) {
                Some(round) if round.id == id => rounds.remove(&tag),
                _ => None,
            }
        };
        if let Some(round) = expired {
            tracing::debug!(
                tag = %tag,
                missing = round.awaiting.len(),
                samples = round.samples.len(),
                "sampling timed out"
            );
            self.complete(tag, round.samples);
        }
    }

    fn complete(&self, tag: ConflictTag, samples: Vec<TemporalProof>) {
        let Some(tempo) = self.tempo.upgrade() else {
            return;
        };
        let report = tempo.dispatch(SamplingCompleteAction { samples, tag }.into());
        for failure in &report.failures {
            tracing::error!(tag = %tag, epic = failure.epic, error = %failure.error, "sampling outcome rejected");
        }
    }

    /// Forget the round of an aborted conflict; its timer becomes a no-op.
    fn close_round(&self, tag: ConflictTag) {
        let closed = self
            .rounds
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&tag);
        if let Some(round) = closed {
            tracing::debug!(tag = %tag, missing = round.awaiting.len(), "sampling round closed by abort");
        }
    }

    pub fn open_rounds(&self) -> usize {
        self.rounds.lock().unwrap_or_else(PoisonError::into_inner).len()
    }
}

impl ActionListener for SamplingCoordinator {
    fn on_action(&self, action: &TempoAction) {
        match action {
            TempoAction::RequestSampling(request) => self.request_sampling(request),
            TempoAction::ConflictAborted(aborted) => self.close_round(aborted.tag),
            _ => {}
        }
    }
}
