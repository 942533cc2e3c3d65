//! The Tempo node: wires storage, discovery, sampling and the dispatch
//! engine together behind one handle.

use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use tokio::runtime::Handle;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use tempo_conflicts::build_resolver;
use tempo_crypto::{attest, generate_keypair, keypair_from_seed};
use tempo_engine::{
    ActionListener, DispatchReport, LivePeersView, RaiseConflictAction, Tempo, TempoAction,
    TempoHandle,
};
use tempo_messages::{Peer, PeerMessenger, TempoMessage};
use tempo_network::discovery::ListenerId;
use tempo_network::{
    AddressBook, AtomDiscoveryListener, IterativeDiscoverer, MessageRouter, SamplingCoordinator,
};
use tempo_store::{AtomStore, AtomStoreView, CommitmentStore, CursorStore};
use tempo_store_lmdb::LmdbEnvironment;
use tempo_types::{KeyPair, NodeId, TempoAtom, TemporalVertex};
use tempo_utils::{Scheduler, TokioScheduler};

use crate::config::NodeConfig;
use crate::error::NodeError;
use crate::metrics::TempoMetrics;
use crate::shutdown::ShutdownController;
use crate::tracing_spans::{conflict_span, message_span, witness_span};

/// Number of named LMDB databases.
const MAX_DBS: u32 = 8;
/// Capacity of the channel feeding actions into the dispatcher loop.
const ACTION_CHANNEL_CAPACITY: usize = 1024;
/// Page size used when replaying the local atom sequence on open.
const RECOVERY_PAGE: usize = 1024;

/// The persistence a node runs on.
#[derive(Clone)]
pub struct NodeStores {
    pub cursors: Arc<dyn CursorStore>,
    pub commitments: Arc<dyn CommitmentStore>,
    pub atoms: Arc<dyn AtomStore>,
    atom_view: Arc<dyn AtomStoreView>,
}

impl NodeStores {
    pub fn new<C, M, A>(cursors: Arc<C>, commitments: Arc<M>, atoms: Arc<A>) -> Self
    where
        C: CursorStore + 'static,
        M: CommitmentStore + 'static,
        A: AtomStore + 'static,
    {
        Self {
            cursors,
            commitments,
            atom_view: atoms.clone(),
            atoms,
        }
    }

    /// Open the LMDB-backed stores under `path`.
    pub fn open_lmdb(path: &Path, map_size: usize) -> Result<(Self, LmdbEnvironment), NodeError> {
        let environment = LmdbEnvironment::open(path, MAX_DBS, map_size)?;
        let stores = Self::new(
            Arc::new(environment.cursor_store()),
            Arc::new(environment.commitment_store()),
            Arc::new(environment.atom_store()),
        );
        Ok((stores, environment))
    }

    pub fn atom_view(&self) -> Arc<dyn AtomStoreView> {
        Arc::clone(&self.atom_view)
    }
}

/// This node's own position in its vertex chain.
#[derive(Debug, Default)]
struct LocalChain {
    clock: u64,
    last: Option<TemporalVertex>,
}

/// A running Tempo node.
pub struct TempoNode {
    config: NodeConfig,
    keypair: KeyPair,
    nid: NodeId,
    stores: NodeStores,
    environment: Option<LmdbEnvironment>,
    tokio_scheduler: Option<Arc<TokioScheduler>>,

    address_book: Arc<AddressBook>,
    router: Arc<MessageRouter>,
    tempo: Arc<Tempo>,
    handle: TempoHandle,
    actions: Mutex<Option<mpsc::Receiver<TempoAction>>>,
    discoverer: Arc<IterativeDiscoverer>,
    sampling: Arc<SamplingCoordinator>,
    metrics: Option<Arc<TempoMetrics>>,
    shutdown: Arc<ShutdownController>,

    chain: Mutex<LocalChain>,
    task_handles: Mutex<Vec<JoinHandle<()>>>,
    closed: AtomicBool,
}

impl TempoNode {
    /// Assemble a node from injected collaborators.
    ///
    /// Nothing runs until [`start`](Self::start); messages can be handed to
    /// [`handle_message`](Self::handle_message) right away.
    pub fn new(
        config: NodeConfig,
        keypair: KeyPair,
        stores: NodeStores,
        messenger: Arc<dyn PeerMessenger>,
        scheduler: Arc<dyn Scheduler>,
    ) -> Result<Self, NodeError> {
        let nid = keypair.node_id();
        let tempo_config = &config.tempo;

        let address_book = Arc::new(AddressBook::new());
        let router = Arc::new(MessageRouter::new());
        let live_peers: Arc<dyn LivePeersView> = address_book.clone();

        let tempo = Tempo::builder(live_peers, Arc::clone(&scheduler))
            .boxed_epic(build_resolver(
                tempo_config.resolver,
                nid,
                tempo_config.sample_size,
            ))
            .build();
        let (handle, actions) = TempoHandle::channel(ACTION_CHANNEL_CAPACITY);

        let discoverer = IterativeDiscoverer::new(
            nid,
            tempo_config.discoverer_config(),
            Arc::clone(&stores.cursors),
            Arc::clone(&stores.commitments),
            stores.atom_view(),
            Arc::clone(&scheduler),
            Arc::clone(&messenger),
        );
        discoverer.register(&router);
        discoverer.attach(&address_book);

        let sampling = SamplingCoordinator::new(
            &tempo,
            stores.atom_view(),
            messenger,
            scheduler,
            tempo_config.sampling_timeout(),
        );
        sampling.register(&router);
        tempo.add_listener(sampling.clone());

        let metrics = if config.enable_metrics {
            let metrics = Arc::new(TempoMetrics::new()?);
            let observer = Arc::clone(&metrics);
            tempo.add_listener(Arc::new(move |action: &TempoAction| observer.on_action(action)));
            Some(metrics)
        } else {
            None
        };

        let chain = recover_chain(&stores, &nid)?;
        tracing::info!(
            node = %nid,
            clock = chain.clock,
            resolver = ?tempo_config.resolver,
            "tempo node assembled"
        );

        Ok(Self {
            config,
            keypair,
            nid,
            stores,
            environment: None,
            tokio_scheduler: None,
            address_book,
            router,
            tempo,
            handle,
            actions: Mutex::new(Some(actions)),
            discoverer,
            sampling,
            metrics,
            shutdown: Arc::new(ShutdownController::new()),
            chain: Mutex::new(chain),
            task_handles: Mutex::new(Vec::new()),
            closed: AtomicBool::new(false),
        })
    }

    /// Open a node on LMDB under `config.data_dir`, with tokio timers.
    ///
    /// Must be called from within a tokio runtime.
    pub fn open(config: NodeConfig, messenger: Arc<dyn PeerMessenger>) -> Result<Self, NodeError> {
        let runtime = Handle::try_current()
            .map_err(|e| NodeError::Config(format!("no tokio runtime: {e}")))?;
        let keypair = match config.seed()? {
            Some(seed) => keypair_from_seed(&seed),
            None => {
                let keypair = generate_keypair();
                tracing::warn!(node = %keypair.node_id(), "no node_seed configured, using a transient key");
                keypair
            }
        };
        let (stores, environment) = NodeStores::open_lmdb(&config.data_dir, config.map_size)?;
        let scheduler = Arc::new(TokioScheduler::new(runtime));

        let mut node = Self::new(config, keypair, stores, messenger, scheduler.clone())?;
        node.environment = Some(environment);
        node.tokio_scheduler = Some(scheduler);
        Ok(node)
    }

    /// Spawn the discovery workers and the dispatcher loop.
    pub fn start(&self) -> Result<(), NodeError> {
        if self.is_closed() {
            return Err(NodeError::Closed);
        }
        let Some(actions) = self
            .actions
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
        else {
            tracing::warn!("tempo node already started");
            return Ok(());
        };
        self.discoverer.start();
        let dispatcher = tokio::spawn(
            Arc::clone(&self.tempo).run(actions, self.shutdown.subscribe()),
        );
        self.task_handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(dispatcher);
        tracing::info!(node = %self.nid, "tempo node started");
        Ok(())
    }

    /// Start, then run until SIGINT/SIGTERM or [`shutdown`](Self::shutdown).
    pub async fn run_until_shutdown(&self) -> Result<(), NodeError> {
        self.start()?;
        let mut shutdown = self.shutdown.subscribe();
        tokio::select! {
            _ = self.shutdown.wait_for_signal() => {}
            _ = shutdown.recv() => {}
        }
        self.close()
    }

    pub fn shutdown(&self) {
        self.shutdown.shutdown();
    }

    /// Deliver a message received from `peer`.
    pub fn handle_message(&self, peer: &Peer, message: TempoMessage) {
        if self.is_closed() {
            return;
        }
        let _span = message_span(peer, message.kind()).entered();
        self.router.route(peer, message);
    }

    /// Serve queued discovery requests inline. Only meaningful before
    /// [`start`](Self::start) hands the queue to the worker tasks.
    pub fn process_queued_requests(&self) -> usize {
        self.discoverer.process_queued()
    }

    pub fn add_peers(&self, peers: impl IntoIterator<Item = Peer>) {
        self.address_book.add_peers(peers);
    }

    pub fn remove_peers<'a>(&self, nids: impl IntoIterator<Item = &'a NodeId>) {
        self.address_book.remove_peers(nids);
    }

    /// Attest to `atom` with this node's next clock and append it to the
    /// local sequence. Atoms already witnessed here are returned unchanged.
    pub fn witness(&self, mut atom: TempoAtom) -> Result<TempoAtom, NodeError> {
        let mut chain = self.chain.lock().unwrap_or_else(PoisonError::into_inner);
        if atom.temporal_proof().has_vertex_by(&self.nid) {
            return Ok(atom);
        }
        let _span = witness_span(chain.clock).entered();

        let proof = atom.temporal_proof();
        let rclock = proof.vertices().iter().map(|v| v.clock).max().unwrap_or(0);
        let relayers = proof.owners();
        let vertex = attest(
            &self.keypair,
            &atom.aid(),
            chain.clock,
            rclock,
            chain.last.as_ref(),
            relayers,
        );
        atom.add_vertex(vertex.clone());

        self.stores.atoms.store_atom(chain.clock, &atom)?;
        self.stores
            .commitments
            .put_commitments(&self.nid, &[vertex.commitment], chain.clock)?;
        tracing::debug!(aid = %atom.aid(), clock = chain.clock, "atom witnessed");

        chain.clock += 1;
        chain.last = Some(vertex);
        Ok(atom)
    }

    /// Raise a conflict between `atom` and `conflicting` and run the
    /// resulting cascade.
    pub fn raise_conflict(&self, atom: TempoAtom, conflicting: Vec<TempoAtom>) -> DispatchReport {
        let raise = RaiseConflictAction::new(atom, conflicting);
        let _span = conflict_span(&raise.tag).entered();
        self.tempo.dispatch(raise.into())
    }

    /// Queue an action for the dispatcher loop.
    pub fn submit(&self, action: TempoAction) -> Result<(), NodeError> {
        Ok(self.handle.try_dispatch(action)?)
    }

    pub fn add_action_listener(&self, listener: Arc<dyn ActionListener>) {
        self.tempo.add_listener(listener);
    }

    pub fn add_discovery_listener(&self, listener: Arc<dyn AtomDiscoveryListener>) -> ListenerId {
        self.discoverer.add_listener(listener)
    }

    pub fn remove_discovery_listener(&self, id: ListenerId) -> bool {
        self.discoverer.remove_listener(id)
    }

    /// Current metrics in the Prometheus text format, if metrics are enabled.
    pub fn metrics_text(&self) -> Result<Option<String>, NodeError> {
        let Some(metrics) = &self.metrics else {
            return Ok(None);
        };
        metrics.observe(&self.discoverer);
        Ok(Some(metrics.encode()?))
    }

    /// Stop every component and flush storage. Safe to call more than once.
    pub fn close(&self) -> Result<(), NodeError> {
        if self.closed.swap(true, Ordering::AcqRel) {
            return Ok(());
        }
        tracing::info!(node = %self.nid, "tempo node stopping");
        self.shutdown.shutdown();
        self.discoverer.close();
        self.sampling.deregister(&self.router);
        if let Some(scheduler) = &self.tokio_scheduler {
            scheduler.shutdown();
        }
        for task in self
            .task_handles
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
        {
            task.abort();
        }
        if let Some(environment) = &self.environment {
            environment.sync()?;
        }
        tracing::info!(node = %self.nid, "tempo node stopped");
        Ok(())
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::Acquire)
    }

    pub fn nid(&self) -> NodeId {
        self.nid
    }

    pub fn peer(&self, address: impl Into<String>) -> Peer {
        Peer::new(self.nid, address)
    }

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn tempo(&self) -> &Arc<Tempo> {
        &self.tempo
    }

    pub fn discoverer(&self) -> &Arc<IterativeDiscoverer> {
        &self.discoverer
    }

    pub fn address_book(&self) -> &Arc<AddressBook> {
        &self.address_book
    }

    pub fn stores(&self) -> &NodeStores {
        &self.stores
    }

    /// Next clock this node will attest with.
    pub fn clock(&self) -> u64 {
        self.chain.lock().unwrap_or_else(PoisonError::into_inner).clock
    }
}

impl Drop for TempoNode {
    fn drop(&mut self) {
        if let Err(e) = self.close() {
            tracing::warn!(error = %e, "failed to close tempo node cleanly");
        }
    }
}

/// Replay the local atom sequence to find the next clock and this node's
/// last vertex.
fn recover_chain(stores: &NodeStores, nid: &NodeId) -> Result<LocalChain, NodeError> {
    let mut chain = LocalChain::default();
    let mut last_aid = None;
    loop {
        let page = stores.atoms.get_next_aids(chain.clock, RECOVERY_PAGE)?;
        chain.clock += page.len() as u64;
        if let Some(aid) = page.last() {
            last_aid = Some(*aid);
        }
        if page.len() < RECOVERY_PAGE {
            break;
        }
    }
    if let Some(aid) = last_aid {
        chain.last = stores
            .atoms
            .get_temporal_proof(&aid)?
            .and_then(|proof| proof.vertex_by(nid).cloned());
    }
    Ok(chain)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempo_conflicts::ResolverPolicy;
    use tempo_crypto::{verify_commitment_chain, verify_owner_chain};
    use tempo_nullables::{
        NullAtomStore, NullCommitmentStore, NullCursorStore, NullMessenger, NullScheduler,
    };
    use tempo_engine::{ActionKind, SamplingCompleteAction, TempoError};
    use tempo_types::{Hash, TemporalProof};

    fn null_stores() -> NodeStores {
        NodeStores::new(
            Arc::new(NullCursorStore::new()),
            Arc::new(NullCommitmentStore::new()),
            Arc::new(NullAtomStore::new()),
        )
    }

    fn node_with(config: NodeConfig, stores: NodeStores) -> (TempoNode, Arc<NullMessenger>) {
        let messenger = Arc::new(NullMessenger::new());
        let node = TempoNode::new(
            config,
            keypair_from_seed(&[1; 32]),
            stores,
            messenger.clone(),
            Arc::new(NullScheduler::new()),
        )
        .unwrap();
        (node, messenger)
    }

    #[test]
    fn witnessed_atoms_form_a_verifiable_chain() {
        let (node, _) = node_with(NodeConfig::default(), null_stores());
        let atoms: Vec<TempoAtom> = (0..3u8)
            .map(|i| node.witness(TempoAtom::new(vec![i])).unwrap())
            .collect();

        let chain: Vec<TemporalVertex> = atoms
            .iter()
            .map(|a| a.temporal_proof().vertex_by(&node.nid()).unwrap().clone())
            .collect();
        verify_owner_chain(&chain).unwrap();
        let aids: Vec<_> = atoms.iter().map(TempoAtom::aid).collect();
        let commitments: Vec<Hash> = chain.iter().map(|v| v.commitment).collect();
        assert!(verify_commitment_chain(&Hash::ZERO, &aids, &commitments));
        assert_eq!(node.clock(), 3);

        let stored = node
            .stores()
            .commitments
            .get_next_commitments(&node.nid(), 0, 10)
            .unwrap();
        assert_eq!(stored, commitments);
    }

    #[test]
    fn witnessing_twice_is_a_noop() {
        let (node, _) = node_with(NodeConfig::default(), null_stores());
        let atom = node.witness(TempoAtom::new(b"once".to_vec())).unwrap();
        let again = node.witness(atom.clone()).unwrap();
        assert_eq!(again, atom);
        assert_eq!(node.clock(), 1);
    }

    #[test]
    fn chain_recovered_from_stores() {
        let stores = null_stores();
        let last = {
            let (node, _) = node_with(NodeConfig::default(), stores.clone());
            node.witness(TempoAtom::new(vec![1])).unwrap();
            node.witness(TempoAtom::new(vec![2])).unwrap()
        };
        let (node, _) = node_with(NodeConfig::default(), stores);
        assert_eq!(node.clock(), 2);

        let next = node.witness(TempoAtom::new(vec![3])).unwrap();
        let previous = last.temporal_proof().vertex_by(&node.nid()).unwrap();
        let vertex = next.temporal_proof().vertex_by(&node.nid()).unwrap();
        assert_eq!(vertex.previous, previous.id());
        assert_eq!(vertex.clock, 2);
    }

    #[test]
    fn local_policy_resolves_to_first_witnessed() {
        let mut config = NodeConfig::default();
        config.tempo.resolver = ResolverPolicy::Local;
        let (node, _) = node_with(config, null_stores());
        let first = node.witness(TempoAtom::new(b"first".to_vec())).unwrap();
        let second = node.witness(TempoAtom::new(b"second".to_vec())).unwrap();

        let winners = Arc::new(Mutex::new(Vec::new()));
        let sink = winners.clone();
        node.add_action_listener(Arc::new(move |action: &TempoAction| {
            if let TempoAction::ConflictResolved(resolved) = action {
                sink.lock().unwrap().push(resolved.winner);
            }
        }));

        let report = node.raise_conflict(second, vec![first.clone()]);
        assert!(report.is_clean());
        assert_eq!(*winners.lock().unwrap(), vec![first.aid()]);
    }

    #[test]
    fn unwitnessed_local_conflicts_do_not_stay_pending() {
        let mut config = NodeConfig {
            enable_metrics: true,
            ..Default::default()
        };
        config.tempo.resolver = ResolverPolicy::Local;
        let (node, _) = node_with(config, null_stores());

        for i in 0..5u8 {
            let report = node.raise_conflict(TempoAtom::new(vec![i]), vec![TempoAtom::new(vec![i, i])]);
            assert!(report.failed(ActionKind::RaiseConflict));
            assert!(report.processed.contains(&ActionKind::ConflictAborted));
        }
        assert!(node.tempo().conflicts().is_empty());

        let text = node.metrics_text().unwrap().unwrap();
        assert!(text.contains("tempo_conflicts_aborted_total 5"));
    }

    #[test]
    fn undecided_momentum_can_be_raised_again() {
        let (node, _) = node_with(NodeConfig::default(), null_stores());
        node.add_peers([Peer::new(NodeId::new([9; 16]), "peer-9")]);
        let x = TempoAtom::new(b"x".to_vec());
        let y = TempoAtom::new(b"y".to_vec());
        let tag = RaiseConflictAction::new(x.clone(), vec![y.clone()]).tag;

        node.raise_conflict(x.clone(), vec![y.clone()]);
        assert!(node.tempo().is_pending(&tag));

        let report = node.tempo().dispatch(
            SamplingCompleteAction {
                samples: vec![TemporalProof::new(x.aid())],
                tag,
            }
            .into(),
        );
        assert!(matches!(
            report.failures[0].error,
            TempoError::MomentumUndecided(_)
        ));
        assert!(!node.tempo().is_pending(&tag));

        let retry = node.raise_conflict(x, vec![y]);
        assert!(retry.processed.contains(&ActionKind::ResolveConflict));
        assert!(retry.processed.contains(&ActionKind::RequestSampling));
        assert!(node.tempo().is_pending(&tag));
    }

    #[test]
    fn metrics_disabled_by_default() {
        let (node, _) = node_with(NodeConfig::default(), null_stores());
        assert!(node.metrics_text().unwrap().is_none());
    }

    #[test]
    fn metrics_count_conflicts_and_peers() {
        let config = NodeConfig {
            enable_metrics: true,
            ..Default::default()
        };
        let (node, _) = node_with(config, null_stores());
        node.add_peers([Peer::new(NodeId::new([9; 16]), "peer-9")]);
        node.raise_conflict(TempoAtom::new(vec![1]), vec![TempoAtom::new(vec![2])]);

        let text = node.metrics_text().unwrap().unwrap();
        assert!(text.contains("tempo_conflicts_raised_total 1"));
        assert!(text.contains("tempo_tracked_peers 1"));
        assert!(text.contains("tempo_discovery_requests_sent_total 1"));
    }

    #[test]
    fn close_is_idempotent_and_stops_message_handling() {
        let (node, messenger) = node_with(NodeConfig::default(), null_stores());
        node.close().unwrap();
        node.close().unwrap();
        assert!(node.is_closed());
        assert!(matches!(node.start(), Err(NodeError::Closed)));

        let peer = Peer::new(NodeId::new([2; 16]), "peer-2");
        node.handle_message(
            &peer,
            tempo_messages::DiscoveryRequestMessage {
                cursor: tempo_types::LogicalClockCursor::new(0),
            }
            .into(),
        );
        assert!(messenger.sent().is_empty());
    }

    #[tokio::test]
    async fn open_on_lmdb_persists_across_restarts() {
        let dir = tempfile::tempdir().unwrap();
        let config = NodeConfig {
            data_dir: dir.path().to_path_buf(),
            map_size: 10 * 1024 * 1024,
            node_seed: Some("07".repeat(32)),
            ..Default::default()
        };
        {
            let node = TempoNode::open(config.clone(), Arc::new(NullMessenger::new())).unwrap();
            node.witness(TempoAtom::new(b"durable".to_vec())).unwrap();
            node.close().unwrap();
        }
        let node = TempoNode::open(config, Arc::new(NullMessenger::new())).unwrap();
        assert_eq!(node.clock(), 1);
        node.close().unwrap();
    }

    #[tokio::test]
    async fn submitted_actions_reach_the_dispatcher() {
        let (node, _) = node_with(NodeConfig::default(), null_stores());
        let seen = Arc::new(Mutex::new(0usize));
        let sink = seen.clone();
        node.add_action_listener(Arc::new(move |action: &TempoAction| {
            if matches!(action, TempoAction::RaiseConflict(_)) {
                *sink.lock().unwrap() += 1;
            }
        }));
        node.start().unwrap();

        node.submit(
            RaiseConflictAction::new(TempoAtom::new(vec![1]), vec![TempoAtom::new(vec![2])])
                .into(),
        )
        .unwrap();
        for _ in 0..100 {
            if *seen.lock().unwrap() == 1 {
                break;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        assert_eq!(*seen.lock().unwrap(), 1);
        node.close().unwrap();
    }
}
