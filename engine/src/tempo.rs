//! The action dispatcher.

use std::collections::VecDeque;
use std::sync::{Arc, Mutex, PoisonError, RwLock, Weak};

use tokio::sync::{broadcast, mpsc};

use tempo_types::ConflictTag;
use tempo_utils::{Scheduler, StatsCounter};

use crate::action::{ActionKind, ConflictAbortedAction, ScheduleAction, TempoAction};
use crate::epic::{ConflictsReducer, TempoEpic, TempoReducer};
use crate::state::{ConflictsState, LivePeersView, StateBundle, StateKind};
use crate::TempoError;

const STAT_DISPATCHED: &str = "dispatched";
const STAT_FAILURES: &str = "epic_failures";
const STAT_SCHEDULED: &str = "scheduled";
const STAT_ABORTED: &str = "conflicts_aborted";

/// Observer of every action the engine processed.
///
/// Called after a dispatch cascade finished, outside engine locks, so a
/// listener may dispatch further actions.
pub trait ActionListener: Send + Sync {
    fn on_action(&self, action: &TempoAction);
}

impl<F> ActionListener for F
where
    F: Fn(&TempoAction) + Send + Sync,
{
    fn on_action(&self, action: &TempoAction) {
        self(action)
    }
}

/// An epic that returned an error.
#[derive(Debug)]
pub struct EpicFailure {
    pub epic: &'static str,
    pub action: ActionKind,
    pub error: TempoError,
}

/// Outcome of one `dispatch` call, covering the whole cascade.
#[derive(Debug, Default)]
pub struct DispatchReport {
    /// Every action processed, in processing order.
    pub processed: Vec<ActionKind>,
    /// Actions for which no epic emitted anything and none failed.
    pub unhandled: Vec<ActionKind>,
    pub failures: Vec<EpicFailure>,
}

impl DispatchReport {
    pub fn is_clean(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn failed(&self, kind: ActionKind) -> bool {
        self.failures.iter().any(|f| f.action == kind)
    }
}

pub struct TempoBuilder {
    epics: Vec<Box<dyn TempoEpic>>,
    reducers: Vec<Box<dyn TempoReducer>>,
    live_peers: Arc<dyn LivePeersView>,
    scheduler: Arc<dyn Scheduler>,
}

impl TempoBuilder {
    pub fn epic(mut self, epic: impl TempoEpic + 'static) -> Self {
        self.epics.push(Box::new(epic));
        self
    }

    pub fn boxed_epic(mut self, epic: Box<dyn TempoEpic>) -> Self {
        self.epics.push(epic);
        self
    }

    /// Add a reducer after the built-in [`ConflictsReducer`].
    pub fn reducer(mut self, reducer: impl TempoReducer + 'static) -> Self {
        self.reducers.push(Box::new(reducer));
        self
    }

    pub fn build(self) -> Arc<Tempo> {
        Arc::new_cyclic(|me| Tempo {
            me: me.clone(),
            epics: self.epics,
            reducers: self.reducers,
            conflicts: Mutex::new(ConflictsState::new()),
            live_peers: self.live_peers,
            scheduler: self.scheduler,
            listeners: RwLock::new(Vec::new()),
            processing: Mutex::new(()),
            stats: StatsCounter::new(&[STAT_DISPATCHED, STAT_FAILURES, STAT_SCHEDULED, STAT_ABORTED]),
        })
    }
}

/// Routes actions through epics and reducers, one action at a time.
pub struct Tempo {
    me: Weak<Tempo>,
    epics: Vec<Box<dyn TempoEpic>>,
    reducers: Vec<Box<dyn TempoReducer>>,
    conflicts: Mutex<ConflictsState>,
    live_peers: Arc<dyn LivePeersView>,
    scheduler: Arc<dyn Scheduler>,
    listeners: RwLock<Vec<Arc<dyn ActionListener>>>,
    processing: Mutex<()>,
    stats: StatsCounter,
}

impl Tempo {
    pub fn builder(
        live_peers: Arc<dyn LivePeersView>,
        scheduler: Arc<dyn Scheduler>,
    ) -> TempoBuilder {
        TempoBuilder {
            epics: Vec::new(),
            reducers: vec![Box::new(ConflictsReducer)],
            live_peers,
            scheduler,
        }
    }

    pub fn add_listener(&self, listener: Arc<dyn ActionListener>) {
        self.listeners
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .push(listener);
    }

    /// Process `action` and everything it causes.
    ///
    /// Emitted actions are queued FIFO in emission order. For each action,
    /// every epic sees the same pre-reduction snapshot; reducers run
    /// afterwards. `Schedule` actions are handed to the scheduler once the
    /// cascade completes.
    ///
    /// An epic failure on a step of a conflict's resolution queues a
    /// `ConflictAborted` for its tag, so the conflict can be raised again.
    pub fn dispatch(&self, action: TempoAction) -> DispatchReport {
        let mut report = DispatchReport::default();
        let mut delivered = Vec::new();
        let mut deferred = Vec::new();

        {
            let _processing = self
                .processing
                .lock()
                .unwrap_or_else(PoisonError::into_inner);
            let mut queue = VecDeque::from([action]);

            while let Some(action) = queue.pop_front() {
                let kind = action.kind();
                self.stats.increment(STAT_DISPATCHED);
                report.processed.push(kind);

                if let TempoAction::Schedule(schedule) = action {
                    deferred.push(schedule);
                    continue;
                }

                let conflicts = self.conflicts_snapshot();
                let mut live_peers = None;
                let mut emitted = 0usize;
                let mut failed = false;

                for epic in &self.epics {
                    let mut bundle = StateBundle::new();
                    for slice in epic.required_state() {
                        bundle = match slice {
                            StateKind::Conflicts => bundle.with_conflicts(conflicts.clone()),
                            StateKind::LivePeers => bundle.with_live_peers(
                                live_peers
                                    .get_or_insert_with(|| self.live_peers.live_peers())
                                    .clone(),
                            ),
                        };
                    }

                    match epic.epic(&bundle, &action) {
                        Ok(next) => {
                            emitted += next.len();
                            queue.extend(next);
                        }
                        Err(error) => {
                            tracing::error!(epic = epic.name(), action = %kind, tag = ?action.tag(), %error, "epic failed");
                            self.stats.increment(STAT_FAILURES);
                            failed = true;
                            report.failures.push(EpicFailure {
                                epic: epic.name(),
                                action: kind,
                                error,
                            });
                        }
                    }
                }

                {
                    let mut state = self.conflicts.lock().unwrap_or_else(PoisonError::into_inner);
                    for reducer in &self.reducers {
                        reducer.reduce(&mut state, &action);
                    }
                }

                if failed {
                    if let Some(aborted) = Self::abort_for(&action, &conflicts) {
                        tracing::warn!(tag = %aborted.tag, cause = %kind, "aborting conflict resolution");
                        self.stats.increment(STAT_ABORTED);
                        queue.push_back(aborted.into());
                    }
                }

                if emitted == 0 && !failed {
                    report.unhandled.push(kind);
                }
                delivered.push(action);
            }
        }

        for schedule in deferred {
            self.schedule(schedule);
        }

        let listeners: Vec<_> = self
            .listeners
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone();
        for action in &delivered {
            for listener in &listeners {
                listener.on_action(action);
            }
        }

        report
    }

    /// The abort owed for a failed `action`, judged against the state the
    /// epics saw. A failed duplicate raise leaves the pending attempt alone.
    fn abort_for(action: &TempoAction, conflicts: &ConflictsState) -> Option<ConflictAbortedAction> {
        let tag = match action {
            TempoAction::RaiseConflict(raise) if conflicts.is_pending(&raise.tag) => return None,
            TempoAction::RaiseConflict(_)
            | TempoAction::ResolveConflict(_)
            | TempoAction::RequestSampling(_)
            | TempoAction::SamplingComplete(_) => action.tag()?,
            TempoAction::ConflictResolved(_)
            | TempoAction::ConflictAborted(_)
            | TempoAction::Schedule(_) => return None,
        };
        Some(ConflictAbortedAction {
            tag,
            cause: action.kind(),
        })
    }

    fn schedule(&self, schedule: ScheduleAction) {
        let ScheduleAction { action, delay } = schedule;
        self.stats.increment(STAT_SCHEDULED);
        tracing::trace!(action = %action.kind(), ?delay, "scheduling action");
        let me = self.me.clone();
        self.scheduler.schedule(
            delay,
            Box::new(move || {
                if let Some(tempo) = me.upgrade() {
                    tempo.dispatch(*action);
                }
            }),
        );
    }

    fn conflicts_snapshot(&self) -> ConflictsState {
        self.conflicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    /// A copy of the pending conflicts.
    pub fn conflicts(&self) -> ConflictsState {
        self.conflicts_snapshot()
    }

    pub fn is_pending(&self, tag: &ConflictTag) -> bool {
        self.conflicts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_pending(tag)
    }

    pub fn stats(&self) -> &StatsCounter {
        &self.stats
    }

    /// Drain actions from `actions` until it closes or `shutdown` fires.
    pub async fn run(
        self: Arc<Self>,
        mut actions: mpsc::Receiver<TempoAction>,
        mut shutdown: broadcast::Receiver<()>,
    ) {
        loop {
            let action = tokio::select! {
                biased;
                _ = shutdown.recv() => {
                    tracing::info!("tempo dispatcher shutting down");
                    break;
                }
                action = actions.recv() => action,
            };
            let Some(action) = action else {
                tracing::debug!("tempo action channel closed");
                break;
            };
            let report = self.dispatch(action);
            if !report.is_clean() {
                tracing::warn!(failures = report.failures.len(), "dispatch finished with failures");
            }
        }
    }
}

/// Cloneable sender side of the dispatcher's action channel.
#[derive(Clone)]
pub struct TempoHandle {
    tx: mpsc::Sender<TempoAction>,
    capacity: usize,
}

impl TempoHandle {
    /// Create a handle and the receiver to pass to [`Tempo::run`].
    pub fn channel(capacity: usize) -> (Self, mpsc::Receiver<TempoAction>) {
        let (tx, rx) = mpsc::channel(capacity);
        (Self { tx, capacity }, rx)
    }

    /// Queue an action without waiting.
    pub fn try_dispatch(&self, action: TempoAction) -> Result<(), TempoError> {
        self.tx.try_send(action).map_err(|e| match e {
            mpsc::error::TrySendError::Full(_) => TempoError::RequestQueueFull {
                capacity: self.capacity,
            },
            mpsc::error::TrySendError::Closed(_) => TempoError::ShutDown,
        })
    }

    pub async fn dispatch(&self, action: TempoAction) -> Result<(), TempoError> {
        self.tx.send(action).await.map_err(|_| TempoError::ShutDown)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::action::{
        ConflictResolvedAction, RaiseConflictAction, ResolveConflictAction,
        SamplingCompleteAction,
    };
    use crate::state::LivePeersState;
    use std::time::Duration;
    use tempo_nullables::NullScheduler;
    use tempo_types::TempoAtom;

    fn raise() -> RaiseConflictAction {
        RaiseConflictAction::new(
            TempoAtom::new(b"a".to_vec()),
            vec![TempoAtom::new(b"b".to_vec())],
        )
    }

    /// Raise -> [Resolve, SamplingComplete], Resolve -> [ConflictResolved].
    struct CascadeEpic;

    impl TempoEpic for CascadeEpic {
        fn name(&self) -> &'static str {
            "cascade"
        }

        fn epic(
            &self,
            _bundle: &StateBundle,
            action: &TempoAction,
        ) -> Result<Vec<TempoAction>, TempoError> {
            Ok(match action {
                TempoAction::RaiseConflict(raise) => vec![
                    ResolveConflictAction::from(raise).into(),
                    SamplingCompleteAction {
                        samples: Vec::new(),
                        tag: raise.tag,
                    }
                    .into(),
                ],
                TempoAction::ResolveConflict(resolve) => vec![ConflictResolvedAction {
                    winner: resolve.atom.aid(),
                    aids: resolve.aids(),
                    tag: resolve.tag,
                }
                .into()],
                _ => Vec::new(),
            })
        }
    }

    struct FailingEpic;

    impl TempoEpic for FailingEpic {
        fn name(&self) -> &'static str {
            "failing"
        }

        fn epic(
            &self,
            _bundle: &StateBundle,
            action: &TempoAction,
        ) -> Result<Vec<TempoAction>, TempoError> {
            match action {
                TempoAction::RaiseConflict(raise) => Err(TempoError::NoLocalWitness(raise.tag)),
                _ => Ok(Vec::new()),
            }
        }
    }

    /// Reads conflicts without declaring them.
    struct UndeclaredEpic;

    impl TempoEpic for UndeclaredEpic {
        fn name(&self) -> &'static str {
            "undeclared"
        }

        fn epic(
            &self,
            bundle: &StateBundle,
            _action: &TempoAction,
        ) -> Result<Vec<TempoAction>, TempoError> {
            bundle.conflicts()?;
            Ok(Vec::new())
        }
    }

    /// Records whether the raised tag was pending in its snapshot.
    struct SnapshotEpic {
        seen: Arc<Mutex<Vec<bool>>>,
    }

    impl TempoEpic for SnapshotEpic {
        fn name(&self) -> &'static str {
            "snapshot"
        }

        fn required_state(&self) -> &'static [StateKind] {
            &[StateKind::Conflicts]
        }

        fn epic(
            &self,
            bundle: &StateBundle,
            action: &TempoAction,
        ) -> Result<Vec<TempoAction>, TempoError> {
            if let TempoAction::RaiseConflict(raise) = action {
                let pending = bundle.conflicts()?.is_pending(&raise.tag);
                self.seen.lock().unwrap().push(pending);
            }
            Ok(Vec::new())
        }
    }

    /// Delays every sampling result by three seconds.
    struct DelayEpic;

    impl TempoEpic for DelayEpic {
        fn name(&self) -> &'static str {
            "delay"
        }

        fn epic(
            &self,
            _bundle: &StateBundle,
            action: &TempoAction,
        ) -> Result<Vec<TempoAction>, TempoError> {
            Ok(match action {
                TempoAction::RaiseConflict(raise) => vec![TempoAction::from(
                    SamplingCompleteAction {
                        samples: Vec::new(),
                        tag: raise.tag,
                    },
                )
                .delayed(Duration::from_secs(3))],
                _ => Vec::new(),
            })
        }
    }

    /// Raise -> [Resolve], then fails every SamplingComplete.
    struct UndecidedEpic;

    impl TempoEpic for UndecidedEpic {
        fn name(&self) -> &'static str {
            "undecided"
        }

        fn required_state(&self) -> &'static [StateKind] {
            &[StateKind::Conflicts]
        }

        fn epic(
            &self,
            bundle: &StateBundle,
            action: &TempoAction,
        ) -> Result<Vec<TempoAction>, TempoError> {
            match action {
                TempoAction::RaiseConflict(raise) => {
                    if bundle.conflicts()?.is_pending(&raise.tag) {
                        return Ok(Vec::new());
                    }
                    Ok(vec![ResolveConflictAction::from(raise).into()])
                }
                TempoAction::SamplingComplete(complete) => {
                    Err(TempoError::MomentumUndecided(complete.tag))
                }
                _ => Ok(Vec::new()),
            }
        }
    }

    fn builder(scheduler: Arc<NullScheduler>) -> TempoBuilder {
        Tempo::builder(Arc::new(LivePeersState::default()), scheduler)
    }

    fn recorder(tempo: &Tempo) -> Arc<Mutex<Vec<ActionKind>>> {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        tempo.add_listener(Arc::new(move |action: &TempoAction| {
            sink.lock().unwrap().push(action.kind());
        }));
        seen
    }

    #[test]
    fn cascade_is_fifo_in_emission_order() {
        let tempo = builder(Arc::new(NullScheduler::new()))
            .epic(CascadeEpic)
            .build();
        let seen = recorder(&tempo);

        let report = tempo.dispatch(raise().into());
        let expected = vec![
            ActionKind::RaiseConflict,
            ActionKind::ResolveConflict,
            ActionKind::SamplingComplete,
            ActionKind::ConflictResolved,
        ];
        assert_eq!(report.processed, expected);
        assert_eq!(*seen.lock().unwrap(), expected);
        assert_eq!(
            report.unhandled,
            vec![ActionKind::SamplingComplete, ActionKind::ConflictResolved]
        );
        assert!(report.is_clean());
    }

    #[test]
    fn conflict_cleared_after_resolution() {
        let tempo = builder(Arc::new(NullScheduler::new()))
            .epic(CascadeEpic)
            .build();
        let action = raise();
        tempo.dispatch(action.clone().into());
        assert!(!tempo.is_pending(&action.tag));
    }

    #[test]
    fn failure_is_reported_and_other_epics_still_run() {
        let tempo = builder(Arc::new(NullScheduler::new()))
            .epic(FailingEpic)
            .epic(CascadeEpic)
            .build();

        let report = tempo.dispatch(raise().into());
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].epic, "failing");
        assert!(report.failed(ActionKind::RaiseConflict));
        assert!(matches!(
            report.failures[0].error,
            TempoError::NoLocalWitness(_)
        ));
        assert!(report.processed.contains(&ActionKind::ConflictResolved));
        assert!(!report.unhandled.contains(&ActionKind::RaiseConflict));
        assert_eq!(tempo.stats().get(STAT_FAILURES), 1);
    }

    #[test]
    fn failed_decision_aborts_and_allows_a_new_attempt() {
        let tempo = builder(Arc::new(NullScheduler::new()))
            .epic(UndecidedEpic)
            .build();
        let seen = recorder(&tempo);
        let action = raise();

        tempo.dispatch(action.clone().into());
        assert!(tempo.is_pending(&action.tag));

        let report = tempo.dispatch(
            SamplingCompleteAction {
                samples: Vec::new(),
                tag: action.tag,
            }
            .into(),
        );
        assert!(report.failed(ActionKind::SamplingComplete));
        assert_eq!(
            report.processed,
            vec![ActionKind::SamplingComplete, ActionKind::ConflictAborted]
        );
        assert!(!tempo.is_pending(&action.tag));
        assert_eq!(tempo.stats().get(STAT_ABORTED), 1);

        let retry = tempo.dispatch(action.clone().into());
        assert_eq!(
            retry.processed,
            vec![ActionKind::RaiseConflict, ActionKind::ResolveConflict]
        );
        assert!(tempo.is_pending(&action.tag));
        assert!(seen.lock().unwrap().contains(&ActionKind::ConflictAborted));
    }

    #[test]
    fn failed_first_raise_leaves_nothing_pending() {
        let tempo = builder(Arc::new(NullScheduler::new()))
            .epic(FailingEpic)
            .build();
        let action = raise();

        let report = tempo.dispatch(action.clone().into());
        assert_eq!(
            report.processed,
            vec![ActionKind::RaiseConflict, ActionKind::ConflictAborted]
        );
        assert!(tempo.conflicts().is_empty());
    }

    #[test]
    fn failed_duplicate_raise_keeps_the_pending_attempt() {
        let tempo = builder(Arc::new(NullScheduler::new()))
            .epic(UndecidedEpic)
            .build();
        let action = raise();
        tempo.dispatch(action.clone().into());

        assert!(Tempo::abort_for(&action.clone().into(), &tempo.conflicts()).is_none());
        assert!(tempo.is_pending(&action.tag));
    }

    #[test]
    fn undeclared_state_is_a_failure() {
        let tempo = builder(Arc::new(NullScheduler::new()))
            .epic(UndeclaredEpic)
            .build();
        let report = tempo.dispatch(raise().into());
        assert!(matches!(
            report.failures[0].error,
            TempoError::MissingState(StateKind::Conflicts)
        ));
    }

    #[test]
    fn epics_see_pre_reduction_snapshot() {
        let seen = Arc::new(Mutex::new(Vec::new()));
        let tempo = builder(Arc::new(NullScheduler::new()))
            .epic(SnapshotEpic {
                seen: Arc::clone(&seen),
            })
            .build();

        let action = raise();
        tempo.dispatch(action.clone().into());
        assert!(tempo.is_pending(&action.tag));
        tempo.dispatch(action.into());
        assert_eq!(*seen.lock().unwrap(), vec![false, true]);
    }

    #[test]
    fn scheduled_action_fires_after_delay() {
        let scheduler = Arc::new(NullScheduler::new());
        let tempo = builder(Arc::clone(&scheduler)).epic(DelayEpic).build();
        let seen = recorder(&tempo);

        let report = tempo.dispatch(raise().into());
        assert_eq!(
            report.processed,
            vec![ActionKind::RaiseConflict, ActionKind::Schedule]
        );
        assert_eq!(scheduler.pending_delays(), vec![Duration::from_secs(3)]);

        scheduler.advance(Duration::from_secs(2));
        assert!(!seen.lock().unwrap().contains(&ActionKind::SamplingComplete));
        scheduler.advance(Duration::from_secs(1));
        assert!(seen.lock().unwrap().contains(&ActionKind::SamplingComplete));
        assert_eq!(tempo.stats().get(STAT_SCHEDULED), 1);
    }

    #[test]
    fn listener_may_dispatch_reentrantly() {
        let tempo = builder(Arc::new(NullScheduler::new())).build();
        let weak = Arc::downgrade(&tempo);
        let resolved = Arc::new(Mutex::new(0usize));
        let count = Arc::clone(&resolved);
        tempo.add_listener(Arc::new(move |action: &TempoAction| match action {
            TempoAction::RaiseConflict(raise) => {
                if let Some(tempo) = weak.upgrade() {
                    tempo.dispatch(
                        ConflictResolvedAction {
                            winner: raise.atom.aid(),
                            aids: raise.aids(),
                            tag: raise.tag,
                        }
                        .into(),
                    );
                }
            }
            TempoAction::ConflictResolved(_) => *count.lock().unwrap() += 1,
            _ => {}
        }));

        let action = raise();
        tempo.dispatch(action.clone().into());
        assert_eq!(*resolved.lock().unwrap(), 1);
        assert!(!tempo.is_pending(&action.tag));
    }

    #[tokio::test]
    async fn run_drains_channel_until_shutdown() {
        let tempo = builder(Arc::new(NullScheduler::new()))
            .epic(CascadeEpic)
            .build();
        let seen = recorder(&tempo);
        let (handle, rx) = TempoHandle::channel(4);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);
        let task = tokio::spawn(Arc::clone(&tempo).run(rx, shutdown_rx));

        handle.dispatch(raise().into()).await.unwrap();
        while seen.lock().unwrap().len() < 4 {
            tokio::task::yield_now().await;
        }
        shutdown_tx.send(()).unwrap();
        task.await.unwrap();
        assert!(matches!(
            handle.try_dispatch(raise().into()),
            Err(TempoError::ShutDown)
        ));
    }

    #[test]
    fn full_channel_reports_queue_full() {
        let (handle, _rx) = TempoHandle::channel(1);
        handle.try_dispatch(raise().into()).unwrap();
        assert!(matches!(
            handle.try_dispatch(raise().into()),
            Err(TempoError::RequestQueueFull { capacity: 1 })
        ));
    }
}
