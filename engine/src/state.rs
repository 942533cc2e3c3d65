//! State slices visible to epics.

use std::collections::{BTreeMap, BTreeSet};

use tempo_messages::Peer;
use tempo_types::{AtomId, ConflictTag, NodeId, TempoAtom};

use crate::TempoError;

/// Named slice of engine state an epic may declare.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum StateKind {
    Conflicts,
    LivePeers,
}

/// A pending conflict.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Conflict {
    pub tag: ConflictTag,
    /// The atom currently preferred for this conflict.
    pub current: AtomId,
    pub candidates: BTreeMap<AtomId, TempoAtom>,
}

impl Conflict {
    pub fn new(tag: ConflictTag, current: &TempoAtom, others: &[TempoAtom]) -> Self {
        let candidates = std::iter::once(current)
            .chain(others)
            .map(|atom| (atom.aid(), atom.clone()))
            .collect();
        Self {
            tag,
            current: current.aid(),
            candidates,
        }
    }

    pub fn aids(&self) -> BTreeSet<AtomId> {
        self.candidates.keys().copied().collect()
    }
}

/// Every conflict currently pending resolution, keyed by tag.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ConflictsState {
    conflicts: BTreeMap<ConflictTag, Conflict>,
}

impl ConflictsState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_pending(&self, tag: &ConflictTag) -> bool {
        self.conflicts.contains_key(tag)
    }

    pub fn get(&self, tag: &ConflictTag) -> Option<&Conflict> {
        self.conflicts.get(tag)
    }

    pub fn current_atom(&self, tag: &ConflictTag) -> Option<AtomId> {
        self.conflicts.get(tag).map(|c| c.current)
    }

    pub fn atom(&self, tag: &ConflictTag, aid: &AtomId) -> Option<&TempoAtom> {
        self.conflicts.get(tag)?.candidates.get(aid)
    }

    pub fn aids(&self, tag: &ConflictTag) -> Option<BTreeSet<AtomId>> {
        self.conflicts.get(tag).map(Conflict::aids)
    }

    /// Start tracking `conflict`. Returns `false` if its tag is already pending.
    pub fn insert(&mut self, conflict: Conflict) -> bool {
        if self.conflicts.contains_key(&conflict.tag) {
            return false;
        }
        self.conflicts.insert(conflict.tag, conflict);
        true
    }

    pub fn remove(&mut self, tag: &ConflictTag) -> Option<Conflict> {
        self.conflicts.remove(tag)
    }

    pub fn len(&self) -> usize {
        self.conflicts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.conflicts.is_empty()
    }

    pub fn tags(&self) -> impl Iterator<Item = &ConflictTag> {
        self.conflicts.keys()
    }
}

/// Snapshot of the reachable peers.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct LivePeersState {
    peers: BTreeMap<NodeId, Peer>,
}

impl LivePeersState {
    pub fn from_peers(peers: impl IntoIterator<Item = Peer>) -> Self {
        Self {
            peers: peers.into_iter().map(|p| (p.nid, p)).collect(),
        }
    }

    pub fn nids(&self) -> BTreeSet<NodeId> {
        self.peers.keys().copied().collect()
    }

    pub fn peer(&self, nid: &NodeId) -> Option<&Peer> {
        self.peers.get(nid)
    }

    pub fn peers(&self) -> impl Iterator<Item = &Peer> {
        self.peers.values()
    }

    pub fn len(&self) -> usize {
        self.peers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.peers.is_empty()
    }
}

/// Source of the live peer set, typically the address book.
pub trait LivePeersView: Send + Sync {
    fn live_peers(&self) -> LivePeersState;
}

impl LivePeersView for LivePeersState {
    fn live_peers(&self) -> LivePeersState {
        self.clone()
    }
}

/// The state slices handed to one epic invocation.
///
/// Only slices the epic declared in `required_state` are present.
#[derive(Clone, Debug, Default)]
pub struct StateBundle {
    conflicts: Option<ConflictsState>,
    live_peers: Option<LivePeersState>,
}

impl StateBundle {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_conflicts(mut self, conflicts: ConflictsState) -> Self {
        self.conflicts = Some(conflicts);
        self
    }

    pub fn with_live_peers(mut self, live_peers: LivePeersState) -> Self {
        self.live_peers = Some(live_peers);
        self
    }

    pub fn conflicts(&self) -> Result<&ConflictsState, TempoError> {
        self.conflicts
            .as_ref()
            .ok_or(TempoError::MissingState(StateKind::Conflicts))
    }

    pub fn live_peers(&self) -> Result<&LivePeersState, TempoError> {
        self.live_peers
            .as_ref()
            .ok_or(TempoError::MissingState(StateKind::LivePeers))
    }
}
