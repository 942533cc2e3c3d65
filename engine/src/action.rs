//! Actions exchanged on the Tempo bus.

use std::collections::BTreeSet;
use std::fmt;
use std::time::Duration;

use tempo_messages::Peer;
use tempo_types::{AtomId, ConflictTag, TempoAtom, TemporalProof};

/// The ledger found atoms that cannot all be committed.
///
/// `atom` is the candidate the ledger currently holds; `conflicting_atoms`
/// are the others.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RaiseConflictAction {
    pub atom: TempoAtom,
    pub conflicting_atoms: Vec<TempoAtom>,
    pub tag: ConflictTag,
}

impl RaiseConflictAction {
    /// Build the action with a tag derived from every candidate id.
    pub fn new(atom: TempoAtom, conflicting_atoms: Vec<TempoAtom>) -> Self {
        let aids: Vec<AtomId> = std::iter::once(&atom)
            .chain(&conflicting_atoms)
            .map(TempoAtom::aid)
            .collect();
        let tag = ConflictTag::from_aids(&aids);
        Self {
            atom,
            conflicting_atoms,
            tag,
        }
    }

    /// Every candidate, the held atom first.
    pub fn candidates(&self) -> impl Iterator<Item = &TempoAtom> {
        std::iter::once(&self.atom).chain(&self.conflicting_atoms)
    }

    pub fn aids(&self) -> BTreeSet<AtomId> {
        self.candidates().map(TempoAtom::aid).collect()
    }
}

/// Start resolving a newly raised conflict.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ResolveConflictAction {
    pub atom: TempoAtom,
    pub conflicting_atoms: Vec<TempoAtom>,
    pub tag: ConflictTag,
}

impl ResolveConflictAction {
    pub fn aids(&self) -> BTreeSet<AtomId> {
        std::iter::once(&self.atom)
            .chain(&self.conflicting_atoms)
            .map(TempoAtom::aid)
            .collect()
    }
}

impl From<&RaiseConflictAction> for ResolveConflictAction {
    fn from(raise: &RaiseConflictAction) -> Self {
        Self {
            atom: raise.atom.clone(),
            conflicting_atoms: raise.conflicting_atoms.clone(),
            tag: raise.tag,
        }
    }
}

/// Ask `peers` for their temporal proofs of `aids`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RequestSamplingAction {
    pub peers: Vec<Peer>,
    pub aids: BTreeSet<AtomId>,
    pub tag: ConflictTag,
}

/// The proofs gathered for a conflict, possibly none.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SamplingCompleteAction {
    pub samples: Vec<TemporalProof>,
    pub tag: ConflictTag,
}

/// Final outcome of a conflict.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictResolvedAction {
    pub winner: AtomId,
    pub aids: BTreeSet<AtomId>,
    pub tag: ConflictTag,
}

/// A resolution attempt failed; the conflict is no longer pending and may
/// be raised again.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ConflictAbortedAction {
    pub tag: ConflictTag,
    /// The action whose handling failed.
    pub cause: ActionKind,
}

/// Re-inject `action` after `delay`.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ScheduleAction {
    pub action: Box<TempoAction>,
    pub delay: Duration,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TempoAction {
    RaiseConflict(RaiseConflictAction),
    ResolveConflict(ResolveConflictAction),
    RequestSampling(RequestSamplingAction),
    SamplingComplete(SamplingCompleteAction),
    ConflictResolved(ConflictResolvedAction),
    ConflictAborted(ConflictAbortedAction),
    Schedule(ScheduleAction),
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub enum ActionKind {
    RaiseConflict,
    ResolveConflict,
    RequestSampling,
    SamplingComplete,
    ConflictResolved,
    ConflictAborted,
    Schedule,
}

impl TempoAction {
    pub fn kind(&self) -> ActionKind {
        match self {
            TempoAction::RaiseConflict(_) => ActionKind::RaiseConflict,
            TempoAction::ResolveConflict(_) => ActionKind::ResolveConflict,
            TempoAction::RequestSampling(_) => ActionKind::RequestSampling,
            TempoAction::SamplingComplete(_) => ActionKind::SamplingComplete,
            TempoAction::ConflictResolved(_) => ActionKind::ConflictResolved,
            TempoAction::ConflictAborted(_) => ActionKind::ConflictAborted,
            TempoAction::Schedule(_) => ActionKind::Schedule,
        }
    }

    /// Wrap this action so the engine delivers it after `delay`.
    pub fn delayed(self, delay: Duration) -> TempoAction {
        TempoAction::Schedule(ScheduleAction {
            action: Box::new(self),
            delay,
        })
    }

    /// The conflict this action concerns, if any.
    pub fn tag(&self) -> Option<ConflictTag> {
        match self {
            TempoAction::RaiseConflict(a) => Some(a.tag),
            TempoAction::ResolveConflict(a) => Some(a.tag),
            TempoAction::RequestSampling(a) => Some(a.tag),
            TempoAction::SamplingComplete(a) => Some(a.tag),
            TempoAction::ConflictResolved(a) => Some(a.tag),
            TempoAction::ConflictAborted(a) => Some(a.tag),
            TempoAction::Schedule(a) => a.action.tag(),
        }
    }
}

impl fmt::Display for ActionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ActionKind::RaiseConflict => "raise_conflict",
            ActionKind::ResolveConflict => "resolve_conflict",
            ActionKind::RequestSampling => "request_sampling",
            ActionKind::SamplingComplete => "sampling_complete",
            ActionKind::ConflictResolved => "conflict_resolved",
            ActionKind::ConflictAborted => "conflict_aborted",
            ActionKind::Schedule => "schedule",
        };
        f.write_str(name)
    }
}

impl From<RaiseConflictAction> for TempoAction {
    fn from(a: RaiseConflictAction) -> Self {
        TempoAction::RaiseConflict(a)
    }
}

impl From<ResolveConflictAction> for TempoAction {
    fn from(a: ResolveConflictAction) -> Self {
        TempoAction::ResolveConflict(a)
    }
}

impl From<RequestSamplingAction> for TempoAction {
    fn from(a: RequestSamplingAction) -> Self {
        TempoAction::RequestSampling(a)
    }
}

impl From<SamplingCompleteAction> for TempoAction {
    fn from(a: SamplingCompleteAction) -> Self {
        TempoAction::SamplingComplete(a)
    }
}

impl From<ConflictResolvedAction> for TempoAction {
    fn from(a: ConflictResolvedAction) -> Self {
        TempoAction::ConflictResolved(a)
    }
}

impl From<ConflictAbortedAction> for TempoAction {
    fn from(a: ConflictAbortedAction) -> Self {
        TempoAction::ConflictAborted(a)
    }
}
