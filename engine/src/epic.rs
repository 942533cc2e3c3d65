//! Epic and reducer contracts.

use crate::action::TempoAction;
use crate::state::{Conflict, ConflictsState, StateBundle, StateKind};
use crate::TempoError;

/// A pure reaction to actions.
///
/// Epics never mutate state; they return follow-up actions. Kinds an epic
/// does not care about yield `Ok(vec![])`.
pub trait TempoEpic: Send + Sync {
    fn name(&self) -> &'static str;

    /// State slices this epic reads. The engine snapshots exactly these.
    fn required_state(&self) -> &'static [StateKind] {
        &[]
    }

    fn epic(
        &self,
        bundle: &StateBundle,
        action: &TempoAction,
    ) -> Result<Vec<TempoAction>, TempoError>;
}

/// Applies an action to engine-owned state.
pub trait TempoReducer: Send + Sync {
    fn reduce(&self, conflicts: &mut ConflictsState, action: &TempoAction);
}

/// Tracks which conflicts are pending.
///
/// A raised conflict becomes pending (unless its tag already is) and stays
/// so until resolved or aborted.
#[derive(Debug, Default)]
pub struct ConflictsReducer;

impl TempoReducer for ConflictsReducer {
    fn reduce(&self, conflicts: &mut ConflictsState, action: &TempoAction) {
        match action {
            TempoAction::RaiseConflict(raise) => {
                if conflicts.insert(Conflict::new(
                    raise.tag,
                    &raise.atom,
                    &raise.conflicting_atoms,
                )) {
                    tracing::debug!(tag = %raise.tag, candidates = raise.conflicting_atoms.len() + 1, "conflict pending");
                }
            }
            TempoAction::ConflictResolved(resolved) => {
                if conflicts.remove(&resolved.tag).is_some() {
                    tracing::debug!(tag = %resolved.tag, winner = %resolved.winner, "conflict cleared");
                }
            }
            TempoAction::ConflictAborted(aborted) => {
                if conflicts.remove(&aborted.tag).is_some() {
                    tracing::debug!(tag = %aborted.tag, cause = %aborted.cause, "conflict aborted");
                }
            }
            _ => {}
        }
    }
}
