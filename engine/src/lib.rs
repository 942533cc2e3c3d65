//! The Tempo dispatch engine.
//!
//! Actions flow through a list of [`TempoEpic`]s, each of which reads an
//! immutable [`StateBundle`] and returns follow-up actions. State mutation
//! belongs to [`TempoReducer`]s, which run once every epic has seen an
//! action. Delays are expressed as [`TempoAction::Schedule`] and handed to
//! the injected [`Scheduler`](tempo_utils::Scheduler).

pub mod action;
pub mod epic;
pub mod error;
pub mod state;
pub mod tempo;

pub use action::{
    ActionKind, ConflictAbortedAction, ConflictResolvedAction, RaiseConflictAction, RequestSamplingAction,
    ResolveConflictAction, SamplingCompleteAction, ScheduleAction, TempoAction,
};
pub use epic::{ConflictsReducer, TempoEpic, TempoReducer};
pub use error::TempoError;
pub use state::{
    Conflict, ConflictsState, LivePeersState, LivePeersView, StateBundle, StateKind,
};
pub use tempo::{
    ActionListener, DispatchReport, EpicFailure, Tempo, TempoBuilder, TempoHandle,
};
