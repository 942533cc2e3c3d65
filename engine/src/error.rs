use tempo_messages::MessageError;
use tempo_store::StoreError;
use tempo_types::{ConflictTag, NodeId, TypesError};
use thiserror::Error;

use crate::state::StateKind;

#[derive(Debug, Error)]
pub enum TempoError {
    #[error("local store returned {commitments} commitments for {aids} atoms serving {peer}")]
    StoreCorruption {
        peer: NodeId,
        commitments: usize,
        aids: usize,
    },

    #[error("discovery response from {peer} rejected: {reason}")]
    MalformedResponse { peer: NodeId, reason: &'static str },

    #[error("no candidate of conflict {0} was witnessed by this node")]
    NoLocalWitness(ConflictTag),

    #[error("momentum of conflict {0} has no maximum")]
    MomentumUndecided(ConflictTag),

    #[error("conflict {0} is not pending")]
    UnknownConflict(ConflictTag),

    #[error("state {0:?} was not declared by the epic")]
    MissingState(StateKind),

    #[error("request queue is full ({capacity} entries)")]
    RequestQueueFull { capacity: usize },

    #[error("component is shut down")]
    ShutDown,

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("message error: {0}")]
    Message(#[from] MessageError),

    #[error("{0}")]
    Types(#[from] TypesError),
}
