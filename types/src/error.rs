use crate::AtomId;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum TypesError {
    #[error("temporal proof for {actual} cannot be merged into proof for {expected}")]
    ProofMismatch { expected: AtomId, actual: AtomId },

    #[error("serialization error: {0}")]
    Serialization(String),
}
