use thiserror::Error;

#[derive(Debug, Error)]
pub enum MessageError {
    #[error("message too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("incomplete frame: need {needed} bytes, have {available}")]
    Incomplete { needed: usize, available: usize },

    #[error("malformed message: {0}")]
    Malformed(String),

    #[error("peer {0} is unreachable")]
    Unreachable(String),

    #[error("messenger is closed")]
    Closed,
}

impl From<bincode::Error> for MessageError {
    fn from(e: bincode::Error) -> Self {
        MessageError::Malformed(e.to_string())
    }
}
