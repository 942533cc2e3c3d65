use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("vertex is not signed")]
    Unsigned,

    #[error("invalid vertex signature by {0}")]
    InvalidSignature(String),

    #[error("clock of {owner} does not increase: {previous} then {clock}")]
    ClockNotIncreasing {
        owner: String,
        previous: u64,
        clock: u64,
    },

    #[error("vertex at clock {clock} does not reference its predecessor")]
    BrokenChain { clock: u64 },

    #[error("vertices have different owners")]
    MixedOwners,
}
