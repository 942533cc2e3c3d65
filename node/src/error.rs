use thiserror::Error;

#[derive(Debug, Error)]
pub enum NodeError {
    #[error("tempo error: {0}")]
    Tempo(#[from] tempo_engine::TempoError),

    #[error("store error: {0}")]
    Store(#[from] tempo_store::StoreError),

    #[error("LMDB error: {0}")]
    Lmdb(#[from] tempo_store_lmdb::LmdbError),

    #[error("message error: {0}")]
    Message(#[from] tempo_messages::MessageError),

    #[error("metrics error: {0}")]
    Metrics(#[from] prometheus::Error),

    #[error("config error: {0}")]
    Config(String),

    #[error("logging error: {0}")]
    Logging(String),

    #[error("node is closed")]
    Closed,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}
