use thiserror::Error;

/// Durable store error types
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("store unreachable: {0}")]
    Unavailable(String),

    #[error("store operation timed out")]
    Timeout,

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),
}

/// Ledger error types
///
/// Nothing here is fatal to the worker: persistence failures are warnings
/// and the in-memory counters keep advancing.
#[derive(Error, Debug)]
pub enum LedgerError {
    #[error("failed to start session: {0}")]
    SessionStart(StoreError),

    #[error("a session is already active")]
    SessionActive,

    #[error("session already ended")]
    AlreadyEnded,

    #[error("persistence degraded: {0}")]
    Persistence(#[from] StoreError),
}

pub type Result<T> = std::result::Result<T, LedgerError>;
