use thiserror::Error;

/// Pool client error types
#[derive(Error, Debug)]
pub enum PoolError {
    #[error("transport error: {0}")]
    Transport(String),

    #[error("protocol error: {0}")]
    Protocol(String),

    #[error("authorization failed: {0}")]
    Authorization(String),

    #[error("timeout waiting for response")]
    Timeout,

    #[error("not connected to pool")]
    NotConnected,

    #[error("stale work unit: {job_id}")]
    StaleWork { job_id: String },

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid configuration: {0}")]
    InvalidConfiguration(String),
}

pub type Result<T> = std::result::Result<T, PoolError>;
