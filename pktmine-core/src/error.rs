use pktmine_ledger::LedgerError;
use pktmine_stratum::PoolError;
use thiserror::Error;

/// Orchestrator error types
#[derive(Error, Debug)]
pub enum MinerError {
    #[error("miner is already running")]
    AlreadyRunning,

    #[error(transparent)]
    Pool(#[from] PoolError),

    #[error(transparent)]
    Ledger(#[from] LedgerError),
}

pub type Result<T> = std::result::Result<T, MinerError>;
