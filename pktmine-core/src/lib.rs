//! Pktmine Core - the mining client engine
//!
//! Ties the pool protocol client, the cooperative search scheduler and
//! the reward ledger together behind a small caller-facing API: build a
//! `Miner` over an injected durable store and digest engine, `start` it,
//! consume the `MinerEvent` stream, `stop` it.
//!
//! # Example
//!
//! ```no_run
//! use pktmine_core::{Miner, MinerConfig, MinerEvent};
//! use pktmine_hash::Sha256dEngine;
//! use pktmine_ledger::MemoryStore;
//! use pktmine_stratum::PoolConfig;
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let config = MinerConfig {
//!         pool: PoolConfig {
//!             url: "stratum+tcp://pool.example.com:3333".to_string(),
//!             payout_address: "pkt1qexampleaddress".to_string(),
//!             ..Default::default()
//!         },
//!         user_id: "operator1".to_string(),
//!         ..Default::default()
//!     };
//!
//!     let (miner, mut events) =
//!         Miner::new(config, Arc::new(MemoryStore::new()), Arc::new(Sha256dEngine));
//!     miner.start().await?;
//!
//!     // Keep draining events; accepted shares carry the updated totals
//!     while let Some(event) = events.recv().await {
//!         if let MinerEvent::ShareAccepted { totals, .. } = event {
//!             println!("{} reward units", totals.total_reward_units);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;
pub mod error;
pub mod events;
pub mod miner;
pub mod reporter;
pub mod scheduler;

// Re-export main types
pub use config::{MinerConfig, SchedulerConfig};
pub use error::{MinerError, Result};
pub use events::{MinerEvent, StatsSnapshot};
pub use miner::Miner;
pub use reporter::StatsReporter;
pub use scheduler::{SchedulerCounters, SearchScheduler};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_version() {
        assert!(!VERSION.is_empty());
    }
}
