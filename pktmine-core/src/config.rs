use pktmine_stratum::PoolConfig;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Search loop tuning.
///
/// Neither value is correctness-relevant: the batch size bounds how long a
/// batch runs before a fresh randomized start nonce, the yield interval
/// bounds how long the loop can hold the executor and how fast it notices
/// cancellation.
#[derive(Debug, Clone, Copy, Serialize, Deserialize)]
pub struct SchedulerConfig {
    /// Nonces enumerated per batch
    #[serde(default = "default_batch_size")]
    pub batch_size: u32,

    /// Iterations between yields / cancellation checks
    #[serde(default = "default_yield_interval")]
    pub yield_interval: u32,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            batch_size: default_batch_size(),
            yield_interval: default_yield_interval(),
        }
    }
}

/// Top-level miner configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MinerConfig {
    /// Pool connection settings
    pub pool: PoolConfig,

    /// Operator identity the ledger accounts under
    pub user_id: String,

    /// Search loop tuning
    #[serde(default)]
    pub scheduler: SchedulerConfig,

    /// Stats snapshot cadence
    #[serde(default = "default_stats_interval")]
    pub stats_interval: Duration,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            pool: PoolConfig::default(),
            user_id: String::new(),
            scheduler: SchedulerConfig::default(),
            stats_interval: default_stats_interval(),
        }
    }
}

// Default value functions for serde
fn default_batch_size() -> u32 {
    100_000
}
fn default_yield_interval() -> u32 {
    100
}
fn default_stats_interval() -> Duration {
    Duration::from_secs(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = MinerConfig::default();
        assert_eq!(config.scheduler.batch_size, 100_000);
        assert_eq!(config.scheduler.yield_interval, 100);
        assert_eq!(config.stats_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_partial_deserialization_fills_defaults() {
        let config: MinerConfig = serde_json::from_value(serde_json::json!({
            "pool": {
                "url": "pool.example.com:3333",
                "payout_address": "pkt1qexample"
            },
            "user_id": "operator1"
        }))
        .unwrap();
        assert_eq!(config.user_id, "operator1");
        assert_eq!(config.scheduler.yield_interval, 100);
    }
}
