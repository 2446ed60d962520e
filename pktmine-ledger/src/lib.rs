//! Pktmine Ledger - durable reward accounting
//!
//! Records found/accepted/rejected share events, maintains session and
//! lifetime totals, and persists both through an abstract durable counter
//! store. All operations are idempotent or safely retryable; a store
//! outage degrades persistence, never local visibility.

pub mod error;
pub mod ledger;
pub mod session;
pub mod store;

// Re-export main types
pub use error::{LedgerError, Result, StoreError};
pub use ledger::{RewardLedger, REWARD_PER_SHARE};
pub use session::{
    SessionConfig, SessionFinalStats, SessionRecord, SessionStats, SessionStatus, SessionSummary,
    UserTotals,
};
pub use store::{CounterStore, MemoryStore};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reward_constant_is_policy() {
        // One accepted share credits exactly one tenth of a reward unit
        assert_eq!(REWARD_PER_SHARE, 0.1);
        assert!(!VERSION.is_empty());
    }
}
