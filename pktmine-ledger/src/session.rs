//! Session and totals documents persisted by the ledger

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Session lifecycle status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Active,
    Completed,
}

/// Configuration recorded with a session for later inspection
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SessionConfig {
    #[serde(default)]
    pub pool_url: String,
    #[serde(default)]
    pub worker_name: String,
}

/// Live counters for one mining session
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionStats {
    pub duration_secs: u64,
    pub shares_found: u64,
    pub shares_accepted: u64,
    pub shares_rejected: u64,
    pub reward_units_earned: f64,
    pub error_count: u64,
}

/// Durable session document, keyed by session id
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionRecord {
    pub session_id: String,
    pub user_id: String,
    pub started_at: DateTime<Utc>,
    pub ended_at: Option<DateTime<Utc>>,
    pub status: SessionStatus,
    pub config: SessionConfig,
    pub stats: SessionStats,
}

/// Lifetime accumulated totals for one operator.
///
/// Monotonic except `acceptance_rate`, which is recomputed (in percent)
/// whenever the underlying counts move. `total_reward_units` is always
/// `total_shares_accepted * REWARD_PER_SHARE`, never accumulated
/// separately.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct UserTotals {
    pub total_shares_found: u64,
    pub total_shares_accepted: u64,
    pub total_reward_units: f64,
    pub total_active_secs: u64,
    pub sessions_completed: u64,
    pub acceptance_rate: f64,
}

/// Final statistics handed to `end_session`
#[derive(Debug, Clone, Copy, Default)]
pub struct SessionFinalStats {
    pub uptime_secs: u64,
    pub shares_found: u64,
    pub shares_accepted: u64,
    pub shares_rejected: u64,
    pub errors: u64,
}

/// Summary returned once a session is completed
#[derive(Debug, Clone)]
pub struct SessionSummary {
    pub session_id: String,
    pub duration_secs: u64,
    pub shares_accepted: u64,
    pub reward_units_earned: f64,
}
