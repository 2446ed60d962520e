//! Caller-facing event surface

use chrono::{DateTime, Utc};
use pktmine_hash::Hash256;
use pktmine_ledger::{SessionSummary, UserTotals};
use pktmine_stratum::SessionState;
use serde::Serialize;

/// Events delivered to the UI/CLI collaborator
#[derive(Debug, Clone)]
pub enum MinerEvent {
    /// Mining started; `session_id` is None when the ledger store was
    /// unreachable and accounting is local-only.
    Started { session_id: Option<String> },

    /// Mining stopped; the summary is present when a durable session was
    /// completed.
    Stopped { summary: Option<SessionSummary> },

    /// A qualifying digest was located (counted before submission)
    ShareFound {
        job_id: String,
        nonce: u32,
        digest: Hash256,
    },

    /// The pool accepted a share; totals are post-credit
    ShareAccepted {
        submission_id: u64,
        totals: UserTotals,
    },

    /// The pool rejected a share
    ShareRejected {
        submission_id: u64,
        reason: Option<String>,
    },

    /// Periodic stats snapshot
    StatsUpdate(StatsSnapshot),

    /// A recoverable condition worth surfacing
    Error { detail: String },
}

/// One immutable stats observation
#[derive(Debug, Clone, Serialize)]
pub struct StatsSnapshot {
    pub timestamp: DateTime<Utc>,
    pub connection: SessionState,
    pub hashrate: f64,
    pub uptime_secs: u64,
    pub shares_found: u64,
    pub shares_accepted: u64,
    pub shares_rejected: u64,
    pub digest_errors: u64,
    pub pool_errors: u64,
    pub shares_per_hour: f64,
    pub totals: UserTotals,
}
