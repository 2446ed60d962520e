//! Periodic stats aggregation
//!
//! Owns no state of its own: every tick reads the session state watch,
//! the scheduler counters and the ledger totals, derives the windowed
//! hashrate, and emits one immutable snapshot. Also pushes the periodic
//! observability overwrite of the session document.

use crate::events::{MinerEvent, StatsSnapshot};
use crate::scheduler::SchedulerCounters;
use chrono::Utc;
use pktmine_ledger::RewardLedger;
use pktmine_stratum::SessionState;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{mpsc, watch};
use tokio::time::{interval, MissedTickBehavior};
use tracing::{debug, warn};

/// Build one snapshot from the current component readings.
pub fn build_snapshot(
    counters: &SchedulerCounters,
    ledger: &RewardLedger,
    connection: SessionState,
    started_at: Option<Instant>,
    hashrate: f64,
) -> StatsSnapshot {
    let uptime_secs = started_at.map(|t| t.elapsed().as_secs()).unwrap_or(0);
    let session = ledger.current_session_stats().unwrap_or_default();

    // Guard the rate against a zero uptime
    let shares_per_hour = if uptime_secs > 0 {
        session.shares_accepted as f64 / (uptime_secs as f64 / 3600.0)
    } else {
        0.0
    };

    StatsSnapshot {
        timestamp: Utc::now(),
        connection,
        hashrate,
        uptime_secs,
        shares_found: counters.shares_found.load(Ordering::Relaxed),
        shares_accepted: session.shares_accepted,
        shares_rejected: session.shares_rejected,
        digest_errors: counters.digest_errors.load(Ordering::Relaxed),
        pool_errors: session.error_count,
        shares_per_hour,
        totals: ledger.totals(),
    }
}

/// The reporting task
pub struct StatsReporter {
    pub(crate) interval: Duration,
    pub(crate) counters: Arc<SchedulerCounters>,
    pub(crate) ledger: Arc<RewardLedger>,
    pub(crate) state_rx: watch::Receiver<SessionState>,
    pub(crate) running: Arc<AtomicBool>,
    pub(crate) events_tx: mpsc::Sender<MinerEvent>,
    pub(crate) started_at: Instant,
}

impl StatsReporter {
    /// Emit snapshots until the running flag drops.
    pub async fn run(self) {
        let mut ticker = interval(self.interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        // The first tick fires immediately; skip it so the first window
        // has a real duration.
        ticker.tick().await;

        let mut last_hashes = self.counters.hashes.load(Ordering::Relaxed);
        let mut last_tick = Instant::now();

        loop {
            ticker.tick().await;
            if !self.running.load(Ordering::SeqCst) {
                break;
            }

            let now = Instant::now();
            let hashes = self.counters.hashes.load(Ordering::Relaxed);
            let window = now.duration_since(last_tick).as_secs_f64();
            let hashrate = if window > 0.0 {
                hashes.saturating_sub(last_hashes) as f64 / window
            } else {
                0.0
            };
            last_hashes = hashes;
            last_tick = now;

            let snapshot = build_snapshot(
                &self.counters,
                &self.ledger,
                *self.state_rx.borrow(),
                Some(self.started_at),
                hashrate,
            );

            // Snapshots are droppable; a slow consumer must not stall us
            if self.events_tx.try_send(MinerEvent::StatsUpdate(snapshot)).is_err() {
                debug!("Stats receiver not keeping up, snapshot dropped");
            }

            if let Err(e) = self.ledger.update_session_stats().await {
                warn!("Session stats persistence degraded: {}", e);
            }
        }
        debug!("Stats reporter stopped");
    }
}
