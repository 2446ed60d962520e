//! The reward accounting engine
//!
//! Tracks found/accepted/rejected share events against the current session
//! and the operator's lifetime totals. The in-memory counters are the
//! source of truth for display; the durable store trails them through
//! atomic increments and periodic overwrites, and a store outage degrades
//! persistence without ever losing local visibility.

use crate::error::{LedgerError, Result, StoreError};
use crate::session::{
    SessionConfig, SessionFinalStats, SessionRecord, SessionStats, SessionStatus, SessionSummary,
    UserTotals,
};
use crate::store::CounterStore;
use chrono::Utc;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};
use uuid::Uuid;

/// Reward credited per accepted share, in reward units.
///
/// This ratio is policy, not derived. Every total in the ledger is
/// computed from this one constant so session and lifetime figures
/// cannot drift apart.
pub const REWARD_PER_SHARE: f64 = 0.1;

struct ActiveSession {
    id: String,
    started_at: chrono::DateTime<Utc>,
    started: Instant,
    config: SessionConfig,
    shares_found: AtomicU64,
    shares_accepted: AtomicU64,
    shares_rejected: AtomicU64,
    errors: AtomicU64,
}

impl ActiveSession {
    fn stats(&self, duration_secs: u64) -> SessionStats {
        let accepted = self.shares_accepted.load(Ordering::Relaxed);
        SessionStats {
            duration_secs,
            shares_found: self.shares_found.load(Ordering::Relaxed),
            shares_accepted: accepted,
            shares_rejected: self.shares_rejected.load(Ordering::Relaxed),
            reward_units_earned: accepted as f64 * REWARD_PER_SHARE,
            error_count: self.errors.load(Ordering::Relaxed),
        }
    }
}

/// Lifetime counters mirrored in memory.
///
/// These advance even while the store is unreachable, so the operator
/// never loses sight of earned rewards; reward units and acceptance rate
/// are derived on read, never accumulated.
#[derive(Default)]
struct LifetimeCounters {
    shares_found: AtomicU64,
    shares_accepted: AtomicU64,
    active_secs: AtomicU64,
    sessions_completed: AtomicU64,
}

/// The accounting engine
pub struct RewardLedger {
    store: Arc<dyn CounterStore>,
    user_id: String,
    current: RwLock<Option<Arc<ActiveSession>>>,
    lifetime: LifetimeCounters,
    seen_submissions: Mutex<HashSet<u64>>,
}

impl RewardLedger {
    /// Create the ledger and hydrate lifetime totals from the store.
    ///
    /// A missing user document is bootstrapped; an unreachable store is a
    /// warning and the ledger starts from zeroed local counters.
    pub async fn new(store: Arc<dyn CounterStore>, user_id: impl Into<String>) -> Self {
        let ledger = Self {
            store,
            user_id: user_id.into(),
            current: RwLock::new(None),
            lifetime: LifetimeCounters::default(),
            seen_submissions: Mutex::new(HashSet::new()),
        };
        ledger.hydrate().await;
        ledger
    }

    fn user_key(&self) -> String {
        format!("users/{}", self.user_id)
    }

    fn session_key(session_id: &str) -> String {
        format!("sessions/{}", session_id)
    }

    async fn hydrate(&self) {
        match self.store.get_doc(&self.user_key()).await {
            Ok(Some(doc)) => match serde_json::from_value::<UserTotals>(doc) {
                Ok(totals) => {
                    self.lifetime
                        .shares_found
                        .store(totals.total_shares_found, Ordering::Relaxed);
                    self.lifetime
                        .shares_accepted
                        .store(totals.total_shares_accepted, Ordering::Relaxed);
                    self.lifetime
                        .active_secs
                        .store(totals.total_active_secs, Ordering::Relaxed);
                    self.lifetime
                        .sessions_completed
                        .store(totals.sessions_completed, Ordering::Relaxed);
                    info!(
                        "Loaded lifetime totals for {}: {} shares accepted",
                        self.user_id, totals.total_shares_accepted
                    );
                }
                Err(e) => warn!("Malformed user totals document: {}", e),
            },
            Ok(None) => {
                debug!("No totals for {}, bootstrapping", self.user_id);
                if let Err(e) = self.persist_totals().await {
                    warn!("Failed to bootstrap user totals: {}", e);
                }
            }
            Err(e) => warn!("Failed to load user totals: {}", e),
        }
    }

    /// Current lifetime totals snapshot
    pub fn totals(&self) -> UserTotals {
        let found = self.lifetime.shares_found.load(Ordering::Relaxed);
        let accepted = self.lifetime.shares_accepted.load(Ordering::Relaxed);
        UserTotals {
            total_shares_found: found,
            total_shares_accepted: accepted,
            total_reward_units: accepted as f64 * REWARD_PER_SHARE,
            total_active_secs: self.lifetime.active_secs.load(Ordering::Relaxed),
            sessions_completed: self.lifetime.sessions_completed.load(Ordering::Relaxed),
            acceptance_rate: if found > 0 {
                accepted as f64 / found as f64 * 100.0
            } else {
                0.0
            },
        }
    }

    /// Id of the active session, if any
    pub fn current_session_id(&self) -> Option<String> {
        self.current.read().as_ref().map(|s| s.id.clone())
    }

    /// Stats of the active session, if any
    pub fn current_session_stats(&self) -> Option<SessionStats> {
        let session = self.current.read().clone();
        session.map(|s| s.stats(s.started.elapsed().as_secs()))
    }

    /// Open a new Active session and persist its record.
    ///
    /// Fails with `SessionStart` when the store is unreachable; the caller
    /// may keep operating with local-only accounting, but no session id is
    /// fabricated.
    pub async fn start_session(&self, config: SessionConfig) -> Result<String> {
        if self.current.read().is_some() {
            return Err(LedgerError::SessionActive);
        }

        let session = Arc::new(ActiveSession {
            id: Uuid::new_v4().to_string(),
            started_at: Utc::now(),
            started: Instant::now(),
            config,
            shares_found: AtomicU64::new(0),
            shares_accepted: AtomicU64::new(0),
            shares_rejected: AtomicU64::new(0),
            errors: AtomicU64::new(0),
        });

        let record = self.record_for(&session, SessionStatus::Active, session.stats(0), None);
        let doc = serde_json::to_value(&record)
            .map_err(|e| LedgerError::SessionStart(StoreError::Serialization(e)))?;
        self.store
            .set_doc(&Self::session_key(&session.id), doc)
            .await
            .map_err(LedgerError::SessionStart)?;

        let id = session.id.clone();
        *self.current.write() = Some(session);
        info!("Session started: {}", id);
        Ok(id)
    }

    /// Record a found share against the session and lifetime counters.
    ///
    /// Counted the instant a qualifying digest is located, regardless of
    /// what happens to the submission afterwards.
    pub async fn record_share_found(&self) -> Result<()> {
        self.lifetime.shares_found.fetch_add(1, Ordering::Relaxed);
        let session = self.current.read().clone();
        if let Some(session) = &session {
            session.shares_found.fetch_add(1, Ordering::Relaxed);
        }

        self.store
            .increment(&self.user_key(), "total_shares_found", 1.0)
            .await?;
        if let Some(session) = &session {
            self.store
                .increment(&Self::session_key(&session.id), "stats.shares_found", 1.0)
                .await?;
        }
        Ok(())
    }

    /// Credit an accepted share and return the post-increment totals.
    ///
    /// The submission id is the dedup key: a replayed outcome for the same
    /// submission is a no-op, so at-least-once delivery of outcomes (or a
    /// store retry) never double-credits.
    pub async fn record_share_accepted(&self, submission_id: u64) -> Result<UserTotals> {
        if !self.seen_submissions.lock().insert(submission_id) {
            debug!("Duplicate accepted outcome for submission {}", submission_id);
            return Ok(self.totals());
        }

        self.lifetime.shares_accepted.fetch_add(1, Ordering::Relaxed);
        let session = self.current.read().clone();
        if let Some(session) = &session {
            session.shares_accepted.fetch_add(1, Ordering::Relaxed);
        }
        let totals = self.totals();

        self.store
            .increment(&self.user_key(), "total_shares_accepted", 1.0)
            .await?;
        self.store
            .increment(&self.user_key(), "total_reward_units", REWARD_PER_SHARE)
            .await?;
        if let Some(session) = &session {
            let key = Self::session_key(&session.id);
            self.store
                .increment(&key, "stats.shares_accepted", 1.0)
                .await?;
            self.store
                .increment(&key, "stats.reward_units_earned", REWARD_PER_SHARE)
                .await?;
        }
        Ok(totals)
    }

    /// Record a rejected share against the session counters.
    pub fn record_share_rejected(&self) {
        if let Some(session) = self.current.read().as_ref() {
            session.shares_rejected.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Record a recoverable error against the session counters.
    pub fn record_error(&self) {
        if let Some(session) = self.current.read().as_ref() {
            session.errors.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Periodic observability overwrite of the session document.
    ///
    /// Non-incremental: the live counters are written as-is, so this can
    /// never double-count relative to the increment paths above.
    pub async fn update_session_stats(&self) -> Result<()> {
        let Some(session) = self.current.read().clone() else {
            return Ok(());
        };
        let stats = session.stats(session.started.elapsed().as_secs());
        let record = self.record_for(&session, SessionStatus::Active, stats, None);
        let doc = serde_json::to_value(&record).map_err(StoreError::Serialization)?;
        self.store
            .set_doc(&Self::session_key(&session.id), doc)
            .await?;
        Ok(())
    }

    /// Complete the session and fold it into the lifetime totals.
    ///
    /// Found/accepted counts were already folded incrementally; this adds
    /// the session duration and the completed-session count, recomputes
    /// the acceptance rate, and finalizes the session document. A second
    /// call for the same session reports `AlreadyEnded` and changes
    /// nothing.
    pub async fn end_session(&self, final_stats: SessionFinalStats) -> Result<SessionSummary> {
        let Some(session) = self.current.write().take() else {
            return Err(LedgerError::AlreadyEnded);
        };
        let key = Self::session_key(&session.id);

        // Guard against a retried call racing a crash: a record already
        // marked completed must not be credited again.
        if let Ok(Some(doc)) = self.store.get_doc(&key).await {
            if doc.get("status").and_then(Value::as_str) == Some("completed") {
                warn!("Session {} was already completed", session.id);
                return Err(LedgerError::AlreadyEnded);
            }
        }

        self.lifetime
            .active_secs
            .fetch_add(final_stats.uptime_secs, Ordering::Relaxed);
        self.lifetime.sessions_completed.fetch_add(1, Ordering::Relaxed);

        let stats = SessionStats {
            duration_secs: final_stats.uptime_secs,
            shares_found: final_stats.shares_found,
            shares_accepted: final_stats.shares_accepted,
            shares_rejected: final_stats.shares_rejected,
            reward_units_earned: final_stats.shares_accepted as f64 * REWARD_PER_SHARE,
            error_count: final_stats.errors,
        };
        let summary = SessionSummary {
            session_id: session.id.clone(),
            duration_secs: stats.duration_secs,
            shares_accepted: stats.shares_accepted,
            reward_units_earned: stats.reward_units_earned,
        };

        let record = self.record_for(&session, SessionStatus::Completed, stats, Some(Utc::now()));
        let doc = serde_json::to_value(&record).map_err(StoreError::Serialization)?;
        self.store.set_doc(&key, doc).await?;
        self.store
            .increment(&self.user_key(), "sessions_completed", 1.0)
            .await?;
        self.store
            .increment(
                &self.user_key(),
                "total_active_secs",
                final_stats.uptime_secs as f64,
            )
            .await?;
        self.persist_totals().await?;

        info!(
            "Session {} completed: {} shares accepted, {} reward units",
            summary.session_id, summary.shares_accepted, summary.reward_units_earned
        );
        Ok(summary)
    }

    /// Rewrite the user document with the derived fields in sync.
    async fn persist_totals(&self) -> Result<()> {
        let doc = serde_json::to_value(self.totals()).map_err(StoreError::Serialization)?;
        self.store.set_doc(&self.user_key(), doc).await?;
        Ok(())
    }

    fn record_for(
        &self,
        session: &ActiveSession,
        status: SessionStatus,
        stats: SessionStats,
        ended_at: Option<chrono::DateTime<Utc>>,
    ) -> SessionRecord {
        SessionRecord {
            session_id: session.id.clone(),
            user_id: self.user_id.clone(),
            started_at: session.started_at,
            ended_at,
            status,
            config: session.config.clone(),
            stats,
        }
    }
}
