//! Miner orchestrator
//!
//! Wires the pool session, search scheduler, reward ledger and stats
//! reporter together behind the caller-facing `start`/`stop` API and its
//! event stream. Every component failure degrades to "keep operating,
//! report the condition"; nothing here takes the process down.

use crate::config::MinerConfig;
use crate::error::{MinerError, Result};
use crate::events::MinerEvent;
use crate::reporter::{build_snapshot, StatsReporter};
use crate::scheduler::{SchedulerCounters, SearchScheduler};
use parking_lot::{Mutex, RwLock};
use pktmine_hash::DigestEngine;
use pktmine_ledger::{
    CounterStore, LedgerError, RewardLedger, SessionConfig, SessionFinalStats,
};
use pktmine_stratum::{
    Candidate, PoolEvent, PoolSession, SessionState, ShareOutcome, WorkFeed,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

/// The long-running mining client
pub struct Miner {
    config: Arc<MinerConfig>,
    store: Arc<dyn CounterStore>,
    engine: Arc<dyn DigestEngine>,
    events_tx: mpsc::Sender<MinerEvent>,
    running: Arc<AtomicBool>,
    feed: Arc<WorkFeed>,
    counters: Arc<SchedulerCounters>,
    ledger: RwLock<Option<Arc<RewardLedger>>>,
    session: RwLock<Option<Arc<PoolSession>>>,
    state_rx: RwLock<Option<watch::Receiver<SessionState>>>,
    started_at: RwLock<Option<Instant>>,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Miner {
    /// Create a miner over an injected store and digest engine.
    ///
    /// Returns the miner and the event stream consumed by the UI/CLI
    /// collaborator.
    pub fn new(
        config: MinerConfig,
        store: Arc<dyn CounterStore>,
        engine: Arc<dyn DigestEngine>,
    ) -> (Self, mpsc::Receiver<MinerEvent>) {
        let (events_tx, events_rx) = mpsc::channel(256);

        let miner = Self {
            config: Arc::new(config),
            store,
            engine,
            events_tx,
            running: Arc::new(AtomicBool::new(false)),
            feed: Arc::new(WorkFeed::new()),
            counters: Arc::new(SchedulerCounters::default()),
            ledger: RwLock::new(None),
            session: RwLock::new(None),
            state_rx: RwLock::new(None),
            started_at: RwLock::new(None),
            tasks: Mutex::new(Vec::new()),
        };

        (miner, events_rx)
    }

    /// Start mining: open the ledger session, connect to the pool, and
    /// spin up the search and reporting tasks.
    pub async fn start(&self) -> Result<()> {
        if self.running.swap(true, Ordering::SeqCst) {
            return Err(MinerError::AlreadyRunning);
        }
        info!("Starting miner for {}", self.config.user_id);
        self.counters.reset();
        *self.started_at.write() = Some(Instant::now());

        // Reward ledger; a failed session start degrades to local-only
        // accounting, never to a fabricated session id.
        let ledger =
            Arc::new(RewardLedger::new(self.store.clone(), self.config.user_id.as_str()).await);
        let session_id = match ledger
            .start_session(SessionConfig {
                pool_url: self.config.pool.url.clone(),
                worker_name: self.config.pool.worker_name.clone(),
            })
            .await
        {
            Ok(id) => Some(id),
            Err(e) => {
                warn!("Proceeding without a durable session: {}", e);
                self.emit(MinerEvent::Error {
                    detail: e.to_string(),
                })
                .await;
                None
            }
        };
        *self.ledger.write() = Some(ledger.clone());

        // Pool session
        let (session, pool_events, state_rx) =
            PoolSession::new(self.config.pool.clone(), self.feed.clone());
        *self.session.write() = Some(session.clone());
        *self.state_rx.write() = Some(state_rx.clone());

        // Search scheduler
        let (candidate_tx, candidate_rx) = mpsc::channel(64);
        let scheduler = SearchScheduler::new(
            self.engine.clone(),
            self.feed.clone(),
            candidate_tx,
            self.counters.clone(),
            self.running.clone(),
            self.config.scheduler,
        );

        // Stats reporter
        let reporter = StatsReporter {
            interval: self.config.stats_interval,
            counters: self.counters.clone(),
            ledger: ledger.clone(),
            state_rx,
            running: self.running.clone(),
            events_tx: self.events_tx.clone(),
            started_at: Instant::now(),
        };

        let mut tasks = self.tasks.lock();
        tasks.push(tokio::spawn(session.clone().run()));
        tasks.push(tokio::spawn(scheduler.run()));
        tasks.push(tokio::spawn(Self::pump_candidates(
            candidate_rx,
            self.feed.clone(),
            session,
            ledger.clone(),
            self.events_tx.clone(),
        )));
        tasks.push(tokio::spawn(Self::pump_pool_events(
            pool_events,
            ledger,
            self.events_tx.clone(),
        )));
        tasks.push(tokio::spawn(reporter.run()));
        drop(tasks);

        self.emit(MinerEvent::Started { session_id }).await;
        info!("Miner started");
        Ok(())
    }

    /// Stop mining: halt the search loop at its next yield point, close
    /// the transport without reconnecting, complete the ledger session
    /// once, and flush a final snapshot with the hashrate zeroed.
    pub async fn stop(&self) {
        if !self.running.swap(false, Ordering::SeqCst) {
            return;
        }
        info!("Stopping miner");

        let session = self.session.write().take();
        if let Some(session) = session {
            session.shutdown().await;
        }

        let ledger = self.ledger.write().take();
        let started_at = self.started_at.write().take();
        let mut summary = None;
        if let Some(ledger) = &ledger {
            // Final snapshot while the session counters are still live
            let connection = self
                .state_rx
                .write()
                .take()
                .map(|rx| *rx.borrow())
                .unwrap_or(SessionState::Disconnected);
            let snapshot = build_snapshot(&self.counters, ledger, connection, started_at, 0.0);
            let uptime_secs = snapshot.uptime_secs;

            let session_stats = ledger.current_session_stats().unwrap_or_default();
            match ledger
                .end_session(SessionFinalStats {
                    uptime_secs,
                    shares_found: session_stats.shares_found,
                    shares_accepted: session_stats.shares_accepted,
                    shares_rejected: session_stats.shares_rejected,
                    errors: session_stats.error_count
                        + self.counters.digest_errors.load(Ordering::Relaxed),
                })
                .await
            {
                Ok(s) => summary = Some(s),
                Err(LedgerError::AlreadyEnded) => debug!("No durable session to complete"),
                Err(e) => {
                    warn!("Failed to complete session: {}", e);
                    self.emit(MinerEvent::Error {
                        detail: e.to_string(),
                    })
                    .await;
                }
            }

            self.emit(MinerEvent::StatsUpdate(snapshot)).await;
        }

        // The scheduler exits at its next yield check, the pumps drain
        // when their channels close; collect them all.
        let tasks: Vec<JoinHandle<()>> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }

        self.emit(MinerEvent::Stopped { summary }).await;
        info!("Miner stopped");
    }

    /// Is the miner currently running?
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Forward found candidates: account them the moment they exist, then
    /// hand them to the session. The generation is re-checked right before
    /// submission so a unit swap between discovery and here drops the
    /// candidate.
    async fn pump_candidates(
        mut candidate_rx: mpsc::Receiver<Candidate>,
        feed: Arc<WorkFeed>,
        session: Arc<PoolSession>,
        ledger: Arc<RewardLedger>,
        events_tx: mpsc::Sender<MinerEvent>,
    ) {
        while let Some(candidate) = candidate_rx.recv().await {
            // Found-share accounting happens before submission completes
            if let Err(e) = ledger.record_share_found().await {
                warn!("Found-share persistence degraded: {}", e);
            }
            let _ = events_tx
                .send(MinerEvent::ShareFound {
                    job_id: candidate.job_id.clone(),
                    nonce: candidate.nonce,
                    digest: candidate.digest,
                })
                .await;

            if candidate.generation != feed.generation() {
                debug!(
                    "Dropping candidate for superseded job {}",
                    candidate.job_id
                );
                continue;
            }
            match session.submit(candidate).await {
                Ok(_) => {}
                Err(pktmine_stratum::PoolError::StaleWork { job_id }) => {
                    debug!("Candidate for {} went stale before submission", job_id);
                }
                Err(e) => {
                    warn!("Share submission failed: {}", e);
                    ledger.record_error();
                    let _ = events_tx
                        .send(MinerEvent::Error {
                            detail: e.to_string(),
                        })
                        .await;
                }
            }
        }
        debug!("Candidate pump stopped");
    }

    /// Map pool events onto ledger mutations and caller events.
    async fn pump_pool_events(
        mut pool_events: mpsc::Receiver<PoolEvent>,
        ledger: Arc<RewardLedger>,
        events_tx: mpsc::Sender<MinerEvent>,
    ) {
        while let Some(event) = pool_events.recv().await {
            match event {
                PoolEvent::ShareOutcome {
                    submission_id,
                    outcome: ShareOutcome::Accepted,
                    ..
                } => {
                    let totals = match ledger.record_share_accepted(submission_id).await {
                        Ok(totals) => totals,
                        Err(e) => {
                            warn!("Accepted-share persistence degraded: {}", e);
                            let _ = events_tx
                                .send(MinerEvent::Error {
                                    detail: e.to_string(),
                                })
                                .await;
                            ledger.totals()
                        }
                    };
                    let _ = events_tx
                        .send(MinerEvent::ShareAccepted {
                            submission_id,
                            totals,
                        })
                        .await;
                }
                PoolEvent::ShareOutcome {
                    submission_id,
                    outcome: ShareOutcome::Rejected,
                    reason,
                } => {
                    ledger.record_share_rejected();
                    let _ = events_tx
                        .send(MinerEvent::ShareRejected {
                            submission_id,
                            reason,
                        })
                        .await;
                }
                PoolEvent::AuthorizationFailed { reason } => {
                    ledger.record_error();
                    let _ = events_tx
                        .send(MinerEvent::Error {
                            detail: format!("authorization failed: {}", reason),
                        })
                        .await;
                }
                PoolEvent::TransportError { detail } => {
                    ledger.record_error();
                    let _ = events_tx.send(MinerEvent::Error { detail }).await;
                }
                PoolEvent::Closed => break,
                other => debug!("Pool event: {:?}", other),
            }
        }
        debug!("Pool event pump stopped");
    }

    async fn emit(&self, event: MinerEvent) {
        if self.events_tx.send(event).await.is_err() {
            debug!("Event receiver dropped");
        }
    }
}
