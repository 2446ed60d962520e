//! Pool session state machine
//!
//! Owns the persistent connection and the subscribe/authorize/notify/
//! set-difficulty/submit exchange. Transport failure from any connected
//! state moves to `Reconnecting`; after the backoff delay the handshake is
//! redone from scratch. Authorization failure is recorded and surfaced but
//! never fatal. Shutdown closes the transport without scheduling a
//! reconnect.

use crate::config::PoolConfig;
use crate::connection::Connection;
use crate::error::{PoolError, Result};
use crate::feed::{WorkAssignment, WorkFeed};
use crate::protocol::{
    methods, Candidate, ShareOutcome, StratumNotification, StratumRequest, SubscribeResult,
    SUBMIT_ID_FLOOR,
};
use backoff::backoff::Backoff;
use backoff::{ExponentialBackoff, ExponentialBackoffBuilder};
use pktmine_hash::Difficulty;
use serde::Serialize;
use serde_json::Value;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, watch, Notify, RwLock};
use tokio::time::sleep;
use tracing::{debug, error, info, warn};

/// Connection lifecycle states
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionState {
    Disconnected,
    Connecting,
    Subscribed,
    Authorized,
    Working,
    Reconnecting,
}

/// Events emitted by the session for the orchestrating caller
#[derive(Debug, Clone)]
pub enum PoolEvent {
    Connected,
    Subscribed {
        subscription_id: Option<String>,
    },
    Authorized,
    AuthorizationFailed {
        reason: String,
    },
    NewWork {
        job_id: String,
        generation: u64,
        clean_jobs: bool,
    },
    DifficultyChanged(Difficulty),
    ShareOutcome {
        submission_id: u64,
        outcome: ShareOutcome,
        reason: Option<String>,
    },
    TransportError {
        detail: String,
    },
    Reconnecting {
        delay: Duration,
    },
    Closed,
}

/// The pool protocol client
pub struct PoolSession {
    config: Arc<PoolConfig>,
    feed: Arc<WorkFeed>,
    events_tx: mpsc::Sender<PoolEvent>,
    state_tx: watch::Sender<SessionState>,
    running: AtomicBool,
    shutdown: Notify,
    submission_ids: AtomicU64,
    generations: AtomicU64,
    error_count: Arc<AtomicU64>,
    conn: RwLock<Option<Connection>>,
    extranonce: RwLock<Vec<u8>>,
}

impl PoolSession {
    /// Create a session around a shared work feed.
    ///
    /// Returns the session, its event stream, and a watch on the
    /// connection state. Call `run` on a task to drive it.
    pub fn new(
        config: PoolConfig,
        feed: Arc<WorkFeed>,
    ) -> (
        Arc<Self>,
        mpsc::Receiver<PoolEvent>,
        watch::Receiver<SessionState>,
    ) {
        let (events_tx, events_rx) = mpsc::channel(256);
        let (state_tx, state_rx) = watch::channel(SessionState::Disconnected);

        let session = Arc::new(Self {
            config: Arc::new(config),
            feed,
            events_tx,
            state_tx,
            running: AtomicBool::new(true),
            shutdown: Notify::new(),
            submission_ids: AtomicU64::new(SUBMIT_ID_FLOOR + 1),
            generations: AtomicU64::new(0),
            error_count: Arc::new(AtomicU64::new(0)),
            conn: RwLock::new(None),
            extranonce: RwLock::new(Vec::new()),
        });

        (session, events_rx, state_rx)
    }

    /// Total errors recorded (transport, protocol, authorization)
    pub fn error_count(&self) -> u64 {
        self.error_count.load(Ordering::Relaxed)
    }

    /// Is the session still supposed to be running?
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Current connection state
    pub fn state(&self) -> SessionState {
        *self.state_tx.borrow()
    }

    /// Drive the session until shutdown: connect, handshake, serve,
    /// and reconnect with backoff on transport failure.
    pub async fn run(self: Arc<Self>) {
        // Randomization off keeps the delay sequence deterministic
        let mut backoff = ExponentialBackoffBuilder::new()
            .with_initial_interval(self.config.reconnect_backoff)
            .with_max_interval(self.config.max_reconnect_backoff)
            .with_multiplier(2.0)
            .with_randomization_factor(0.0)
            .with_max_elapsed_time(None)
            .build();

        while self.is_running() {
            match self.connect_and_serve(&mut backoff).await {
                Ok(()) => break,
                Err(e @ PoolError::InvalidConfiguration(_)) => {
                    error!("{}", e);
                    self.emit(PoolEvent::TransportError {
                        detail: e.to_string(),
                    })
                    .await;
                    break;
                }
                Err(e) => {
                    // Tear down whatever is left of the failed connection
                    let conn = self.conn.write().await.take();
                    if let Some(conn) = conn {
                        conn.close();
                    }
                    self.feed.clear();
                    if !self.is_running() {
                        break;
                    }
                    self.error_count.fetch_add(1, Ordering::Relaxed);
                    warn!("Pool connection lost: {}", e);
                    self.emit(PoolEvent::TransportError {
                        detail: e.to_string(),
                    })
                    .await;

                    let delay = backoff
                        .next_backoff()
                        .unwrap_or(self.config.max_reconnect_backoff);
                    self.set_state(SessionState::Reconnecting);
                    info!("Reconnecting in {:?}", delay);
                    self.emit(PoolEvent::Reconnecting { delay }).await;

                    tokio::select! {
                        _ = sleep(delay) => {}
                        _ = self.shutdown.notified() => break,
                    }
                }
            }
        }

        let conn = self.conn.write().await.take();
        if let Some(conn) = conn {
            conn.close();
        }
        self.feed.clear();
        self.set_state(SessionState::Disconnected);
        self.emit(PoolEvent::Closed).await;
        info!("Pool session closed");
    }

    /// One connection lifetime: dial, handshake, serve notifications.
    ///
    /// Returns Ok on clean shutdown, Err on transport failure. Every
    /// reconnect passes through here again, so subscription and
    /// authorization are always redone from scratch.
    async fn connect_and_serve(&self, backoff: &mut ExponentialBackoff) -> Result<()> {
        self.set_state(SessionState::Connecting);
        let (host, port) = self.config.parse_url()?;

        let (notification_tx, mut notification_rx) = mpsc::channel(64);
        info!("Connecting to pool {}:{}", host, port);
        let conn = Connection::open(
            &host,
            port,
            self.config.connection_timeout,
            notification_tx,
            self.error_count.clone(),
        )
        .await?;
        *self.conn.write().await = Some(conn.clone());
        self.emit(PoolEvent::Connected).await;

        // Subscribe (id 1)
        let response = conn
            .request(
                StratumRequest::subscribe(&self.config.user_agent),
                self.config.response_timeout,
            )
            .await?;
        if let Some(rpc_error) = response.error {
            return Err(PoolError::Protocol(format!(
                "subscribe rejected: {}",
                rpc_error.message
            )));
        }
        let subscribe = SubscribeResult::from_response(response.result.as_ref());
        *self.extranonce.write().await = subscribe.extranonce.clone();
        self.set_state(SessionState::Subscribed);
        info!("Subscribed to pool");
        self.emit(PoolEvent::Subscribed {
            subscription_id: subscribe.subscription_id,
        })
        .await;
        backoff.reset();

        // Authorize (id 2) — failure is reported but not fatal; the pool
        // may retry us and notifications still flow while Subscribed.
        let authorize = StratumRequest::authorize(
            &self.config.payout_address,
            &self.config.worker_name,
        );
        match conn.request(authorize, self.config.response_timeout).await {
            Ok(response) => {
                let authorized = response.error.is_none()
                    && response
                        .result
                        .as_ref()
                        .and_then(Value::as_bool)
                        .unwrap_or(false);
                if authorized {
                    self.set_state(SessionState::Authorized);
                    info!("Worker authorized");
                    self.emit(PoolEvent::Authorized).await;
                } else {
                    let reason = response
                        .error
                        .map(|e| e.message)
                        .unwrap_or_else(|| "pool rejected authorization".to_string());
                    self.error_count.fetch_add(1, Ordering::Relaxed);
                    warn!("Authorization failed: {}", reason);
                    self.emit(PoolEvent::AuthorizationFailed { reason }).await;
                }
            }
            Err(PoolError::Timeout) => {
                self.error_count.fetch_add(1, Ordering::Relaxed);
                warn!("Authorization timed out");
                self.emit(PoolEvent::AuthorizationFailed {
                    reason: "authorize timed out".to_string(),
                })
                .await;
            }
            Err(e) => return Err(e),
        }

        // Serve until the transport drops or we are shut down
        loop {
            tokio::select! {
                _ = conn.closed() => {
                    *self.conn.write().await = None;
                    self.feed.clear();
                    return Err(PoolError::Transport("connection closed".to_string()));
                }
                _ = self.shutdown.notified() => {
                    conn.close();
                    *self.conn.write().await = None;
                    return Ok(());
                }
                notification = notification_rx.recv() => match notification {
                    Some(n) => self.handle_notification(n).await,
                    None => {
                        *self.conn.write().await = None;
                        self.feed.clear();
                        return Err(PoolError::Transport("connection closed".to_string()));
                    }
                }
            }
        }
    }

    /// Handle a server-initiated notification.
    async fn handle_notification(&self, notification: StratumNotification) {
        match notification.method.as_str() {
            methods::NOTIFY => {
                match crate::protocol::WorkUnit::from_notify_params(&notification.params) {
                    Ok(unit) => {
                        let generation = self.generations.fetch_add(1, Ordering::SeqCst) + 1;
                        let difficulty = self.feed.difficulty();
                        let extranonce = self.extranonce.read().await.clone();
                        let job_id = unit.job_id.clone();
                        let clean_jobs = unit.clean_jobs;

                        info!("New work unit: {}", unit);
                        // Publishing bumps the generation, which invalidates
                        // every outstanding candidate; clean_jobs needs no
                        // extra handling beyond that fence.
                        self.feed.publish(WorkAssignment {
                            generation,
                            unit: Arc::new(unit),
                            difficulty,
                            extranonce,
                        });
                        self.set_state(SessionState::Working);
                        self.emit(PoolEvent::NewWork {
                            job_id,
                            generation,
                            clean_jobs,
                        })
                        .await;
                    }
                    Err(e) => {
                        self.error_count.fetch_add(1, Ordering::Relaxed);
                        warn!("Failed to parse work notification: {}", e);
                    }
                }
            }
            methods::SET_DIFFICULTY => {
                match notification.params.first().and_then(Value::as_f64) {
                    Some(value) => {
                        let difficulty = Difficulty::new(value);
                        info!("New difficulty: {}", difficulty);
                        self.feed.set_difficulty(difficulty);
                        self.emit(PoolEvent::DifficultyChanged(difficulty)).await;
                    }
                    None => {
                        self.error_count.fetch_add(1, Ordering::Relaxed);
                        warn!("Malformed set_difficulty params");
                    }
                }
            }
            other => {
                debug!("Ignoring notification: {}", other);
            }
        }
    }

    /// Submit a candidate.
    ///
    /// Allocates the submission id, fires the request and resolves the
    /// response into a `ShareOutcome` event without blocking the caller.
    /// A candidate from a superseded generation is refused here, whatever
    /// the callers upstream did.
    pub async fn submit(&self, candidate: Candidate) -> Result<u64> {
        let current_generation = self.feed.generation();
        if candidate.generation != current_generation {
            debug!(
                "Dropping stale candidate for job {} (generation {} != {})",
                candidate.job_id, candidate.generation, current_generation
            );
            return Err(PoolError::StaleWork {
                job_id: candidate.job_id,
            });
        }

        let conn = self
            .conn
            .read()
            .await
            .clone()
            .filter(|c| !c.is_closed())
            .ok_or(PoolError::NotConnected)?;

        let id = self.submission_ids.fetch_add(1, Ordering::SeqCst);
        let request = StratumRequest::submit(id, &self.config.payout_address, &candidate);
        info!(
            "Submitting share: job {} nonce {:08x} (id {})",
            candidate.job_id, candidate.nonce, id
        );

        let events_tx = self.events_tx.clone();
        let error_count = self.error_count.clone();
        let response_timeout = self.config.response_timeout;
        tokio::spawn(async move {
            match conn.request(request, response_timeout).await {
                Ok(response) => {
                    let accepted = response.error.is_none()
                        && response
                            .result
                            .as_ref()
                            .and_then(Value::as_bool)
                            .unwrap_or(false);
                    let reason = response.error.map(|e| e.message);
                    let outcome = if accepted {
                        info!("Share accepted (id {})", id);
                        ShareOutcome::Accepted
                    } else {
                        warn!("Share rejected (id {}): {:?}", id, reason);
                        ShareOutcome::Rejected
                    };
                    let _ = events_tx
                        .send(PoolEvent::ShareOutcome {
                            submission_id: id,
                            outcome,
                            reason,
                        })
                        .await;
                }
                Err(e) => {
                    error!("Share submission failed (id {}): {}", id, e);
                    error_count.fetch_add(1, Ordering::Relaxed);
                    let _ = events_tx
                        .send(PoolEvent::ShareOutcome {
                            submission_id: id,
                            outcome: ShareOutcome::Rejected,
                            reason: Some(e.to_string()),
                        })
                        .await;
                }
            }
        });

        Ok(id)
    }

    /// Stop the session: close the transport, suppress reconnection.
    pub async fn shutdown(&self) {
        info!("Shutting down pool session");
        self.running.store(false, Ordering::SeqCst);
        // Permit wakes the backoff sleep even if it is not waiting yet
        self.shutdown.notify_one();
        if let Some(conn) = self.conn.read().await.as_ref() {
            conn.close();
        }
    }

    fn set_state(&self, state: SessionState) {
        self.state_tx.send_replace(state);
    }

    async fn emit(&self, event: PoolEvent) {
        if self.events_tx.send(event).await.is_err() {
            debug!("Event receiver dropped");
        }
    }
}
