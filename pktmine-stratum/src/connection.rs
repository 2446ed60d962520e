//! Framed transport for one pool connection
//!
//! Line-delimited JSON over TCP. A read task dispatches inbound lines by
//! id (responses) or method (notifications); a write task serializes all
//! outbound traffic onto the single socket. Malformed lines are counted
//! and dropped, never fatal.

use crate::error::{PoolError, Result};
use crate::protocol::{parse_inbound, Inbound, StratumNotification, StratumRequest, StratumResponse};
use futures::{SinkExt, StreamExt};
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::net::TcpStream;
use tokio::sync::{mpsc, oneshot, watch, Mutex};
use tokio::time::timeout;
use tokio_util::codec::{Framed, LinesCodec};
use tracing::{debug, error, warn};

type PendingMap = Arc<Mutex<HashMap<u64, oneshot::Sender<StratumResponse>>>>;

/// Handle to an open pool connection.
///
/// Cheap to clone; all clones share the same socket and pending-request
/// map. Dropping the last clone does not close the socket, `close` does.
#[derive(Clone)]
pub(crate) struct Connection {
    outbound_tx: mpsc::Sender<String>,
    pending: PendingMap,
    closed_tx: Arc<watch::Sender<bool>>,
    closed_rx: watch::Receiver<bool>,
}

impl Connection {
    /// Open the transport and start the read/write tasks.
    pub(crate) async fn open(
        host: &str,
        port: u16,
        connect_timeout: Duration,
        notification_tx: mpsc::Sender<StratumNotification>,
        protocol_errors: Arc<AtomicU64>,
    ) -> Result<Self> {
        let addr = format!("{}:{}", host, port);
        let stream = timeout(connect_timeout, TcpStream::connect(&addr))
            .await
            .map_err(|_| PoolError::Timeout)?
            .map_err(|e| PoolError::Transport(e.to_string()))?;
        stream
            .set_nodelay(true)
            .map_err(|e| PoolError::Transport(e.to_string()))?;

        let framed = Framed::new(stream, LinesCodec::new());
        let (mut sink, mut source) = framed.split::<String>();

        let (outbound_tx, mut outbound_rx) = mpsc::channel::<String>(64);
        let (closed_tx, closed_rx) = watch::channel(false);
        let closed_tx = Arc::new(closed_tx);
        let pending: PendingMap = Arc::new(Mutex::new(HashMap::new()));

        // Read task: dispatch by id or method until the stream ends
        let read_pending = pending.clone();
        let read_closed = closed_tx.clone();
        let mut read_shutdown = closed_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    item = source.next() => match item {
                        Some(Ok(line)) => {
                            debug!("Received: {}", line);
                            match parse_inbound(&line) {
                                Ok(Inbound::Response(response)) => {
                                    let sender = read_pending.lock().await.remove(&response.id);
                                    match sender {
                                        Some(tx) => {
                                            let _ = tx.send(response);
                                        }
                                        None => {
                                            warn!("Response with unexpected id {}", response.id);
                                            protocol_errors.fetch_add(1, Ordering::Relaxed);
                                        }
                                    }
                                }
                                Ok(Inbound::Notification(notification)) => {
                                    if notification_tx.send(notification).await.is_err() {
                                        break;
                                    }
                                }
                                Err(e) => {
                                    warn!("Dropping malformed message: {}", e);
                                    protocol_errors.fetch_add(1, Ordering::Relaxed);
                                }
                            }
                        }
                        Some(Err(e)) => {
                            error!("Read error: {}", e);
                            break;
                        }
                        None => {
                            debug!("Pool closed the connection");
                            break;
                        }
                    },
                    _ = read_shutdown.changed() => break,
                }
            }

            let _ = read_closed.send(true);
            // Fail anything still waiting for a response
            read_pending.lock().await.clear();
        });

        // Write task: all outbound traffic is serialized here
        let write_closed = closed_tx.clone();
        let mut write_shutdown = closed_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    request = outbound_rx.recv() => match request {
                        Some(line) => {
                            debug!("Sending: {}", line);
                            if let Err(e) = sink.send(line).await {
                                error!("Write error: {}", e);
                                break;
                            }
                        }
                        None => break,
                    },
                    _ = write_shutdown.changed() => break,
                }
            }
            let _ = write_closed.send(true);
        });

        Ok(Self {
            outbound_tx,
            pending,
            closed_tx,
            closed_rx,
        })
    }

    /// Send a request and wait for the response matched to its id.
    pub(crate) async fn request(
        &self,
        request: StratumRequest,
        response_timeout: Duration,
    ) -> Result<StratumResponse> {
        let id = request.id;
        let (tx, rx) = oneshot::channel();
        self.pending.lock().await.insert(id, tx);

        let line = serde_json::to_string(&request)?;
        if self.outbound_tx.send(line).await.is_err() {
            self.pending.lock().await.remove(&id);
            return Err(PoolError::NotConnected);
        }

        match timeout(response_timeout, rx).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(_)) => Err(PoolError::Transport("connection closed".to_string())),
            Err(_) => {
                self.pending.lock().await.remove(&id);
                Err(PoolError::Timeout)
            }
        }
    }

    /// Resolve once the transport is closed, from either side.
    pub(crate) async fn closed(&self) {
        let mut rx = self.closed_rx.clone();
        while !*rx.borrow() {
            if rx.changed().await.is_err() {
                break;
            }
        }
    }

    /// Close the transport; both tasks exit and the socket drops.
    pub(crate) fn close(&self) {
        let _ = self.closed_tx.send(true);
    }

    /// Has the transport closed?
    pub(crate) fn is_closed(&self) -> bool {
        *self.closed_rx.borrow()
    }
}
