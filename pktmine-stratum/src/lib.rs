//! Pktmine Stratum - pool protocol client
//!
//! A Stratum-style JSON-RPC client for the pktmine worker: persistent
//! line-delimited TCP connection, subscribe/authorize handshake, work and
//! difficulty notifications, share submission, and automatic reconnection
//! with exponential backoff.
//!
//! # Example
//!
//! ```no_run
//! use pktmine_stratum::{PoolConfig, PoolEvent, PoolSession, WorkFeed};
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() {
//!     let config = PoolConfig {
//!         url: "stratum+tcp://pool.example.com:3333".to_string(),
//!         payout_address: "pkt1qexampleaddress".to_string(),
//!         ..Default::default()
//!     };
//!
//!     let feed = Arc::new(WorkFeed::new());
//!     let (session, mut events, _state) = PoolSession::new(config, feed.clone());
//!     tokio::spawn(session.clone().run());
//!
//!     while let Some(event) = events.recv().await {
//!         if let PoolEvent::NewWork { job_id, .. } = event {
//!             println!("work unit available: {}", job_id);
//!             // hand feed.current() to a search loop, submit candidates
//!             // back through session.submit(..)
//!         }
//!     }
//! }
//! ```

pub mod config;
mod connection;
pub mod error;
pub mod feed;
pub mod protocol;
pub mod session;

// Re-export main types
pub use config::PoolConfig;
pub use error::{PoolError, Result};
pub use feed::{WorkAssignment, WorkFeed};
pub use protocol::{
    methods, Candidate, ShareOutcome, StratumNotification, StratumRequest, StratumResponse,
    SubscribeResult, WorkUnit, AUTHORIZE_ID, SUBMIT_ID_FLOOR, SUBSCRIBE_ID,
};
pub use session::{PoolEvent, PoolSession, SessionState};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
