//! Run the miner against a real pool
//!
//! Wires the default double-SHA-256 engine and the in-memory store; swap
//! in a real digest engine and durable store for production use.
//!
//! Run with: cargo run --example run_miner

use pktmine_core::{Miner, MinerConfig, MinerEvent};
use pktmine_hash::Sha256dEngine;
use pktmine_ledger::MemoryStore;
use pktmine_stratum::PoolConfig;
use std::sync::Arc;
use tracing::{info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter("pktmine=debug")
        .init();

    let config = MinerConfig {
        pool: PoolConfig {
            // Replace with a real pool and your payout address
            url: "stratum+tcp://pool.pkt.world:3333".to_string(),
            payout_address: "pkt1q2phzyfzd7aufszned7q2h77t4u0kl3exxgyuqf".to_string(),
            worker_name: "mobile".to_string(),
            ..Default::default()
        },
        user_id: "operator1".to_string(),
        ..Default::default()
    };

    let (miner, mut events) = Miner::new(
        config,
        Arc::new(MemoryStore::new()),
        Arc::new(Sha256dEngine),
    );
    let miner = Arc::new(miner);

    // Event consumer
    tokio::spawn(async move {
        while let Some(event) = events.recv().await {
            match event {
                MinerEvent::Started { session_id } => {
                    info!("Mining started (session: {:?})", session_id)
                }
                MinerEvent::ShareFound { job_id, nonce, .. } => {
                    info!("Share found: job {} nonce {:08x}", job_id, nonce)
                }
                MinerEvent::ShareAccepted { totals, .. } => info!(
                    "Share accepted! {} total, {} reward units",
                    totals.total_shares_accepted, totals.total_reward_units
                ),
                MinerEvent::ShareRejected { reason, .. } => {
                    warn!("Share rejected: {:?}", reason)
                }
                MinerEvent::StatsUpdate(snapshot) => info!(
                    "{:?} | {:.0} H/s | {} found / {} accepted | {:.2} shares/h",
                    snapshot.connection,
                    snapshot.hashrate,
                    snapshot.shares_found,
                    snapshot.shares_accepted,
                    snapshot.shares_per_hour
                ),
                MinerEvent::Error { detail } => warn!("{}", detail),
                MinerEvent::Stopped { summary } => {
                    info!("Mining stopped (summary: {:?})", summary);
                    break;
                }
            }
        }
    });

    miner.start().await?;

    info!("Mining. Press Ctrl+C to stop.");
    tokio::signal::ctrl_c().await?;
    miner.stop().await;

    Ok(())
}
