//! End-to-end test: miner against an in-process pool and store

use pktmine_core::{Miner, MinerConfig, MinerEvent, SchedulerConfig};
use pktmine_hash::{DigestEngine, DigestError, Hash256, HEADER_LEN};
use pktmine_ledger::{CounterStore, MemoryStore};
use pktmine_stratum::PoolConfig;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::TcpListener;
use tokio::sync::mpsc;
use tokio::time::timeout;

/// Every digest qualifies, so shares flow immediately
struct ZeroEngine;
impl DigestEngine for ZeroEngine {
    fn name(&self) -> &'static str {
        "zero"
    }
    fn digest(&self, _header: &[u8; HEADER_LEN]) -> Result<Hash256, DigestError> {
        Ok(Hash256::default())
    }
}

/// A pool that accepts everything: answers the handshake, publishes one
/// work unit, and acks every submission.
async fn run_accepting_pool(listener: TcpListener) {
    let (stream, _) = listener.accept().await.unwrap();
    let (read, mut write) = stream.into_split();
    let mut lines = BufReader::new(read).lines();

    while let Ok(Some(line)) = lines.next_line().await {
        let msg: Value = match serde_json::from_str(&line) {
            Ok(msg) => msg,
            Err(_) => continue,
        };
        let reply = match msg["method"].as_str() {
            Some("mining.subscribe") => Some(json!({
                "id": msg["id"],
                "result": [[["mining.notify", "sub1"]], "ab", 4],
                "error": null
            })),
            Some("mining.authorize") => Some(json!({
                "id": msg["id"],
                "result": true,
                "error": null
            })),
            Some("mining.submit") => Some(json!({
                "id": msg["id"],
                "result": true,
                "error": null
            })),
            _ => None,
        };
        if let Some(reply) = reply {
            let mut out = reply.to_string();
            out.push('\n');
            if write.write_all(out.as_bytes()).await.is_err() {
                break;
            }
        }
        // Publish work right after a successful authorization
        if msg["method"] == "mining.authorize" {
            let notify = json!({
                "method": "mining.notify",
                "params": [
                    "job1",
                    hex_str("11"),
                    "aabb",
                    "ccdd",
                    [],
                    "20000000",
                    "1d00ffff",
                    "5f5e1000",
                    false
                ]
            });
            let mut out = notify.to_string();
            out.push('\n');
            if write.write_all(out.as_bytes()).await.is_err() {
                break;
            }
        }
    }
}

fn hex_str(byte_pair: &str) -> String {
    byte_pair.repeat(32)
}

async fn next_event(events: &mut mpsc::Receiver<MinerEvent>) -> MinerEvent {
    timeout(Duration::from_secs(10), events.recv())
        .await
        .expect("timed out waiting for miner event")
        .expect("event stream closed")
}

#[tokio::test]
async fn end_to_end_share_accounting() {
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(run_accepting_pool(listener));

    let store = Arc::new(MemoryStore::new());
    let config = MinerConfig {
        pool: PoolConfig {
            url: addr.to_string(),
            payout_address: "pkt1qtest".to_string(),
            worker_name: "worker".to_string(),
            reconnect_backoff: Duration::from_millis(50),
            max_reconnect_backoff: Duration::from_millis(200),
            ..Default::default()
        },
        user_id: "operator1".to_string(),
        scheduler: SchedulerConfig {
            batch_size: 200,
            yield_interval: 20,
        },
        stats_interval: Duration::from_millis(200),
    };

    let (miner, mut events) = Miner::new(config, store.clone(), Arc::new(ZeroEngine));
    let miner = Arc::new(miner);
    miner.start().await.unwrap();
    assert!(miner.is_running());

    // Started first, with a durable session id
    let started = next_event(&mut events).await;
    let session_id = match started {
        MinerEvent::Started { session_id } => session_id.expect("no session id"),
        other => panic!("expected Started, got {:?}", other),
    };

    // A share is found, submitted, and accepted with updated totals
    let mut saw_found = false;
    let mut accepted_totals = None;
    while accepted_totals.is_none() {
        match next_event(&mut events).await {
            MinerEvent::ShareFound { job_id, .. } => {
                assert_eq!(job_id, "job1");
                saw_found = true;
            }
            MinerEvent::ShareAccepted { totals, .. } => accepted_totals = Some(totals),
            MinerEvent::Error { detail } => panic!("unexpected error: {}", detail),
            _ => {}
        }
    }
    assert!(saw_found, "accepted a share that was never reported found");
    let totals = accepted_totals.unwrap();
    assert!(totals.total_shares_accepted >= 1);
    assert!(totals.total_reward_units > 0.0);

    // Stop while draining, then expect the final snapshot and Stopped
    let stopper = {
        let miner = miner.clone();
        tokio::spawn(async move { miner.stop().await })
    };
    let mut saw_zeroed_snapshot = false;
    loop {
        match next_event(&mut events).await {
            MinerEvent::StatsUpdate(snapshot) => {
                if snapshot.hashrate == 0.0 {
                    saw_zeroed_snapshot = true;
                }
            }
            MinerEvent::Stopped { summary } => {
                let summary = summary.expect("no session summary");
                assert_eq!(summary.session_id, session_id);
                assert!(summary.shares_accepted >= 1);
                break;
            }
            _ => {}
        }
    }
    timeout(Duration::from_secs(10), stopper)
        .await
        .expect("stop did not finish")
        .unwrap();
    assert!(!miner.is_running());

    // The shutdown flush carries a zeroed hashrate
    assert!(saw_zeroed_snapshot, "no final snapshot flushed");

    // The session record was finalized in the store
    let doc = store
        .get_doc(&format!("sessions/{}", session_id))
        .await
        .unwrap()
        .expect("session document missing");
    assert_eq!(doc["status"], "completed");
    assert!(doc["stats"]["shares_accepted"].as_u64().unwrap() >= 1);
}
