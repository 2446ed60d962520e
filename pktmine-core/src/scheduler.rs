//! Cooperative search loop
//!
//! Enumerates nonces against the current work assignment in randomized
//! batches, yielding back to the runtime on a fixed cadence so inbound
//! protocol handling is never starved. The work feed is reloaded on every
//! digest evaluation: a mid-batch difficulty change applies to the very
//! next digest, and a new work generation abandons the batch on the spot,
//! so a candidate can never be computed against a stale unit/difficulty
//! pair.

use crate::config::SchedulerConfig;
use pktmine_hash::{DigestEngine, Target};
use pktmine_stratum::{Candidate, WorkAssignment, WorkFeed};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::sleep;
use tracing::{debug, info};

/// Hot-path counters shared with the stats reporter
#[derive(Debug, Default)]
pub struct SchedulerCounters {
    pub hashes: AtomicU64,
    pub shares_found: AtomicU64,
    pub digest_errors: AtomicU64,
}

impl SchedulerCounters {
    pub fn reset(&self) {
        self.hashes.store(0, Ordering::Relaxed);
        self.shares_found.store(0, Ordering::Relaxed);
        self.digest_errors.store(0, Ordering::Relaxed);
    }
}

/// The search loop task
pub struct SearchScheduler {
    engine: Arc<dyn DigestEngine>,
    feed: Arc<WorkFeed>,
    candidate_tx: mpsc::Sender<Candidate>,
    counters: Arc<SchedulerCounters>,
    running: Arc<AtomicBool>,
    config: SchedulerConfig,
}

impl SearchScheduler {
    pub fn new(
        engine: Arc<dyn DigestEngine>,
        feed: Arc<WorkFeed>,
        candidate_tx: mpsc::Sender<Candidate>,
        counters: Arc<SchedulerCounters>,
        running: Arc<AtomicBool>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            engine,
            feed,
            candidate_tx,
            counters,
            running,
            config,
        }
    }

    /// Run until the running flag drops.
    ///
    /// Idles on the feed when no work is assigned; otherwise searches
    /// batch after batch, each from a fresh randomized starting nonce so
    /// restarts carry no small-nonce bias.
    pub async fn run(self) {
        info!("Search scheduler started (engine: {})", self.engine.name());

        while self.running.load(Ordering::SeqCst) {
            let Some(assignment) = self.feed.current() else {
                tokio::select! {
                    _ = self.feed.changed() => {}
                    _ = sleep(Duration::from_millis(50)) => {}
                }
                continue;
            };
            if !self.search_batch(assignment).await {
                break;
            }
        }

        info!("Search scheduler stopped");
    }

    /// Enumerate one batch. Returns false when the loop should exit.
    async fn search_batch(&self, mut assignment: Arc<WorkAssignment>) -> bool {
        let header = assignment.unit.header(&assignment.extranonce);
        let mut target = Target::from_difficulty(assignment.difficulty);
        let yield_interval = self.config.yield_interval.max(1);

        let start: u32 = rand::random();
        let end = start.saturating_add(self.config.batch_size);
        let mut iterations = 0u32;
        let mut nonce = start;

        while nonce < end {
            // Observe the feed before every evaluation
            let Some(current) = self.feed.current() else {
                return true;
            };
            if !Arc::ptr_eq(&current, &assignment) {
                if current.generation != assignment.generation {
                    debug!(
                        "Work unit superseded mid-batch (generation {} -> {})",
                        assignment.generation, current.generation
                    );
                    return true;
                }
                // Same generation, new difficulty; the header is unchanged
                target = Target::from_difficulty(current.difficulty);
                assignment = current;
            }

            match self.engine.digest(&header.to_bytes(nonce)) {
                Ok(digest) => {
                    self.counters.hashes.fetch_add(1, Ordering::Relaxed);
                    if target.is_met(&digest) {
                        self.counters.shares_found.fetch_add(1, Ordering::Relaxed);
                        info!(
                            "Share found: job {} nonce {:08x}",
                            assignment.unit.job_id, nonce
                        );
                        let candidate = Candidate {
                            generation: assignment.generation,
                            job_id: assignment.unit.job_id.clone(),
                            extranonce: assignment.extranonce.clone(),
                            timestamp: assignment.unit.timestamp,
                            nonce,
                            digest,
                        };
                        if self.candidate_tx.send(candidate).await.is_err() {
                            return false;
                        }
                    }
                }
                Err(e) => {
                    // Never fatal; skip the nonce and keep going
                    self.counters.digest_errors.fetch_add(1, Ordering::Relaxed);
                    debug!("Digest error at nonce {:08x}: {}", nonce, e);
                }
            }

            nonce += 1;
            iterations += 1;
            if iterations % yield_interval == 0 {
                if !self.running.load(Ordering::SeqCst) {
                    return false;
                }
                tokio::task::yield_now().await;
            }
        }

        true
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pktmine_hash::{DigestError, Hash256, HEADER_LEN};
    use pktmine_stratum::WorkUnit;
    use std::time::Duration;
    use tokio::time::timeout;

    /// Every digest qualifies at any difficulty
    struct ZeroEngine;
    impl DigestEngine for ZeroEngine {
        fn name(&self) -> &'static str {
            "zero"
        }
        fn digest(&self, _header: &[u8; HEADER_LEN]) -> Result<Hash256, DigestError> {
            Ok(Hash256::default())
        }
    }

    /// No digest ever qualifies
    struct CeilingEngine;
    impl DigestEngine for CeilingEngine {
        fn name(&self) -> &'static str {
            "ceiling"
        }
        fn digest(&self, _header: &[u8; HEADER_LEN]) -> Result<Hash256, DigestError> {
            Ok(Hash256::from_bytes([0xff; 32]))
        }
    }

    /// Always fails
    struct BrokenEngine;
    impl DigestEngine for BrokenEngine {
        fn name(&self) -> &'static str {
            "broken"
        }
        fn digest(&self, _header: &[u8; HEADER_LEN]) -> Result<Hash256, DigestError> {
            Err(DigestError::Computation("no backend".to_string()))
        }
    }

    fn publish_unit(feed: &WorkFeed, generation: u64, job_id: &str) {
        feed.publish(WorkAssignment {
            generation,
            unit: Arc::new(WorkUnit {
                job_id: job_id.to_string(),
                prev_hash: Hash256::default(),
                coinbase_prefix: vec![0x01],
                coinbase_suffix: vec![0x02],
                merkle_branches: vec![],
                version: 1,
                bits: 0x1d00_ffff,
                timestamp: 1000,
                clean_jobs: false,
            }),
            difficulty: pktmine_hash::Difficulty::new(1.0),
            extranonce: vec![0xab],
        });
    }

    fn scheduler_parts(
        engine: Arc<dyn DigestEngine>,
    ) -> (
        Arc<WorkFeed>,
        Arc<SchedulerCounters>,
        Arc<AtomicBool>,
        mpsc::Receiver<Candidate>,
        SearchScheduler,
    ) {
        let feed = Arc::new(WorkFeed::new());
        let counters = Arc::new(SchedulerCounters::default());
        let running = Arc::new(AtomicBool::new(true));
        let (candidate_tx, candidate_rx) = mpsc::channel(16);
        let scheduler = SearchScheduler::new(
            engine,
            feed.clone(),
            candidate_tx,
            counters.clone(),
            running.clone(),
            SchedulerConfig {
                batch_size: 500,
                yield_interval: 50,
            },
        );
        (feed, counters, running, candidate_rx, scheduler)
    }

    #[tokio::test]
    async fn emits_candidates_for_current_generation() {
        let (feed, counters, running, mut candidate_rx, scheduler) =
            scheduler_parts(Arc::new(ZeroEngine));
        publish_unit(&feed, 1, "job1");
        let handle = tokio::spawn(scheduler.run());

        let candidate = timeout(Duration::from_secs(5), candidate_rx.recv())
            .await
            .expect("no candidate produced")
            .unwrap();
        assert_eq!(candidate.generation, 1);
        assert_eq!(candidate.job_id, "job1");
        assert_eq!(candidate.extranonce, vec![0xab]);
        assert!(counters.shares_found.load(Ordering::Relaxed) >= 1);

        running.store(false, Ordering::SeqCst);
        drop(candidate_rx);
        let _ = timeout(Duration::from_secs(2), handle).await;
    }

    #[tokio::test]
    async fn candidates_switch_with_the_work_generation() {
        let (feed, _counters, running, mut candidate_rx, scheduler) =
            scheduler_parts(Arc::new(ZeroEngine));
        publish_unit(&feed, 1, "job-a");
        let handle = tokio::spawn(scheduler.run());

        // Drain a few from the first generation, then supersede it
        for _ in 0..3 {
            let candidate = timeout(Duration::from_secs(5), candidate_rx.recv())
                .await
                .expect("no candidate")
                .unwrap();
            assert_eq!(candidate.job_id, "job-a");
        }
        publish_unit(&feed, 2, "job-b");

        // Soon every produced candidate carries the new generation; any
        // residue from generation 1 was already in the channel when the
        // swap landed and is exactly what the downstream staleness fence
        // filters out.
        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        loop {
            let candidate = timeout(Duration::from_secs(5), candidate_rx.recv())
                .await
                .expect("no candidate")
                .unwrap();
            if candidate.generation == 2 {
                assert_eq!(candidate.job_id, "job-b");
                break;
            }
            assert!(std::time::Instant::now() < deadline, "never switched");
        }

        running.store(false, Ordering::SeqCst);
        drop(candidate_rx);
        let _ = timeout(Duration::from_secs(2), handle).await;
    }

    #[tokio::test]
    async fn stops_within_one_yield_interval() {
        let (feed, counters, running, _candidate_rx, scheduler) =
            scheduler_parts(Arc::new(CeilingEngine));
        publish_unit(&feed, 1, "job1");
        let handle = tokio::spawn(scheduler.run());

        // Let it churn, then cancel; the task must end at a yield point
        sleep(Duration::from_millis(50)).await;
        running.store(false, Ordering::SeqCst);
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();
        assert!(counters.hashes.load(Ordering::Relaxed) > 0);
        assert_eq!(counters.shares_found.load(Ordering::Relaxed), 0);
    }

    #[tokio::test]
    async fn digest_errors_are_counted_and_skipped() {
        let (feed, counters, running, _candidate_rx, scheduler) =
            scheduler_parts(Arc::new(BrokenEngine));
        publish_unit(&feed, 1, "job1");
        let handle = tokio::spawn(scheduler.run());

        sleep(Duration::from_millis(50)).await;
        running.store(false, Ordering::SeqCst);
        timeout(Duration::from_secs(1), handle)
            .await
            .expect("scheduler did not stop")
            .unwrap();

        assert!(counters.digest_errors.load(Ordering::Relaxed) > 0);
        assert_eq!(counters.hashes.load(Ordering::Relaxed), 0);
        assert_eq!(counters.shares_found.load(Ordering::Relaxed), 0);
    }
}
