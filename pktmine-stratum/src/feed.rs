//! Atomically published work state
//!
//! The session is the only writer; the search loop reads on every digest
//! evaluation. Bundling the work unit and difficulty into one swapped
//! allocation is what guarantees a reader never observes a unit/difficulty
//! pair from two different generations.

use crate::protocol::WorkUnit;
use arc_swap::ArcSwapOption;
use pktmine_hash::Difficulty;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Notify;

/// The current work unit plus everything needed to search it
#[derive(Debug, Clone)]
pub struct WorkAssignment {
    /// Monotonically increasing work generation; candidates carry the
    /// generation they were produced from and die with it.
    pub generation: u64,

    /// The work unit, superseded wholesale by the next notification
    pub unit: Arc<WorkUnit>,

    /// Difficulty in force for this assignment
    pub difficulty: Difficulty,

    /// Pool-assigned extranonce folded into the coinbase
    pub extranonce: Vec<u8>,
}

/// Single-writer, many-reader handoff of the current assignment
pub struct WorkFeed {
    current: ArcSwapOption<WorkAssignment>,
    difficulty_bits: AtomicU64,
    changed: Notify,
}

impl WorkFeed {
    pub fn new() -> Self {
        Self {
            current: ArcSwapOption::new(None),
            difficulty_bits: AtomicU64::new(Difficulty::default().value().to_bits()),
            changed: Notify::new(),
        }
    }

    /// Publish a new assignment, superseding any prior one.
    pub fn publish(&self, assignment: WorkAssignment) {
        self.difficulty_bits
            .store(assignment.difficulty.value().to_bits(), Ordering::Release);
        self.current.store(Some(Arc::new(assignment)));
        self.changed.notify_waiters();
    }

    /// Replace the difficulty, keeping the unit and generation.
    ///
    /// The new value applies to the very next digest evaluation; it does
    /// not invalidate outstanding candidates.
    pub fn set_difficulty(&self, difficulty: Difficulty) {
        self.difficulty_bits
            .store(difficulty.value().to_bits(), Ordering::Release);
        if let Some(current) = self.current.load_full() {
            self.current.store(Some(Arc::new(WorkAssignment {
                difficulty,
                ..(*current).clone()
            })));
        }
        self.changed.notify_waiters();
    }

    /// Difficulty last seen, usable before any work has arrived
    pub fn difficulty(&self) -> Difficulty {
        Difficulty::new(f64::from_bits(self.difficulty_bits.load(Ordering::Acquire)))
    }

    /// Current assignment, if any
    pub fn current(&self) -> Option<Arc<WorkAssignment>> {
        self.current.load_full()
    }

    /// Generation of the current assignment (0 when idle)
    pub fn generation(&self) -> u64 {
        self.current
            .load()
            .as_ref()
            .map(|a| a.generation)
            .unwrap_or(0)
    }

    /// Drop the current assignment; searchers go idle until the next publish.
    pub fn clear(&self) {
        self.current.store(None);
        self.changed.notify_waiters();
    }

    /// Wait for the next publish/replace/clear.
    pub async fn changed(&self) {
        self.changed.notified().await;
    }
}

impl Default for WorkFeed {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pktmine_hash::Hash256;

    fn test_unit(job_id: &str) -> Arc<WorkUnit> {
        Arc::new(WorkUnit {
            job_id: job_id.to_string(),
            prev_hash: Hash256::default(),
            coinbase_prefix: vec![0xaa],
            coinbase_suffix: vec![0xbb],
            merkle_branches: vec![],
            version: 1,
            bits: 0x1d00_ffff,
            timestamp: 100,
            clean_jobs: false,
        })
    }

    fn assignment(generation: u64, job_id: &str, difficulty: f64) -> WorkAssignment {
        WorkAssignment {
            generation,
            unit: test_unit(job_id),
            difficulty: Difficulty::new(difficulty),
            extranonce: vec![],
        }
    }

    #[test]
    fn test_publish_supersedes_wholesale() {
        let feed = WorkFeed::new();
        assert!(feed.current().is_none());
        assert_eq!(feed.generation(), 0);

        feed.publish(assignment(1, "a", 1.0));
        feed.publish(assignment(2, "b", 1.0));

        let current = feed.current().unwrap();
        assert_eq!(current.generation, 2);
        assert_eq!(current.unit.job_id, "b");
    }

    #[test]
    fn test_set_difficulty_keeps_generation() {
        let feed = WorkFeed::new();
        feed.publish(assignment(1, "a", 1.0));

        feed.set_difficulty(Difficulty::new(32.0));

        let current = feed.current().unwrap();
        assert_eq!(current.generation, 1);
        assert_eq!(current.unit.job_id, "a");
        assert_eq!(current.difficulty.value(), 32.0);
        assert_eq!(feed.difficulty().value(), 32.0);
    }

    #[test]
    fn test_difficulty_remembered_before_first_work() {
        let feed = WorkFeed::new();
        feed.set_difficulty(Difficulty::new(8.0));
        assert!(feed.current().is_none());
        assert_eq!(feed.difficulty().value(), 8.0);
    }

    #[test]
    fn test_clear_goes_idle() {
        let feed = WorkFeed::new();
        feed.publish(assignment(3, "a", 1.0));
        feed.clear();
        assert!(feed.current().is_none());
        assert_eq!(feed.generation(), 0);
    }
}
