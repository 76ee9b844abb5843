//! Lane metrics for observability

use std::sync::atomic::{AtomicU64, AtomicUsize, Ordering};

/// Metrics for a single lane
#[derive(Debug, Default)]
pub struct LaneMetrics {
    /// Tasks accepted but not yet picked up
    queue_len: AtomicUsize,
    /// Tasks that wrote successfully
    completed: AtomicU64,
    /// Tasks that failed
    failed: AtomicU64,
    /// Submissions refused because the lane was shut down
    rejected: AtomicU64,
}

impl LaneMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn queue_len(&self) -> usize {
        self.queue_len.load(Ordering::Relaxed)
    }

    /// Record an accepted task, returning the new queue length
    pub fn inc_queued(&self) -> usize {
        self.queue_len.fetch_add(1, Ordering::Relaxed) + 1
    }

    /// Record a task picked up by the worker, returning the new queue length
    pub fn dec_queued(&self) -> usize {
        self.queue_len
            .fetch_sub(1, Ordering::Relaxed)
            .saturating_sub(1)
    }

    pub fn completed(&self) -> u64 {
        self.completed.load(Ordering::Relaxed)
    }

    pub fn inc_completed(&self) {
        self.completed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn failed(&self) -> u64 {
        self.failed.load(Ordering::Relaxed)
    }

    pub fn inc_failed(&self) {
        self.failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn rejected(&self) -> u64 {
        self.rejected.load(Ordering::Relaxed)
    }

    pub fn inc_rejected(&self) {
        self.rejected.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all metrics
    pub fn snapshot(&self) -> MetricsSnapshot {
        MetricsSnapshot {
            queue_len: self.queue_len(),
            completed: self.completed(),
            failed: self.failed(),
            rejected: self.rejected(),
        }
    }
}

/// Snapshot of lane metrics (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct MetricsSnapshot {
    pub queue_len: usize,
    pub completed: u64,
    pub failed: u64,
    pub rejected: u64,
}
