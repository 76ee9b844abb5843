//! Connection pool statistics

use std::sync::atomic::{AtomicU64, Ordering};

use crate::pool::RemovalCause;

/// Counters for a single pool
#[derive(Debug, Default)]
pub struct PoolStats {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    evicted_size: AtomicU64,
    evicted_expired: AtomicU64,
    evicted_explicit: AtomicU64,
    replaced: AtomicU64,
}

impl PoolStats {
    pub fn new() -> Self {
        Self::default()
    }

    pub(crate) fn inc_hit(&self) {
        self.hits.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_miss(&self) {
        self.misses.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_load(&self) {
        self.loads.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_load_failure(&self) {
        self.load_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub(crate) fn inc_removal(&self, cause: RemovalCause) {
        let counter = match cause {
            RemovalCause::Size => &self.evicted_size,
            RemovalCause::Expired => &self.evicted_expired,
            RemovalCause::Explicit => &self.evicted_explicit,
            RemovalCause::Replaced => &self.replaced,
        };
        counter.fetch_add(1, Ordering::Relaxed);
    }

    /// Get snapshot of all counters
    pub fn snapshot(&self) -> PoolStatsSnapshot {
        PoolStatsSnapshot {
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            loads: self.loads.load(Ordering::Relaxed),
            load_failures: self.load_failures.load(Ordering::Relaxed),
            evicted_size: self.evicted_size.load(Ordering::Relaxed),
            evicted_expired: self.evicted_expired.load(Ordering::Relaxed),
            evicted_explicit: self.evicted_explicit.load(Ordering::Relaxed),
            replaced: self.replaced.load(Ordering::Relaxed),
        }
    }
}

/// Point-in-time copy of [`PoolStats`] (for reporting)
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct PoolStatsSnapshot {
    /// Lookups served from a live entry
    pub hits: u64,
    /// Lookups that found nothing or an expired entry
    pub misses: u64,
    /// Streams created
    pub loads: u64,
    /// Stream creations that failed
    pub load_failures: u64,
    pub evicted_size: u64,
    pub evicted_expired: u64,
    pub evicted_explicit: u64,
    pub replaced: u64,
}

impl PoolStatsSnapshot {
    /// Entries removed for any reason
    pub fn total_removed(&self) -> u64 {
        self.evicted_size + self.evicted_expired + self.evicted_explicit + self.replaced
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_counts_by_cause() {
        let stats = PoolStats::new();
        stats.inc_hit();
        stats.inc_miss();
        stats.inc_miss();
        stats.inc_removal(RemovalCause::Size);
        stats.inc_removal(RemovalCause::Expired);
        stats.inc_removal(RemovalCause::Expired);

        let snap = stats.snapshot();
        assert_eq!(snap.hits, 1);
        assert_eq!(snap.misses, 2);
        assert_eq!(snap.evicted_size, 1);
        assert_eq!(snap.evicted_expired, 2);
        assert_eq!(snap.total_removed(), 3);
    }
}
