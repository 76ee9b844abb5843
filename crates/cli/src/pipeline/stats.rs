//! Replay statistics.

use std::collections::BTreeMap;
use std::time::Duration;

use connection_pool::{CommittedTransaction, PoolStatsSnapshot};
use serde::Serialize;

/// Commits landed on one endpoint
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct EndpointCommits {
    pub transactions: u64,
    pub records: u64,
}

/// Statistics from a replay run
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplayStats {
    /// Rows read from the input
    pub rows_read: u64,

    /// Rows decoded into records
    pub rows_decoded: u64,

    /// Rows the decoder skipped
    pub rows_skipped: u64,

    /// Blocks written successfully
    pub blocks_written: u64,

    /// Block replays after a restartable failure
    pub block_restarts: u64,

    /// Blocks abandoned after all restarts
    pub blocks_failed: u64,

    /// Distinct sources (table, partition) replayed
    pub sources: usize,

    /// Commit counts keyed by endpoint (`uri/db.table[values]`)
    pub commits: BTreeMap<String, EndpointCommits>,

    pub pool_hits: u64,
    pub pool_misses: u64,
    pub pool_evictions: u64,

    /// Total duration of the replay
    #[serde(serialize_with = "serialize_secs")]
    pub duration: Duration,
}

impl ReplayStats {
    /// Fold the store's commit log into per-endpoint counts
    pub fn record_commits(&mut self, committed: &[CommittedTransaction]) {
        for tx in committed {
            let entry = self.commits.entry(tx.endpoint.to_string()).or_default();
            entry.transactions += 1;
            entry.records += tx.records.len() as u64;
        }
    }

    pub fn record_pool(&mut self, pool: PoolStatsSnapshot) {
        self.pool_hits = pool.hits;
        self.pool_misses = pool.misses;
        self.pool_evictions = pool.total_removed();
    }

    pub fn committed_records(&self) -> u64 {
        self.commits.values().map(|c| c.records).sum()
    }

    /// Print detailed summary
    pub fn print_summary(&self) {
        println!("\n=== Replay Statistics ===\n");

        println!("Overview");
        println!("  Duration: {:.3}s", self.duration.as_secs_f64());
        println!("  Sources: {}", self.sources);
        println!("  Rows read: {}", self.rows_read);
        println!("  Rows decoded: {}", self.rows_decoded);
        println!("  Rows skipped: {}", self.rows_skipped);

        println!("\nBlocks");
        println!("  Written: {}", self.blocks_written);
        println!("  Restarts: {}", self.block_restarts);
        println!("  Failed: {}", self.blocks_failed);

        println!("\nConnection Pool");
        println!("  Hits: {}", self.pool_hits);
        println!("  Misses: {}", self.pool_misses);
        println!("  Removed: {}", self.pool_evictions);

        println!("\nCommits ({} endpoints)", self.commits.len());
        for (endpoint, commits) in &self.commits {
            println!(
                "  - {endpoint}: {} records in {} transactions",
                commits.records, commits.transactions
            );
        }
        println!();
    }
}

fn serialize_secs<S: serde::Serializer>(duration: &Duration, s: S) -> Result<S::Ok, S::Error> {
    s.serialize_f64(duration.as_secs_f64())
}
