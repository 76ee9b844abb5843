//! Replay orchestrator - drives captured rows through the sink.
//!
//! Rows are grouped by source (table, partition) and cut into blocks the
//! way the host export framework would hand them over: `on_block_start`,
//! `process_row` per row, `on_block_completion`. A restartable block
//! failure replays the same block.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use anyhow::{Context, Result};
use connection_pool::MemoryStore;
use contracts::{BlockSink, ExportConfig, ExportRow};
use dispatcher::Dispatcher;
use export_client::{AdvertisedSource, ExportClient, ExportDecoder, RestartBlock};
use tracing::{debug, info, warn};

use super::ReplayStats;

/// Replay configuration
#[derive(Debug, Clone)]
pub struct ReplayConfig {
    /// Loaded export configuration (environment overrides applied)
    pub export: ExportConfig,

    /// Captured rows in input order
    pub rows: Vec<ExportRow>,

    /// Rows per block for each source
    pub block_size: usize,

    /// Replays of a block after a restartable failure
    pub max_restarts: u32,
}

/// Main replay orchestrator
pub struct ReplayPipeline {
    config: ReplayConfig,
}

#[derive(Debug, Default)]
struct BlockOutcome {
    decoded: u64,
    skipped: u64,
}

impl ReplayPipeline {
    /// Create a new pipeline with the given configuration
    pub fn new(config: ReplayConfig) -> Self {
        Self { config }
    }

    /// Run the replay against a fresh in-memory store
    pub async fn run(self) -> Result<ReplayStats> {
        self.run_against(MemoryStore::new()).await
    }

    /// Run the replay against `store`
    pub async fn run_against(self, store: MemoryStore) -> Result<ReplayStats> {
        let start_time = Instant::now();
        let ReplayConfig {
            export,
            rows,
            block_size,
            max_restarts,
        } = self.config;

        let client = ExportClient::configure(&export).context("Failed to configure export client")?;
        let dispatcher = Arc::new(Dispatcher::from_settings(
            Arc::new(store.clone()),
            &export.sink,
        ));

        let mut stats = ReplayStats {
            rows_read: rows.len() as u64,
            ..Default::default()
        };

        let sources = group_by_source(rows);
        stats.sources = sources.len();
        info!(
            sources = sources.len(),
            lanes = dispatcher.lane_count(),
            block_size,
            "Replay started"
        );

        for (source, rows) in sources {
            let mut decoder = client.construct_decoder(source, dispatcher.clone()).await;
            for block in rows.chunks(block_size.max(1)) {
                replay_block(&mut decoder, block, max_restarts, &mut stats).await;
            }
            decoder.source_no_longer_advertised().await;
        }

        dispatcher.shutdown().await;

        stats.record_commits(&store.committed());
        stats.record_pool(dispatcher.pool().stats());
        stats.duration = start_time.elapsed();

        info!(
            rows_decoded = stats.rows_decoded,
            committed_records = stats.committed_records(),
            endpoints = stats.commits.len(),
            blocks_failed = stats.blocks_failed,
            "Replay finished"
        );
        Ok(stats)
    }
}

/// Group rows by source, keeping first-seen source order and row order
fn group_by_source(rows: Vec<ExportRow>) -> Vec<(AdvertisedSource, Vec<ExportRow>)> {
    let mut index: HashMap<(String, i32), usize> = HashMap::new();
    let mut sources: Vec<(AdvertisedSource, Vec<ExportRow>)> = Vec::new();

    for row in rows {
        let key = (row.table_name.clone(), row.partition_id);
        let slot = *index.entry(key).or_insert_with(|| {
            sources.push((
                AdvertisedSource::new(row.table_name.clone(), row.partition_id),
                Vec::new(),
            ));
            sources.len() - 1
        });
        sources[slot].1.push(row);
    }
    sources
}

async fn replay_block<S: BlockSink>(
    decoder: &mut ExportDecoder<S>,
    block: &[ExportRow],
    max_restarts: u32,
    stats: &mut ReplayStats,
) {
    let mut attempt = 0;
    loop {
        match run_block(decoder, block).await {
            Ok(outcome) => {
                stats.blocks_written += 1;
                stats.rows_decoded += outcome.decoded;
                stats.rows_skipped += outcome.skipped;
                return;
            }
            Err(restart) if restart.is_retryable() && attempt < max_restarts => {
                attempt += 1;
                stats.block_restarts += 1;
                debug!(source = %decoder.source(), attempt, error = %restart, "Replaying block");
            }
            Err(restart) => {
                stats.blocks_failed += 1;
                warn!(source = %decoder.source(), error = %restart, "Block abandoned");
                return;
            }
        }
    }
}

async fn run_block<S: BlockSink>(
    decoder: &mut ExportDecoder<S>,
    block: &[ExportRow],
) -> Result<BlockOutcome, RestartBlock> {
    let mut outcome = BlockOutcome::default();
    let (Some(first), Some(last)) = (block.first(), block.last()) else {
        return Ok(outcome);
    };

    decoder.on_block_start(first)?;
    for row in block {
        if decoder.process_row(row)? {
            outcome.decoded += 1;
        } else {
            outcome.skipped += 1;
        }
    }
    decoder.on_block_completion(last).await?;
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use contracts::{ColumnKind, ColumnMeta, ColumnValue, HiveConfig, SinkSettings};
    use std::collections::BTreeMap;

    fn export_config() -> ExportConfig {
        let mut partition_columns = BTreeMap::new();
        partition_columns.insert("EVENTS".to_string(), vec!["REGION".to_string()]);
        ExportConfig {
            hive: HiveConfig {
                uri: "thrift://metastore:9083".into(),
                db: "analytics".into(),
                table: "events".into(),
                timezone: "UTC".into(),
                unspecified_token: "none".into(),
                skip_internal_fields: false,
                partition_columns,
            },
            sink: SinkSettings::default(),
        }
    }

    fn row(partition_id: i32, region: &str, id: i64) -> ExportRow {
        ExportRow {
            generation: 1,
            partition_id,
            table_name: "EVENTS".into(),
            columns: vec![
                ColumnMeta::new("REGION", ColumnKind::String),
                ColumnMeta::new("ID", ColumnKind::BigInt),
            ],
            values: vec![ColumnValue::Text(region.into()), ColumnValue::Integer(id)],
        }
    }

    fn config(rows: Vec<ExportRow>) -> ReplayConfig {
        ReplayConfig {
            export: export_config(),
            rows,
            block_size: 2,
            max_restarts: 3,
        }
    }

    #[test]
    fn test_group_by_source_keeps_order() {
        let groups = group_by_source(vec![row(1, "eu", 1), row(0, "eu", 2), row(1, "us", 3)]);
        assert_eq!(groups.len(), 2);
        assert_eq!(groups[0].0.partition_id, 1);
        assert_eq!(groups[0].1.len(), 2);
        assert_eq!(groups[1].1[0].values[1], ColumnValue::Integer(2));
    }

    #[tokio::test]
    async fn test_replay_commits_per_endpoint() {
        let rows = vec![
            row(0, "eu", 1),
            row(0, "us", 2),
            row(0, "eu", 3),
            row(1, "", 4),
            row(1, "eu", 5),
        ];
        let stats = ReplayPipeline::new(config(rows)).run().await.unwrap();

        assert_eq!(stats.rows_read, 5);
        assert_eq!(stats.rows_decoded, 5);
        assert_eq!(stats.blocks_written, 3);
        assert_eq!(stats.blocks_failed, 0);
        assert_eq!(stats.committed_records(), 5);
        assert_eq!(stats.commits.len(), 3);
        assert_eq!(
            stats.commits["thrift://metastore:9083/analytics.events[eu]"].records,
            3
        );
        assert_eq!(
            stats.commits["thrift://metastore:9083/analytics.events[none]"].records,
            1
        );
    }

    #[tokio::test]
    async fn test_restartable_failure_replays_block() {
        let store = MemoryStore::new();
        store.fail_next_connects(1);

        let stats = ReplayPipeline::new(config(vec![row(0, "eu", 1)]))
            .run_against(store.clone())
            .await
            .unwrap();

        assert_eq!(stats.block_restarts, 1);
        assert_eq!(stats.blocks_written, 1);
        assert_eq!(stats.committed_records(), 1);
    }

    #[tokio::test]
    async fn test_unlisted_table_fails_after_restarts() {
        let mut other = row(0, "eu", 1);
        other.table_name = "ORDERS".into();
        let mut cfg = config(vec![other]);
        cfg.max_restarts = 2;

        let stats = ReplayPipeline::new(cfg).run().await.unwrap();
        assert_eq!(stats.block_restarts, 2);
        assert_eq!(stats.blocks_failed, 1);
        assert!(stats.commits.is_empty());
    }
}
