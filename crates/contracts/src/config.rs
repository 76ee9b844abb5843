//! ExportConfig - Config Loader output
//!
//! Destination (metastore, database, table, partition columns) and the
//! sink tunables (pool size, TTL, batch size, writer lanes).

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

/// Environment knob: pool maximum size
pub const ENV_POOL_SIZE: &str = "HIVE_CONNECTION_POOL_SIZE";
/// Environment knob: pool entry TTL in minutes
pub const ENV_CONNECTION_TTL: &str = "HIVE_CONNECTION_TTL";
/// Environment knob: maximum transactions per fetched batch
pub const ENV_TRANSACTION_BATCH_SIZE: &str = "HIVE_TRANSACTION_BATCH_SIZE";
/// Environment knob: number of dispatcher lanes
pub const ENV_CONCURRENT_WRITERS: &str = "HIVE_CONCURRENT_WRITERS";

/// Placeholder partition value used when a row's partition column is blank
pub const DEFAULT_UNSPECIFIED_TOKEN: &str = "__VoltDB_unspecified__";

/// Complete export configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ExportConfig {
    /// Destination settings
    pub hive: HiveConfig,

    /// Sink tunables
    #[serde(default)]
    pub sink: SinkSettings,
}

/// Destination settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HiveConfig {
    /// Metastore URI (`thrift://host:port`)
    pub uri: String,

    /// Destination database
    pub db: String,

    /// Destination table
    pub table: String,

    /// IANA time zone used to format timestamps
    #[serde(default = "default_timezone")]
    pub timezone: String,

    /// Partition value substituted for blank partition columns
    #[serde(default = "default_unspecified_token")]
    pub unspecified_token: String,

    /// Skip the host's internal metadata columns
    #[serde(default = "default_true")]
    pub skip_internal_fields: bool,

    /// Source table name -> ordered partition column names (upper-case)
    ///
    /// Keep last: serialized as a nested TOML table.
    #[serde(default)]
    pub partition_columns: BTreeMap<String, Vec<String>>,
}

impl HiveConfig {
    /// Partition columns configured for `table` (case-insensitive)
    pub fn partition_columns_for(&self, table: &str) -> &[String] {
        self.partition_columns
            .get(&table.to_uppercase())
            .map(Vec::as_slice)
            .unwrap_or(&[])
    }
}

fn default_timezone() -> String {
    "UTC".to_string()
}

fn default_unspecified_token() -> String {
    DEFAULT_UNSPECIFIED_TOKEN.to_string()
}

fn default_true() -> bool {
    true
}

/// Sink tunables
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SinkSettings {
    /// Maximum live pooled connections
    pub pool_size: usize,

    /// Pool entry time-to-live since last access, in minutes
    pub connection_ttl_minutes: u64,

    /// Maximum transactions per fetched batch
    pub transaction_batch_size: u32,

    /// Number of dispatcher lanes
    pub concurrent_writers: usize,

    /// Batch fetch attempts before reconnecting
    pub batch_fetch_attempts: u32,

    /// Backoff between batch fetch attempts, in milliseconds
    pub batch_fetch_backoff_ms: u64,

    /// Begin/write/commit attempts per write
    pub write_attempts: u32,
}

impl Default for SinkSettings {
    fn default() -> Self {
        Self {
            pool_size: 64,
            connection_ttl_minutes: 30,
            transaction_batch_size: 64,
            concurrent_writers: 4,
            batch_fetch_attempts: 4,
            batch_fetch_backoff_ms: 30,
            write_attempts: 3,
        }
    }
}

impl SinkSettings {
    /// Pool-facing view
    pub fn pool_settings(&self) -> PoolSettings {
        PoolSettings {
            max_size: self.pool_size,
            ttl: Duration::from_secs(self.connection_ttl_minutes.saturating_mul(60)),
        }
    }

    /// Stream-facing view
    pub fn stream_settings(&self) -> StreamSettings {
        StreamSettings {
            max_transactions: self.transaction_batch_size,
            batch_fetch_attempts: self.batch_fetch_attempts,
            batch_fetch_backoff: Duration::from_millis(self.batch_fetch_backoff_ms),
            write_attempts: self.write_attempts,
        }
    }
}

/// Connection pool settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PoolSettings {
    /// Maximum entry count
    pub max_size: usize,
    /// Idle time-to-live since last access
    pub ttl: Duration,
}

impl Default for PoolSettings {
    fn default() -> Self {
        SinkSettings::default().pool_settings()
    }
}

/// Partition stream settings
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StreamSettings {
    /// Transactions requested per batch
    pub max_transactions: u32,
    /// Fetch attempts on a transiently unavailable batch
    pub batch_fetch_attempts: u32,
    /// Fixed backoff between fetch attempts
    pub batch_fetch_backoff: Duration,
    /// Begin/write/commit attempts
    pub write_attempts: u32,
}

impl Default for StreamSettings {
    fn default() -> Self {
        SinkSettings::default().stream_settings()
    }
}
