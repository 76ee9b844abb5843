//! `info` command implementation.

use std::collections::BTreeMap;

use anyhow::{Context, Result};
use contracts::{
    ExportConfig, ENV_CONCURRENT_WRITERS, ENV_CONNECTION_TTL, ENV_POOL_SIZE,
    ENV_TRANSACTION_BATCH_SIZE,
};
use serde::Serialize;
use tracing::info;

use crate::cli::InfoArgs;
use crate::error::CliError;

/// Configuration info for JSON output
#[derive(Serialize)]
struct ConfigInfo<'a> {
    destination: DestinationInfo<'a>,
    sink: &'a contracts::SinkSettings,
    /// Environment knobs currently set, with their raw values
    #[serde(skip_serializing_if = "BTreeMap::is_empty")]
    environment: BTreeMap<&'static str, String>,
}

#[derive(Serialize)]
struct DestinationInfo<'a> {
    uri: &'a str,
    db: &'a str,
    table: &'a str,
    timezone: &'a str,
    unspecified_token: &'a str,
    skip_internal_fields: bool,
    partition_columns: &'a BTreeMap<String, Vec<String>>,
}

/// Execute the `info` command
pub fn run_info(args: &InfoArgs) -> Result<()> {
    info!(config = %args.config.display(), "Loading configuration info");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let config = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;

    let info = build_config_info(&config, |key| std::env::var(key).ok());
    if args.json {
        let json =
            serde_json::to_string_pretty(&info).context("Failed to serialize config info")?;
        println!("{}", json);
    } else {
        print_config_info(&info);
    }

    Ok(())
}

fn build_config_info<'a>(
    config: &'a ExportConfig,
    lookup: impl Fn(&str) -> Option<String>,
) -> ConfigInfo<'a> {
    let hive = &config.hive;
    let environment = [
        ENV_POOL_SIZE,
        ENV_CONNECTION_TTL,
        ENV_TRANSACTION_BATCH_SIZE,
        ENV_CONCURRENT_WRITERS,
    ]
    .into_iter()
    .filter_map(|key| lookup(key).map(|value| (key, value)))
    .collect();

    ConfigInfo {
        destination: DestinationInfo {
            uri: &hive.uri,
            db: &hive.db,
            table: &hive.table,
            timezone: &hive.timezone,
            unspecified_token: &hive.unspecified_token,
            skip_internal_fields: hive.skip_internal_fields,
            partition_columns: &hive.partition_columns,
        },
        sink: &config.sink,
        environment,
    }
}

fn print_config_info(info: &ConfigInfo<'_>) {
    let dest = &info.destination;
    println!("\n=== Hive Export Configuration ===\n");

    println!("Destination");
    println!("  Metastore: {}", dest.uri);
    println!("  Table: {}.{}", dest.db, dest.table);
    println!("  Time zone: {}", dest.timezone);
    println!("  Unspecified token: {}", dest.unspecified_token);
    println!("  Skip internal fields: {}", dest.skip_internal_fields);

    println!("\nPartition Columns ({})", dest.partition_columns.len());
    for (table, columns) in dest.partition_columns {
        println!("  - {}: {}", table, columns.join(", "));
    }

    let sink = info.sink;
    println!("\nSink");
    println!("  Pool size: {}", sink.pool_size);
    println!("  Connection TTL: {} min", sink.connection_ttl_minutes);
    println!("  Transactions per batch: {}", sink.transaction_batch_size);
    println!("  Writer lanes: {}", sink.concurrent_writers);
    println!(
        "  Batch fetch: {} attempts, {} ms backoff",
        sink.batch_fetch_attempts, sink.batch_fetch_backoff_ms
    );
    println!("  Write attempts: {}", sink.write_attempts);

    if !info.environment.is_empty() {
        println!("\nEnvironment overrides");
        for (key, value) in &info.environment {
            println!("  {}={}", key, value);
        }
    }
    println!();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_info_lists_set_environment_knobs() {
        let config = config_loader::ConfigLoader::load_from_str_with(
            "hive.uri=thrift://m:9083\nhive.db=d\nhive.table=t\n",
            config_loader::ConfigFormat::Properties,
            |_| None,
        )
        .unwrap();

        let info = build_config_info(&config, |key| {
            (key == ENV_POOL_SIZE).then(|| "12".to_string())
        });
        assert_eq!(info.environment.len(), 1);
        assert_eq!(info.environment[ENV_POOL_SIZE], "12");

        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["destination"]["table"], "t");
        assert_eq!(json["sink"]["pool_size"], 64);
    }
}
