//! `replay` command implementation.

use std::path::Path;

use anyhow::{Context, Result};
use contracts::ExportRow;
use tracing::info;

use crate::cli::ReplayArgs;
use crate::error::CliError;
use crate::pipeline::{ReplayConfig, ReplayPipeline};

/// Execute the `replay` command
pub async fn run_replay(args: &ReplayArgs) -> Result<()> {
    info!(config = %args.config.display(), rows = %args.rows.display(), "Loading configuration");

    if !args.config.exists() {
        return Err(CliError::config_not_found(args.config.display().to_string()).into());
    }

    let export = config_loader::ConfigLoader::load_from_path(&args.config)
        .with_context(|| format!("Failed to load config from {}", args.config.display()))?;
    let rows = read_rows(&args.rows)?;

    info!(
        destination = %format!("{}/{}.{}", export.hive.uri, export.hive.db, export.hive.table),
        rows = rows.len(),
        lanes = export.sink.concurrent_writers,
        "Configuration loaded"
    );

    let pipeline = ReplayPipeline::new(ReplayConfig {
        export,
        rows,
        block_size: args.block_size,
        max_restarts: args.max_restarts,
    });
    let stats = pipeline.run().await.context("Replay failed")?;

    if args.json {
        let json = serde_json::to_string_pretty(&stats).context("Failed to serialize stats")?;
        println!("{}", json);
    } else {
        stats.print_summary();
    }

    if stats.blocks_failed > 0 {
        return Err(CliError::ReplayFailed {
            failed: stats.blocks_failed as usize,
        }
        .into());
    }
    Ok(())
}

/// Read one export row per non-blank line
fn read_rows(path: &Path) -> Result<Vec<ExportRow>, CliError> {
    let content = std::fs::read_to_string(path)?;
    content
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(idx, line)| {
            serde_json::from_str(line).map_err(|e| {
                CliError::row_parse(path.display().to_string(), idx + 1, e.to_string())
            })
        })
        .collect()
}
