//! CLI argument definitions using clap.

use clap::{Parser, Subcommand, ValueEnum};
use std::path::PathBuf;

/// Hive Export - partitioned streaming export sink tooling
#[derive(Parser, Debug)]
#[command(
    name = "hive-export",
    author,
    version,
    about = "Partitioned Hive streaming export sink",
    long_about = "Operator tooling for the Hive streaming export sink.\n\n\
                  Validates export configuration, shows the effective sink settings \n\
                  after environment overrides, and replays captured rows through the \n\
                  decoder, dispatcher and connection pool against an in-memory store."
)]
pub struct Cli {
    /// Increase logging verbosity (-v for debug, -vv for trace)
    #[arg(short, long, action = clap::ArgAction::Count, global = true, env = "HIVE_EXPORT_VERBOSE")]
    pub verbose: u8,

    /// Suppress all output except errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Log output format
    #[arg(
        long,
        value_enum,
        default_value = "pretty",
        global = true,
        env = "HIVE_EXPORT_LOG_FORMAT"
    )]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Commands,
}

/// Available CLI commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Validate configuration file
    Validate(ValidateArgs),

    /// Display effective configuration (after environment overrides)
    Info(InfoArgs),

    /// Replay captured rows through the sink against an in-memory store
    Replay(ReplayArgs),
}

/// Arguments for the `validate` command
#[derive(Parser, Debug)]
pub struct ValidateArgs {
    /// Path to configuration file (TOML, JSON or .properties)
    #[arg(short, long, default_value = "export.toml", env = "HIVE_EXPORT_CONFIG")]
    pub config: PathBuf,

    /// Output validation result as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `info` command
#[derive(Parser, Debug)]
pub struct InfoArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "export.toml", env = "HIVE_EXPORT_CONFIG")]
    pub config: PathBuf,

    /// Output as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the `replay` command
#[derive(Parser, Debug, Clone)]
pub struct ReplayArgs {
    /// Path to configuration file
    #[arg(short, long, default_value = "export.toml", env = "HIVE_EXPORT_CONFIG")]
    pub config: PathBuf,

    /// JSON Lines file, one export row per line
    #[arg(long)]
    pub rows: PathBuf,

    /// Rows per block for each source
    #[arg(long, default_value = "100")]
    pub block_size: usize,

    /// Times a block is replayed after a restartable failure
    #[arg(long, default_value = "3")]
    pub max_restarts: u32,

    /// Output the replay report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Log output format
#[derive(ValueEnum, Clone, Copy, Debug, Default)]
pub enum LogFormat {
    /// JSON structured logging
    Json,
    /// Human-readable pretty format
    #[default]
    Pretty,
    /// Compact single-line format
    Compact,
}

impl From<LogFormat> for observability::LogFormat {
    fn from(format: LogFormat) -> Self {
        match format {
            LogFormat::Json => Self::Json,
            LogFormat::Pretty => Self::Pretty,
            LogFormat::Compact => Self::Compact,
        }
    }
}
