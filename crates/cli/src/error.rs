//! Error types for CLI operations.

use thiserror::Error;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    /// Configuration file not found
    #[error("Configuration file not found: {path}")]
    ConfigNotFound { path: String },

    /// A replay input line is not an export row
    #[error("Invalid row at {path}:{line}: {message}")]
    RowParse {
        path: String,
        line: usize,
        message: String,
    },

    /// Blocks that could not be written after all restarts
    #[error("Replay finished with {failed} failed block(s)")]
    ReplayFailed { failed: usize },

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl CliError {
    pub fn config_not_found(path: impl Into<String>) -> Self {
        Self::ConfigNotFound { path: path.into() }
    }

    pub fn row_parse(path: impl Into<String>, line: usize, message: impl Into<String>) -> Self {
        Self::RowParse {
            path: path.into(),
            line,
            message: message.into(),
        }
    }
}
