//! Block failure reported back to the host

use contracts::BoxError;
use thiserror::Error;

/// The host should restart (replay) the current block
///
/// `retry` tells the host whether replaying can succeed.
#[derive(Debug, Error)]
#[error("{message}")]
pub struct RestartBlock {
    message: String,
    retry: bool,
    #[source]
    source: Option<BoxError>,
}

impl RestartBlock {
    /// Restart carrying `cause`; the message embeds it
    pub fn new(context: &str, cause: impl Into<BoxError>, retry: bool) -> Self {
        let cause = cause.into();
        Self {
            message: format!("{context}: {cause}"),
            retry,
            source: Some(cause),
        }
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn is_retryable(&self) -> bool {
        self.retry
    }
}
