//! Streaming store client abstraction
//!
//! Defines the traits the partition streams drive, supporting the real
//! transactional store client and in-memory test doubles.

use std::future::Future;

use bytes::Bytes;
use thiserror::Error;

use crate::EndpointId;

/// Error reported by the external store client.
///
/// Retry loops inspect [`StoreError::is_retryable`] and
/// [`StoreError::is_batch_unavailable`] instead of matching on the variant.
#[derive(Debug, Clone, Error)]
pub enum StoreError {
    /// Transport setup failed
    #[error("connection failed: {message}")]
    Connect { message: String },

    /// No fresh transaction batch could be leased right now
    #[error("transaction batch unavailable: {message}")]
    BatchUnavailable { message: String },

    /// Transport-level failure on an established connection
    #[error("transport error: {message}")]
    Transport { message: String, retryable: bool },

    /// Handle already closed or never opened
    #[error("handle closed: {message}")]
    Closed { message: String },
}

impl StoreError {
    pub fn connect(message: impl Into<String>) -> Self {
        Self::Connect {
            message: message.into(),
        }
    }

    pub fn batch_unavailable(message: impl Into<String>) -> Self {
        Self::BatchUnavailable {
            message: message.into(),
        }
    }

    /// Transport failure that a reconnect may cure
    pub fn retryable(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: true,
        }
    }

    /// Transport failure that no reconnect will cure
    pub fn fatal(message: impl Into<String>) -> Self {
        Self::Transport {
            message: message.into(),
            retryable: false,
        }
    }

    pub fn closed(message: impl Into<String>) -> Self {
        Self::Closed {
            message: message.into(),
        }
    }

    /// Whether a reconnect-and-retry may succeed
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::BatchUnavailable { .. } | Self::Closed { .. } => true,
            Self::Transport { retryable, .. } => *retryable,
            Self::Connect { .. } => false,
        }
    }

    /// Whether this is the transient "no batch right now" signal
    pub fn is_batch_unavailable(&self) -> bool {
        matches!(self, Self::BatchUnavailable { .. })
    }
}

/// Store client trait
///
/// Opens transport connections to individual endpoints.
pub trait StoreClient: Send + Sync + 'static {
    /// Connection handle type
    type Connection: StoreConnection;

    /// Connect to the endpoint's metastore
    fn connect(
        &self,
        endpoint: &EndpointId,
    ) -> impl Future<Output = Result<Self::Connection, StoreError>> + Send;
}

/// Live transport connection to one endpoint
pub trait StoreConnection: Send + 'static {
    /// Transaction batch handle type
    type Batch: TransactionBatch;

    /// Lease a batch permitting at most `max_transactions` begin/commit cycles
    ///
    /// Returns [`StoreError::BatchUnavailable`] when the store has no batch to
    /// hand out right now.
    fn fetch_batch(
        &mut self,
        max_transactions: u32,
    ) -> impl Future<Output = Result<Self::Batch, StoreError>> + Send;

    /// Close the connection
    ///
    /// Idempotent operation: returns Ok if already closed
    fn close(&mut self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

/// Leased, finite-use transaction batch
pub trait TransactionBatch: Send + 'static {
    /// Transactions still available in this batch
    fn remaining_transactions(&self) -> u32;

    /// Begin the next transaction (consumes one of the remaining transactions)
    fn begin(&mut self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Write a group of serialized records into the open transaction
    fn write(&mut self, records: &[Bytes]) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Commit the open transaction
    fn commit(&mut self) -> impl Future<Output = Result<(), StoreError>> + Send;

    /// Close the batch
    ///
    /// Idempotent operation: returns Ok if already closed
    fn close(&mut self) -> impl Future<Output = Result<(), StoreError>> + Send;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_retry_classification() {
        assert!(StoreError::batch_unavailable("busy").is_retryable());
        assert!(StoreError::batch_unavailable("busy").is_batch_unavailable());
        assert!(StoreError::retryable("reset").is_retryable());
        assert!(!StoreError::fatal("schema mismatch").is_retryable());
        assert!(!StoreError::connect("refused").is_retryable());
        assert!(!StoreError::retryable("reset").is_batch_unavailable());
    }
}
