//! BlockSink trait - export decoder output interface
//!
//! The host adapter hands every harvested block to a sink; the dispatcher is
//! the production implementation.

use crate::{RecordGroups, SinkError};

/// Block output trait
///
/// Implementations must be safe to share between the decoders of every
/// advertised source.
#[trait_variant::make(BlockSink: Send)]
pub trait LocalBlockSink {
    /// Durably write one block of records, grouped by endpoint
    ///
    /// # Errors
    /// Returns the first endpoint failure (should include endpoint and cause)
    async fn write(&self, records: RecordGroups) -> Result<(), SinkError>;

    /// Reap idle or expired connections promptly
    async fn maintenance(&self);
}
