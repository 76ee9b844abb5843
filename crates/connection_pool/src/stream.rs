//! PartitionStream - one live connection and one leased transaction batch
//!
//! States: disconnected -> connected (no batch) -> connected (batch open)
//! -> connected (batch exhausted) -> closed.
//!
//! Batches are lease-like: they run out after a bounded number of
//! transactions, so every write checks and renews before use. A transiently
//! unavailable batch is retried with a fixed backoff and then a full
//! reconnect; a retryable transactional failure reconnects and replays the
//! whole begin/write/commit unit.

use std::sync::Arc;

use bytes::Bytes;
use contracts::{
    EndpointId, SinkError, StoreClient, StoreConnection, StoreError, StreamSettings,
    TransactionBatch,
};
use tracing::{debug, error, instrument, trace, warn};

type BatchOf<C> = <<C as StoreClient>::Connection as StoreConnection>::Batch;

/// Streaming connection to one endpoint
///
/// Not internally synchronized: the pool hands it out behind a mutex and the
/// dispatcher only ever drives an endpoint from one lane.
pub struct PartitionStream<C: StoreClient> {
    endpoint: EndpointId,
    client: Arc<C>,
    settings: StreamSettings,
    connection: Option<C::Connection>,
    batch: Option<BatchOf<C>>,
    batch_renewals: u64,
    reconnects: u64,
    closed: bool,
}

impl<C: StoreClient> PartitionStream<C> {
    /// Connect to `endpoint` and lease the first transaction batch
    ///
    /// # Errors
    /// - `SinkError::Connect` if the transport cannot be set up
    /// - `SinkError::Write` if no batch can be leased
    #[instrument(
        name = "partition_stream_open",
        skip(client, settings),
        fields(endpoint = %endpoint)
    )]
    pub async fn open(
        client: Arc<C>,
        endpoint: EndpointId,
        settings: StreamSettings,
    ) -> Result<Self, SinkError> {
        let mut stream = Self {
            endpoint,
            client,
            settings,
            connection: None,
            batch: None,
            batch_renewals: 0,
            reconnects: 0,
            closed: false,
        };
        stream.connect().await?;
        stream.ensure_batch().await?;
        Ok(stream)
    }

    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    /// Whether a transport connection is held
    pub fn is_connected(&self) -> bool {
        self.connection.is_some()
    }

    /// Whether a transaction batch is held (possibly exhausted)
    pub fn has_batch(&self) -> bool {
        self.batch.is_some()
    }

    /// Transactions left in the current batch, `None` without a batch
    pub fn remaining_transactions(&self) -> Option<u32> {
        self.batch.as_ref().map(TransactionBatch::remaining_transactions)
    }

    /// Whether [`PartitionStream::close`] was called
    ///
    /// A closed stream refuses writes; failures inside the stream only drop
    /// the batch or the connection and the next write re-acquires them.
    pub fn is_closed(&self) -> bool {
        self.closed
    }

    /// Batches leased over the stream's lifetime
    pub fn batch_renewals(&self) -> u64 {
        self.batch_renewals
    }

    /// Full reconnects over the stream's lifetime
    pub fn reconnects(&self) -> u64 {
        self.reconnects
    }

    /// Write a group of records as one transaction
    ///
    /// No-op on an empty group. Retryable transactional failures reconnect and
    /// replay the unit up to `write_attempts` times in total.
    ///
    /// # Errors
    /// `SinkError::Write` carrying the endpoint and the last cause.
    #[instrument(
        name = "partition_stream_write",
        skip(self, records),
        fields(endpoint = %self.endpoint, records = records.len())
    )]
    pub async fn write(&mut self, records: &[Bytes]) -> Result<(), SinkError> {
        if records.is_empty() {
            return Ok(());
        }

        self.ensure_batch()
            .await
            .map_err(|e| e.into_write(&self.endpoint))?;

        let attempts = self.settings.write_attempts.max(1);
        let mut attempt = 1;
        loop {
            match self.transact(records).await {
                Ok(()) => {
                    trace!(attempt, "transaction committed");
                    observability::record_commit(self.endpoint.table(), records.len());
                    return Ok(());
                }
                Err(e) if e.is_retryable() && attempt < attempts => {
                    warn!(
                        endpoint = %self.endpoint,
                        attempt,
                        error = %e,
                        "transactional write failed, reconnecting"
                    );
                    attempt += 1;
                    self.reconnect("write")
                        .await
                        .map_err(|e| e.into_write(&self.endpoint))?;
                    self.ensure_batch()
                        .await
                        .map_err(|e| e.into_write(&self.endpoint))?;
                }
                Err(e) => {
                    error!(
                        endpoint = %self.endpoint,
                        attempt,
                        error = %e,
                        "failed to write to endpoint"
                    );
                    observability::record_write_failure(self.endpoint.table());
                    self.discard_batch().await;
                    return Err(SinkError::write(&self.endpoint, e));
                }
            }
        }
    }

    /// Make sure a batch with at least one remaining transaction is held
    ///
    /// An exhausted batch is closed (errors ignored) and replaced.
    pub async fn ensure_batch(&mut self) -> Result<(), SinkError> {
        if self.closed {
            return Err(SinkError::write(
                &self.endpoint,
                StoreError::closed("stream closed"),
            ));
        }

        if self
            .batch
            .as_ref()
            .is_some_and(|b| b.remaining_transactions() > 0)
        {
            return Ok(());
        }

        if let Some(mut stale) = self.batch.take() {
            if let Err(e) = stale.close().await {
                debug!(endpoint = %self.endpoint, error = %e, "ignoring stale batch close error");
            }
        }

        if self.connection.is_none() {
            self.connect().await?;
        }

        let attempts = self.settings.batch_fetch_attempts.max(1);
        let mut attempts_left = attempts;
        let mut reconnected = false;

        loop {
            let fetched = match self.connection.as_mut() {
                Some(conn) => conn.fetch_batch(self.settings.max_transactions).await,
                None => Err(StoreError::closed("no open connection")),
            };

            match fetched {
                Ok(batch) => {
                    self.batch = Some(batch);
                    self.batch_renewals += 1;
                    observability::record_batch_renewal(self.endpoint.table());
                    debug!(
                        endpoint = %self.endpoint,
                        max_transactions = self.settings.max_transactions,
                        "transaction batch leased"
                    );
                    return Ok(());
                }
                Err(e) if e.is_batch_unavailable() => {
                    attempts_left -= 1;
                    if attempts_left > 0 {
                        debug!(endpoint = %self.endpoint, attempts_left, "transaction batch unavailable, backing off");
                        tokio::time::sleep(self.settings.batch_fetch_backoff).await;
                    } else if !reconnected {
                        warn!(
                            endpoint = %self.endpoint,
                            attempts,
                            "transaction batch unavailable, reconnecting"
                        );
                        reconnected = true;
                        attempts_left = 1;
                        self.reconnect("batch_unavailable").await?;
                    } else {
                        self.release().await;
                        error!(endpoint = %self.endpoint, error = %e, "failed to get transaction batch");
                        return Err(SinkError::write(&self.endpoint, e));
                    }
                }
                Err(e) => {
                    self.release().await;
                    error!(endpoint = %self.endpoint, error = %e, "failed to get transaction batch");
                    return Err(SinkError::write(&self.endpoint, e));
                }
            }
        }
    }

    /// Release the batch and the connection for good
    ///
    /// Secondary errors are swallowed; safe to call any number of times.
    pub async fn close(&mut self) {
        self.closed = true;
        self.release().await;
    }

    /// Drop the batch along with any transaction left open in it
    async fn discard_batch(&mut self) {
        if let Some(mut batch) = self.batch.take() {
            if let Err(e) = batch.close().await {
                debug!(endpoint = %self.endpoint, error = %e, "ignoring batch close error");
            }
        }
    }

    async fn release(&mut self) {
        self.discard_batch().await;
        if let Some(mut conn) = self.connection.take() {
            if let Err(e) = conn.close().await {
                debug!(endpoint = %self.endpoint, error = %e, "ignoring connection close error");
            }
        }
    }

    async fn connect(&mut self) -> Result<(), SinkError> {
        match self.client.connect(&self.endpoint).await {
            Ok(conn) => {
                self.connection = Some(conn);
                debug!(endpoint = %self.endpoint, "connected");
                Ok(())
            }
            Err(e) => {
                error!(endpoint = %self.endpoint, error = %e, "failed to connect");
                Err(SinkError::connect(&self.endpoint, e))
            }
        }
    }

    async fn reconnect(&mut self, reason: &str) -> Result<(), SinkError> {
        self.release().await;
        self.reconnects += 1;
        observability::record_reconnect(self.endpoint.table(), reason);
        self.connect().await
    }

    async fn transact(&mut self, records: &[Bytes]) -> Result<(), StoreError> {
        let batch = self
            .batch
            .as_mut()
            .ok_or_else(|| StoreError::closed("no open transaction batch"))?;
        batch.begin().await?;
        batch.write(records).await?;
        batch.commit().await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock_store::MemoryStore;
    use std::time::Duration;

    fn endpoint() -> EndpointId {
        EndpointId::new("thrift://meta:9083", "db", "events", vec!["eu".into()]).unwrap()
    }

    fn settings(max_transactions: u32) -> StreamSettings {
        StreamSettings {
            max_transactions,
            batch_fetch_attempts: 4,
            batch_fetch_backoff: Duration::from_millis(30),
            write_attempts: 3,
        }
    }

    fn records(values: &[&'static str]) -> Vec<Bytes> {
        values.iter().map(|v| Bytes::from_static(v.as_bytes())).collect()
    }

    #[tokio::test]
    async fn test_open_connects_and_leases_batch() {
        let store = Arc::new(MemoryStore::new());
        let stream = PartitionStream::open(Arc::clone(&store), endpoint(), settings(64))
            .await
            .unwrap();

        assert!(stream.is_connected());
        assert_eq!(stream.remaining_transactions(), Some(64));
        assert_eq!(store.connections_opened(), 1);
        assert_eq!(store.batches_fetched(), 1);
    }

    #[tokio::test]
    async fn test_open_fails_with_connect_failure() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_connects(1);

        let err = PartitionStream::open(Arc::clone(&store), endpoint(), settings(64))
            .await
            .err()
            .unwrap();
        assert!(matches!(err, SinkError::Connect { .. }));
        assert!(err.to_string().contains("db.events"));
    }

    #[tokio::test]
    async fn test_empty_write_is_noop() {
        let store = Arc::new(MemoryStore::new());
        let mut stream = PartitionStream::open(Arc::clone(&store), endpoint(), settings(1))
            .await
            .unwrap();

        stream.write(&[]).await.unwrap();
        assert_eq!(store.transactions_begun(), 0);
        assert_eq!(stream.remaining_transactions(), Some(1));
    }

    #[tokio::test]
    async fn test_exhausted_batch_renewed_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let mut stream = PartitionStream::open(Arc::clone(&store), endpoint(), settings(2))
            .await
            .unwrap();

        stream.write(&records(&["a"])).await.unwrap();
        stream.write(&records(&["b"])).await.unwrap();
        assert_eq!(stream.remaining_transactions(), Some(0));
        assert_eq!(stream.batch_renewals(), 1);

        stream.write(&records(&["c"])).await.unwrap();
        assert_eq!(stream.batch_renewals(), 2);
        assert_eq!(store.batches_fetched(), 2);
        assert_eq!(store.batches_closed(), 1);
        assert_eq!(stream.remaining_transactions(), Some(1));
        assert_eq!(store.committed_records(&endpoint()), records(&["a", "b", "c"]));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_unavailable_is_retried_with_backoff() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_batch_fetches(3);

        let started = tokio::time::Instant::now();
        let stream = PartitionStream::open(Arc::clone(&store), endpoint(), settings(8))
            .await
            .unwrap();

        assert!(stream.has_batch());
        assert_eq!(stream.reconnects(), 0);
        assert_eq!(started.elapsed(), Duration::from_millis(90));
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_unavailable_reconnects_then_retries_once() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_batch_fetches(4);

        let stream = PartitionStream::open(Arc::clone(&store), endpoint(), settings(8))
            .await
            .unwrap();

        assert_eq!(stream.reconnects(), 1);
        assert_eq!(store.connections_opened(), 2);
        assert_eq!(store.connections_closed(), 1);
        assert!(stream.has_batch());
    }

    #[tokio::test(start_paused = true)]
    async fn test_batch_unavailable_after_reconnect_is_write_failure() {
        let store = Arc::new(MemoryStore::new());
        store.fail_next_batch_fetches(5);

        let err = PartitionStream::open(Arc::clone(&store), endpoint(), settings(8))
            .await
            .err()
            .unwrap();
        assert!(err.is_write_failure());
        assert_eq!(store.open_connections(), 0);
    }

    #[tokio::test]
    async fn test_fatal_fetch_closes_everything() {
        let store = Arc::new(MemoryStore::new());
        let mut stream = PartitionStream::open(Arc::clone(&store), endpoint(), settings(1))
            .await
            .unwrap();
        stream.write(&records(&["a"])).await.unwrap();

        store.fail_next_fetches_fatally(1);
        let err = stream.write(&records(&["b"])).await.unwrap_err();
        assert!(err.is_write_failure());
        assert!(!stream.is_connected());
        assert!(!stream.has_batch());
        assert_eq!(store.batches_fetched(), 1);
    }

    #[tokio::test]
    async fn test_retryable_commit_failure_commits_exactly_once() {
        let store = Arc::new(MemoryStore::new());
        let mut stream = PartitionStream::open(Arc::clone(&store), endpoint(), settings(64))
            .await
            .unwrap();

        store.fail_next_commits(1);
        stream.write(&records(&["r1", "r2"])).await.unwrap();

        let committed = store.committed();
        assert_eq!(committed.len(), 1);
        assert_eq!(committed[0].records, records(&["r1", "r2"]));
        assert_eq!(stream.reconnects(), 1);
        assert_eq!(store.open_connections(), 1);
    }

    #[tokio::test]
    async fn test_retries_are_bounded() {
        let store = Arc::new(MemoryStore::new());
        let mut stream = PartitionStream::open(Arc::clone(&store), endpoint(), settings(64))
            .await
            .unwrap();

        store.fail_next_commits(3);
        let err = stream.write(&records(&["r1"])).await.unwrap_err();
        assert!(err.is_write_failure());
        assert!(err.to_string().contains("injected commit failure"));
        assert_eq!(store.commit_attempts(), 3);
        assert!(store.committed().is_empty());
    }

    #[tokio::test]
    async fn test_fatal_commit_failure_is_not_retried() {
        let store = Arc::new(MemoryStore::new());
        let mut stream = PartitionStream::open(Arc::clone(&store), endpoint(), settings(64))
            .await
            .unwrap();

        store.fail_next_commits_fatally(1);
        let err = stream.write(&records(&["r1"])).await.unwrap_err();
        assert!(err.is_write_failure());
        assert_eq!(store.commit_attempts(), 1);
        assert_eq!(stream.reconnects(), 0);
    }

    #[tokio::test]
    async fn test_reconnect_failure_during_retry_is_write_failure() {
        let store = Arc::new(MemoryStore::new());
        let mut stream = PartitionStream::open(Arc::clone(&store), endpoint(), settings(64))
            .await
            .unwrap();

        store.fail_next_commits(1);
        store.fail_next_connects(1);
        let err = stream.write(&records(&["r1"])).await.unwrap_err();
        assert!(err.is_write_failure());
        assert!(!stream.is_connected());
    }

    #[tokio::test]
    async fn test_stream_usable_after_failed_write() {
        let store = Arc::new(MemoryStore::new());
        let mut stream = PartitionStream::open(Arc::clone(&store), endpoint(), settings(64))
            .await
            .unwrap();

        store.fail_next_commits_fatally(1);
        stream.write(&records(&["lost"])).await.unwrap_err();
        assert!(!stream.is_closed());
        assert!(stream.is_connected());
        assert!(!stream.has_batch());

        stream.write(&records(&["kept"])).await.unwrap();
        assert_eq!(store.committed_records(&endpoint()), records(&["kept"]));
        assert_eq!(store.batches_fetched(), 2);
        assert_eq!(store.batches_closed(), 1);
        assert_eq!(store.connections_opened(), 1);
    }

    #[tokio::test]
    async fn test_exhausted_retries_discard_batch() {
        let store = Arc::new(MemoryStore::new());
        let mut stream = PartitionStream::open(Arc::clone(&store), endpoint(), settings(64))
            .await
            .unwrap();

        store.fail_next_commits(3);
        stream.write(&records(&["r1"])).await.unwrap_err();
        assert!(!stream.has_batch());

        stream.write(&records(&["r2"])).await.unwrap();
        assert_eq!(store.committed_records(&endpoint()), records(&["r2"]));
        assert_eq!(stream.remaining_transactions(), Some(63));
    }

    #[tokio::test]
    async fn test_write_after_close_is_refused() {
        let store = Arc::new(MemoryStore::new());
        let mut stream = PartitionStream::open(Arc::clone(&store), endpoint(), settings(64))
            .await
            .unwrap();

        stream.close().await;
        let err = stream.write(&records(&["r1"])).await.unwrap_err();
        assert!(err.is_write_failure());
        assert!(stream.is_closed());
        assert_eq!(store.connections_opened(), 1);
    }

    #[tokio::test]
    async fn test_close_is_idempotent() {
        let store = Arc::new(MemoryStore::new());
        let mut stream = PartitionStream::open(Arc::clone(&store), endpoint(), settings(64))
            .await
            .unwrap();

        stream.close().await;
        stream.close().await;

        assert!(!stream.is_connected());
        assert!(!stream.has_batch());
        assert_eq!(store.connections_closed(), 1);
        assert_eq!(store.batches_closed(), 1);
    }
}
