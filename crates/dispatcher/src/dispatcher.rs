//! Dispatcher - fans record groups out to hash-selected lanes

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use bytes::Bytes;
use connection_pool::ConnectionPool;
use contracts::{BlockSink, EndpointId, RecordGroups, SinkError, SinkSettings, StoreClient};
use futures::future::join_all;
use tracing::{debug, error, info, instrument};

use crate::lane::{LaneHandle, Reply};
use crate::metrics::MetricsSnapshot;

/// Result of one submitted write
///
/// Dropping it does not cancel the write.
#[derive(Debug)]
pub struct PendingWrite {
    endpoint: EndpointId,
    lane: usize,
    reply: Reply,
}

impl PendingWrite {
    pub fn endpoint(&self) -> &EndpointId {
        &self.endpoint
    }

    pub fn lane(&self) -> usize {
        self.lane
    }

    /// Wait for the lane to finish the write
    ///
    /// A task that vanished without answering surfaces as a write failure.
    pub async fn wait(self) -> Result<(), SinkError> {
        match self.reply.await {
            Ok(result) => result,
            Err(_) => Err(SinkError::write(&self.endpoint, "write task interrupted")),
        }
    }
}

/// Sink dispatcher
///
/// Every write for an endpoint lands on the same lane, so writes per endpoint
/// are totally ordered while distinct endpoints proceed in parallel.
pub struct Dispatcher<C: StoreClient> {
    pool: Arc<ConnectionPool<C>>,
    lanes: Vec<LaneHandle>,
}

impl<C: StoreClient> Dispatcher<C> {
    /// Start `lane_count` lanes over `pool` (at least one)
    ///
    /// Must be called inside a tokio runtime.
    pub fn new(pool: Arc<ConnectionPool<C>>, lane_count: usize) -> Self {
        let lane_count = lane_count.max(1);
        let lanes = (0..lane_count)
            .map(|index| LaneHandle::spawn(index, Arc::clone(&pool)))
            .collect();
        info!(lanes = lane_count, "dispatcher started");
        Self { pool, lanes }
    }

    /// Build the pool and the lanes from the sink tunables
    pub fn from_settings(client: Arc<C>, settings: &SinkSettings) -> Self {
        let pool = Arc::new(ConnectionPool::from_sink_settings(client, settings));
        Self::new(pool, settings.concurrent_writers)
    }

    pub fn pool(&self) -> &Arc<ConnectionPool<C>> {
        &self.pool
    }

    pub fn lane_count(&self) -> usize {
        self.lanes.len()
    }

    /// Lane serving `endpoint`
    ///
    /// SipHash with fixed keys: stable for the life of the process.
    pub fn lane_for(&self, endpoint: &EndpointId) -> usize {
        let mut hasher = DefaultHasher::new();
        endpoint.hash(&mut hasher);
        (hasher.finish() % self.lanes.len() as u64) as usize
    }

    /// Queue a write on the endpoint's lane
    ///
    /// # Errors
    /// `SinkError::Dispatch` right away if that lane is shut down; the pool is
    /// not touched.
    pub fn submit(&self, endpoint: EndpointId, records: Vec<Bytes>) -> Result<PendingWrite, SinkError> {
        let lane = self.lane_for(&endpoint);
        let reply = self.lanes[lane].submit(endpoint.clone(), records)?;
        Ok(PendingWrite {
            endpoint,
            lane,
            reply,
        })
    }

    /// Write every group and wait for all of them
    ///
    /// All groups are submitted before any is awaited.
    ///
    /// # Errors
    /// The first failure, as a `SinkError::Write` tagged with its endpoint.
    #[instrument(name = "dispatcher_write", skip(self, records), fields(endpoints = records.len()))]
    pub async fn write(&self, records: RecordGroups) -> Result<(), SinkError> {
        let mut first_error = None;
        let mut pending = Vec::with_capacity(records.len());

        for (endpoint, group) in records {
            match self.submit(endpoint.clone(), group) {
                Ok(p) => pending.push(p),
                Err(e) => {
                    first_error.get_or_insert(e.into_write(&endpoint));
                }
            }
        }

        let results = join_all(pending.into_iter().map(|p| async move {
            let endpoint = p.endpoint().clone();
            p.wait().await.map_err(|e| e.into_write(&endpoint))
        }))
        .await;

        for result in results {
            if let Err(e) = result {
                first_error.get_or_insert(e);
            }
        }

        match first_error {
            Some(e) => {
                error!(error = %e, "block write failed");
                Err(e)
            }
            None => Ok(()),
        }
    }

    /// Reap idle pooled streams
    pub async fn maintenance(&self) {
        debug!(pooled = self.pool.len(), "dispatcher maintenance");
        self.pool.maintenance().await;
    }

    /// Stop every lane, drain queued writes, then close all pooled streams
    ///
    /// New submissions fail immediately from the first moment. Safe to call
    /// more than once.
    #[instrument(name = "dispatcher_shutdown", skip(self))]
    pub async fn shutdown(&self) {
        let workers: Vec<_> = self.lanes.iter().filter_map(LaneHandle::close).collect();
        for worker in workers {
            if let Err(e) = worker.await {
                error!(error = ?e, "lane worker panicked");
            }
        }
        self.pool.invalidate_all().await;
        info!("dispatcher shutdown complete");
    }

    /// Metrics for every lane
    pub fn metrics(&self) -> Vec<(usize, MetricsSnapshot)> {
        self.lanes
            .iter()
            .map(|lane| (lane.index(), lane.metrics().snapshot()))
            .collect()
    }
}

impl<C: StoreClient> BlockSink for Dispatcher<C> {
    async fn write(&self, records: RecordGroups) -> Result<(), SinkError> {
        Dispatcher::write(self, records).await
    }

    async fn maintenance(&self) {
        Dispatcher::maintenance(self).await
    }
}
