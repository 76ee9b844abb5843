//! LaneHandle - one single-writer lane with its queue and worker task

use std::sync::Arc;

use bytes::Bytes;
use connection_pool::ConnectionPool;
use contracts::{EndpointId, SinkError, StoreClient};
use parking_lot::Mutex;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, instrument, warn};

use crate::metrics::LaneMetrics;

/// Reply channel for one write task
pub(crate) type Reply = oneshot::Receiver<Result<(), SinkError>>;

/// One queued write
struct WriteTask {
    endpoint: EndpointId,
    records: Vec<Bytes>,
    reply: oneshot::Sender<Result<(), SinkError>>,
}

/// Handle to a running lane worker
///
/// Tasks run strictly one after another in submission order.
pub struct LaneHandle {
    index: usize,
    /// `None` once the lane is shut down
    tx: Mutex<Option<mpsc::UnboundedSender<WriteTask>>>,
    metrics: Arc<LaneMetrics>,
    worker_handle: Mutex<Option<JoinHandle<()>>>,
}

impl LaneHandle {
    /// Create a lane and spawn its worker task
    pub fn spawn<C: StoreClient>(index: usize, pool: Arc<ConnectionPool<C>>) -> Self {
        let (tx, rx) = mpsc::unbounded_channel();
        let metrics = Arc::new(LaneMetrics::new());

        let worker_metrics = Arc::clone(&metrics);
        let worker_handle = tokio::spawn(async move {
            lane_worker(index, pool, rx, worker_metrics).await;
        });

        Self {
            index,
            tx: Mutex::new(Some(tx)),
            metrics,
            worker_handle: Mutex::new(Some(worker_handle)),
        }
    }

    pub fn index(&self) -> usize {
        self.index
    }

    pub fn metrics(&self) -> &Arc<LaneMetrics> {
        &self.metrics
    }

    /// Whether the lane still accepts submissions
    pub fn is_open(&self) -> bool {
        self.tx.lock().is_some()
    }

    /// Queue a write (non-blocking)
    ///
    /// # Errors
    /// `SinkError::Dispatch` if the lane is shut down or its worker is gone.
    pub(crate) fn submit(&self, endpoint: EndpointId, records: Vec<Bytes>) -> Result<Reply, SinkError> {
        let guard = self.tx.lock();
        let Some(tx) = guard.as_ref() else {
            self.metrics.inc_rejected();
            observability::record_rejected_submission(self.index);
            warn!(lane = self.index, endpoint = %endpoint, "lane is shut down, submission rejected");
            return Err(SinkError::dispatch(format!("lane {} is shut down", self.index)));
        };

        let (reply, rx) = oneshot::channel();
        let depth = self.metrics.inc_queued();
        if tx
            .send(WriteTask {
                endpoint,
                records,
                reply,
            })
            .is_err()
        {
            self.metrics.dec_queued();
            error!(lane = self.index, "lane worker stopped unexpectedly");
            return Err(SinkError::dispatch(format!(
                "lane {} worker is not running",
                self.index
            )));
        }
        observability::record_lane_queue_depth(self.index, depth);
        Ok(rx)
    }

    /// Stop accepting submissions
    ///
    /// Returns the worker handle the first time; already-queued tasks still run.
    pub(crate) fn close(&self) -> Option<JoinHandle<()>> {
        self.tx.lock().take();
        self.worker_handle.lock().take()
    }
}

/// Worker task that drains the lane queue
#[instrument(name = "lane_worker_loop", skip(index, pool, rx, metrics), fields(lane = index))]
async fn lane_worker<C: StoreClient>(
    index: usize,
    pool: Arc<ConnectionPool<C>>,
    mut rx: mpsc::UnboundedReceiver<WriteTask>,
    metrics: Arc<LaneMetrics>,
) {
    debug!(lane = index, "lane worker started");

    while let Some(task) = rx.recv().await {
        let depth = metrics.dec_queued();
        observability::record_lane_queue_depth(index, depth);

        let result = write_through_pool(&pool, &task.endpoint, &task.records).await;
        match &result {
            Ok(()) => metrics.inc_completed(),
            Err(e) => {
                metrics.inc_failed();
                error!(
                    lane = index,
                    endpoint = %task.endpoint,
                    records = task.records.len(),
                    error = %e,
                    "write task failed"
                );
            }
        }
        // caller may have stopped waiting
        let _ = task.reply.send(result);
    }

    debug!(lane = index, "lane worker stopped");
}

/// Re-fetches allowed when the pooled stream was closed under us
const STALE_STREAM_RETRIES: usize = 3;

/// Borrow the endpoint's stream and write; evict it on a write failure
async fn write_through_pool<C: StoreClient>(
    pool: &ConnectionPool<C>,
    endpoint: &EndpointId,
    records: &[Bytes],
) -> Result<(), SinkError> {
    let mut stream = pool.get(endpoint).await?.lock_owned().await;
    // removed from the pool between get and lock
    for _ in 0..STALE_STREAM_RETRIES {
        if !stream.is_closed() {
            break;
        }
        drop(stream);
        stream = pool.get(endpoint).await?.lock_owned().await;
    }

    let result = stream.write(records).await;
    drop(stream);

    if let Err(e) = &result {
        if e.is_write_failure() {
            pool.evict(endpoint).await;
        }
    }
    result
}
