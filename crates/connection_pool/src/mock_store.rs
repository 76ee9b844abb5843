//! 内存事务存储
//!
//! 用于单元测试与离线重放的 `StoreClient` 实现，支持注入失败场景：
//! 连接失败、批次暂不可用、致命获取错误、可重试/致命提交失败、连接与提交延迟。

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use contracts::{
    EndpointId, StoreClient, StoreConnection, StoreError, TransactionBatch,
};
use parking_lot::Mutex;
use tracing::instrument;

/// 一次已提交的事务
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommittedTransaction {
    pub endpoint: EndpointId,
    pub records: Vec<Bytes>,
}

/// 待触发的失败（每个计数器消费一次减一）
#[derive(Debug, Default)]
struct Faults {
    connect_failures: u32,
    batch_unavailable: u32,
    fatal_fetches: u32,
    commit_failures: u32,
    fatal_commits: u32,
    connect_delay: Option<Duration>,
    commit_delay: Option<Duration>,
    /// 这些 endpoint 的提交总是致命失败
    poisoned: HashSet<EndpointId>,
}

#[derive(Debug, Default)]
struct Counters {
    connections_opened: u64,
    connections_closed: u64,
    batches_fetched: u64,
    batches_closed: u64,
    transactions_begun: u64,
    commit_attempts: u64,
    commits_in_flight: u64,
    max_commits_in_flight: u64,
}

#[derive(Debug, Default)]
struct StoreState {
    faults: Mutex<Faults>,
    counters: Mutex<Counters>,
    committed: Mutex<Vec<CommittedTransaction>>,
}

impl StoreState {
    fn take(&self, pick: impl FnOnce(&mut Faults) -> &mut u32) -> bool {
        let mut faults = self.faults.lock();
        let slot = pick(&mut faults);
        if *slot > 0 {
            *slot -= 1;
            true
        } else {
            false
        }
    }
}

/// 内存存储客户端
///
/// 克隆共享同一份状态。
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    state: Arc<StoreState>,
}

impl MemoryStore {
    /// 创建无故障的存储
    pub fn new() -> Self {
        Self::default()
    }

    // ===== 故障注入 =====

    /// 接下来 `n` 次连接失败
    pub fn fail_next_connects(&self, n: u32) {
        self.state.faults.lock().connect_failures += n;
    }

    /// 接下来 `n` 次批次获取返回“暂不可用”
    pub fn fail_next_batch_fetches(&self, n: u32) {
        self.state.faults.lock().batch_unavailable += n;
    }

    /// 接下来 `n` 次批次获取致命失败
    pub fn fail_next_fetches_fatally(&self, n: u32) {
        self.state.faults.lock().fatal_fetches += n;
    }

    /// 接下来 `n` 次提交可重试失败
    pub fn fail_next_commits(&self, n: u32) {
        self.state.faults.lock().commit_failures += n;
    }

    /// 接下来 `n` 次提交致命失败
    pub fn fail_next_commits_fatally(&self, n: u32) {
        self.state.faults.lock().fatal_commits += n;
    }

    /// 每次连接前等待 `delay`
    pub fn set_connect_delay(&self, delay: Duration) {
        self.state.faults.lock().connect_delay = Some(delay);
    }

    /// 每次提交落盘前等待 `delay`
    pub fn set_commit_delay(&self, delay: Duration) {
        self.state.faults.lock().commit_delay = Some(delay);
    }

    /// 该 endpoint 的所有提交致命失败，直到 [`MemoryStore::heal_endpoint`]
    pub fn poison_endpoint(&self, endpoint: &EndpointId) {
        self.state.faults.lock().poisoned.insert(endpoint.clone());
    }

    pub fn heal_endpoint(&self, endpoint: &EndpointId) {
        self.state.faults.lock().poisoned.remove(endpoint);
    }

    // ===== 查询 =====

    /// 按提交顺序返回所有事务
    pub fn committed(&self) -> Vec<CommittedTransaction> {
        self.state.committed.lock().clone()
    }

    /// 某 endpoint 已提交的全部记录（按提交顺序展开）
    pub fn committed_records(&self, endpoint: &EndpointId) -> Vec<Bytes> {
        self.state
            .committed
            .lock()
            .iter()
            .filter(|t| &t.endpoint == endpoint)
            .flat_map(|t| t.records.iter().cloned())
            .collect()
    }

    /// 当前仍打开的连接数
    pub fn open_connections(&self) -> u64 {
        let c = self.state.counters.lock();
        c.connections_opened - c.connections_closed
    }

    pub fn connections_opened(&self) -> u64 {
        self.state.counters.lock().connections_opened
    }

    pub fn connections_closed(&self) -> u64 {
        self.state.counters.lock().connections_closed
    }

    /// 成功租到的批次数
    pub fn batches_fetched(&self) -> u64 {
        self.state.counters.lock().batches_fetched
    }

    pub fn batches_closed(&self) -> u64 {
        self.state.counters.lock().batches_closed
    }

    pub fn transactions_begun(&self) -> u64 {
        self.state.counters.lock().transactions_begun
    }

    pub fn commit_attempts(&self) -> u64 {
        self.state.counters.lock().commit_attempts
    }

    /// 同时进行中的提交数的峰值
    pub fn max_concurrent_commits(&self) -> u64 {
        self.state.counters.lock().max_commits_in_flight
    }
}

impl StoreClient for MemoryStore {
    type Connection = MemoryConnection;

    #[instrument(name = "memory_store_connect", skip(self), fields(endpoint = %endpoint))]
    async fn connect(&self, endpoint: &EndpointId) -> Result<MemoryConnection, StoreError> {
        let delay = self.state.faults.lock().connect_delay;
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        if self.state.take(|f| &mut f.connect_failures) {
            return Err(StoreError::connect("injected connect failure"));
        }

        self.state.counters.lock().connections_opened += 1;
        Ok(MemoryConnection {
            state: Arc::clone(&self.state),
            endpoint: endpoint.clone(),
            open: true,
        })
    }
}

/// 内存连接
#[derive(Debug)]
pub struct MemoryConnection {
    state: Arc<StoreState>,
    endpoint: EndpointId,
    open: bool,
}

impl StoreConnection for MemoryConnection {
    type Batch = MemoryBatch;

    async fn fetch_batch(&mut self, max_transactions: u32) -> Result<MemoryBatch, StoreError> {
        if !self.open {
            return Err(StoreError::closed("connection closed"));
        }
        if self.state.take(|f| &mut f.fatal_fetches) {
            return Err(StoreError::fatal("injected fetch failure"));
        }
        if self.state.take(|f| &mut f.batch_unavailable) {
            return Err(StoreError::batch_unavailable("injected: no batch available"));
        }

        self.state.counters.lock().batches_fetched += 1;
        Ok(MemoryBatch {
            state: Arc::clone(&self.state),
            endpoint: self.endpoint.clone(),
            remaining: max_transactions,
            pending: None,
            open: true,
        })
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        if std::mem::take(&mut self.open) {
            self.state.counters.lock().connections_closed += 1;
        }
        Ok(())
    }
}

/// 内存事务批次
///
/// `pending` 为 `Some` 表示事务已 begin 尚未提交。
#[derive(Debug)]
pub struct MemoryBatch {
    state: Arc<StoreState>,
    endpoint: EndpointId,
    remaining: u32,
    pending: Option<Vec<Bytes>>,
    open: bool,
}

impl TransactionBatch for MemoryBatch {
    fn remaining_transactions(&self) -> u32 {
        self.remaining
    }

    async fn begin(&mut self) -> Result<(), StoreError> {
        if !self.open {
            return Err(StoreError::closed("batch closed"));
        }
        if self.remaining == 0 {
            return Err(StoreError::fatal("transaction batch exhausted"));
        }
        if self.pending.is_some() {
            return Err(StoreError::fatal("transaction already open"));
        }
        self.remaining -= 1;
        self.pending = Some(Vec::new());
        self.state.counters.lock().transactions_begun += 1;
        Ok(())
    }

    async fn write(&mut self, records: &[Bytes]) -> Result<(), StoreError> {
        match self.pending.as_mut() {
            Some(pending) if self.open => {
                pending.extend_from_slice(records);
                Ok(())
            }
            _ => Err(StoreError::fatal("no open transaction")),
        }
    }

    async fn commit(&mut self) -> Result<(), StoreError> {
        // 失败的提交保持事务打开，由调用方丢弃批次
        if self.pending.is_none() {
            return Err(StoreError::fatal("no open transaction"));
        }
        self.state.counters.lock().commit_attempts += 1;

        if self.state.faults.lock().poisoned.contains(&self.endpoint) {
            return Err(StoreError::fatal("endpoint rejects commits"));
        }
        if self.state.take(|f| &mut f.fatal_commits) {
            return Err(StoreError::fatal("injected fatal commit failure"));
        }
        if self.state.take(|f| &mut f.commit_failures) {
            return Err(StoreError::retryable("injected commit failure"));
        }

        let delay = self.state.faults.lock().commit_delay;
        if let Some(delay) = delay {
            {
                let mut c = self.state.counters.lock();
                c.commits_in_flight += 1;
                c.max_commits_in_flight = c.max_commits_in_flight.max(c.commits_in_flight);
            }
            tokio::time::sleep(delay).await;
            self.state.counters.lock().commits_in_flight -= 1;
        }

        let records = self.pending.take().unwrap_or_default();
        self.state.committed.lock().push(CommittedTransaction {
            endpoint: self.endpoint.clone(),
            records,
        });
        Ok(())
    }

    async fn close(&mut self) -> Result<(), StoreError> {
        if std::mem::take(&mut self.open) {
            self.pending = None;
            self.state.counters.lock().batches_closed += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn endpoint() -> EndpointId {
        EndpointId::new("thrift://meta:9083", "db", "events", vec!["eu".into()]).unwrap()
    }

    #[tokio::test]
    async fn test_commit_records_in_order() {
        let store = MemoryStore::new();
        let mut conn = store.connect(&endpoint()).await.unwrap();
        let mut batch = conn.fetch_batch(2).await.unwrap();

        batch.begin().await.unwrap();
        batch.write(&[Bytes::from_static(b"a")]).await.unwrap();
        batch.commit().await.unwrap();
        batch.begin().await.unwrap();
        batch.write(&[Bytes::from_static(b"b")]).await.unwrap();
        batch.commit().await.unwrap();

        assert_eq!(batch.remaining_transactions(), 0);
        assert!(batch.begin().await.is_err());
        assert_eq!(
            store.committed_records(&endpoint()),
            vec![Bytes::from_static(b"a"), Bytes::from_static(b"b")]
        );
    }

    #[tokio::test]
    async fn test_failed_commit_keeps_transaction_open() {
        let store = MemoryStore::new();
        store.fail_next_commits(1);
        let mut conn = store.connect(&endpoint()).await.unwrap();
        let mut batch = conn.fetch_batch(4).await.unwrap();

        batch.begin().await.unwrap();
        batch.write(&[Bytes::from_static(b"a")]).await.unwrap();
        let err = batch.commit().await.unwrap_err();
        assert!(err.is_retryable());
        assert!(store.committed().is_empty());
        assert_eq!(store.commit_attempts(), 1);

        // 未结束的事务阻止新的 begin
        assert!(batch.begin().await.is_err());
        batch.commit().await.unwrap();
        assert_eq!(store.committed_records(&endpoint()), vec![Bytes::from_static(b"a")]);
    }

    #[tokio::test]
    async fn test_closing_batch_discards_open_transaction() {
        let store = MemoryStore::new();
        store.fail_next_commits_fatally(1);
        let mut conn = store.connect(&endpoint()).await.unwrap();
        let mut batch = conn.fetch_batch(4).await.unwrap();

        batch.begin().await.unwrap();
        batch.write(&[Bytes::from_static(b"a")]).await.unwrap();
        batch.commit().await.unwrap_err();
        batch.close().await.unwrap();

        assert!(batch.commit().await.is_err());
        assert!(store.committed().is_empty());
        assert_eq!(store.batches_closed(), 1);
    }

    #[tokio::test]
    async fn test_close_counts_once() {
        let store = MemoryStore::new();
        let mut conn = store.connect(&endpoint()).await.unwrap();
        conn.close().await.unwrap();
        conn.close().await.unwrap();
        assert_eq!(store.connections_closed(), 1);
        assert_eq!(store.open_connections(), 0);
        assert!(conn.fetch_batch(1).await.is_err());
    }

    #[tokio::test]
    async fn test_poisoned_endpoint_rejects_until_healed() {
        let store = MemoryStore::new();
        store.poison_endpoint(&endpoint());
        let mut conn = store.connect(&endpoint()).await.unwrap();
        let mut batch = conn.fetch_batch(4).await.unwrap();

        batch.begin().await.unwrap();
        assert!(!batch.commit().await.unwrap_err().is_retryable());

        store.heal_endpoint(&endpoint());
        batch.commit().await.unwrap();
        assert_eq!(store.committed().len(), 1);
    }
}
