//! ConnectionPool - bounded, TTL-evicting cache of partition streams
//!
//! - At most `max_size` live entries; inserting beyond that removes the least
//!   recently used one.
//! - An entry idle for `ttl` (since its last access) is treated as absent and
//!   reaped on the next lookup or maintenance pass.
//! - Concurrent `get`s for the same missing endpoint share one creation.
//! - Every removed stream is reported to the removal listener and closed.

use std::collections::HashMap;
use std::error::Error;
use std::num::NonZeroUsize;
use std::sync::Arc;
use std::time::Duration;

use contracts::{EndpointId, PoolSettings, SinkError, SinkSettings, StoreClient, StreamSettings};
use lru::LruCache;
use parking_lot::Mutex;
use tokio::sync::OnceCell;
use tokio::time::Instant;
use tracing::{debug, info, instrument, warn};

use crate::stats::{PoolStats, PoolStatsSnapshot};
use crate::stream::PartitionStream;

/// Pooled stream handle
///
/// Writers lock it for the duration of one write.
pub type SharedStream<C> = Arc<tokio::sync::Mutex<PartitionStream<C>>>;

/// Hook invoked for every removed entry, before the stream is closed
pub type RemovalListener = Arc<dyn Fn(&EndpointId, RemovalCause) + Send + Sync>;

type SharedCause = Arc<dyn Error + Send + Sync>;
type LoadCell<C> = Arc<OnceCell<Result<SharedStream<C>, SharedCause>>>;

/// Interval between repeated pool-size warnings
const SIZE_WARNING_INTERVAL: Duration = Duration::from_secs(10);

/// Why an entry left the pool
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RemovalCause {
    /// Capacity reached, least recently used entry dropped
    Size,
    /// Idle longer than the TTL
    Expired,
    /// `evict` / `invalidate_all`
    Explicit,
    /// `put` over an existing key
    Replaced,
}

impl RemovalCause {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Size => "size",
            Self::Expired => "expired",
            Self::Explicit => "explicit",
            Self::Replaced => "replaced",
        }
    }
}

struct PoolEntry<C: StoreClient> {
    stream: SharedStream<C>,
    last_access: Instant,
}

enum Lookup<C: StoreClient> {
    Hit(SharedStream<C>),
    Expired(SharedStream<C>),
    Miss,
}

/// Emits at most one message per interval
struct RateLimiter {
    interval: Duration,
    last: Mutex<Option<Instant>>,
}

impl RateLimiter {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            last: Mutex::new(None),
        }
    }

    fn allow(&self) -> bool {
        let now = Instant::now();
        let mut last = self.last.lock();
        match *last {
            Some(prev) if now.saturating_duration_since(prev) < self.interval => false,
            _ => {
                *last = Some(now);
                true
            }
        }
    }
}

/// Partition stream pool
pub struct ConnectionPool<C: StoreClient> {
    client: Arc<C>,
    settings: PoolSettings,
    stream_settings: StreamSettings,
    entries: Mutex<LruCache<EndpointId, PoolEntry<C>>>,
    loading: Mutex<HashMap<EndpointId, LoadCell<C>>>,
    listener: Option<RemovalListener>,
    stats: PoolStats,
    size_warnings: RateLimiter,
}

impl<C: StoreClient> ConnectionPool<C> {
    /// Create an empty pool
    ///
    /// A `max_size` of zero is treated as one.
    pub fn new(client: Arc<C>, settings: PoolSettings, stream_settings: StreamSettings) -> Self {
        let capacity = NonZeroUsize::new(settings.max_size).unwrap_or(NonZeroUsize::MIN);
        info!(
            max_size = capacity.get(),
            ttl_secs = settings.ttl.as_secs(),
            max_transactions = stream_settings.max_transactions,
            "connection pool created"
        );
        Self {
            client,
            settings,
            stream_settings,
            entries: Mutex::new(LruCache::new(capacity)),
            loading: Mutex::new(HashMap::new()),
            listener: None,
            stats: PoolStats::new(),
            size_warnings: RateLimiter::new(SIZE_WARNING_INTERVAL),
        }
    }

    /// Create a pool from the sink tunables
    pub fn from_sink_settings(client: Arc<C>, settings: &SinkSettings) -> Self {
        Self::new(client, settings.pool_settings(), settings.stream_settings())
    }

    /// Install the removal hook
    pub fn with_removal_listener(mut self, listener: RemovalListener) -> Self {
        self.listener = Some(listener);
        self
    }

    pub fn settings(&self) -> PoolSettings {
        self.settings
    }

    /// Stream for `endpoint`, creating it if absent or expired
    ///
    /// # Errors
    /// `SinkError::Connect` if creation fails. Failures are not cached; every
    /// caller waiting on the same creation receives the same cause.
    #[instrument(name = "pool_get", skip(self), fields(endpoint = %endpoint))]
    pub async fn get(&self, endpoint: &EndpointId) -> Result<SharedStream<C>, SinkError> {
        if let Some(stream) = self.lookup(endpoint).await {
            self.stats.inc_hit();
            return Ok(stream);
        }
        self.stats.inc_miss();

        let cell = {
            let mut loading = self.loading.lock();
            // a concurrent creation may have finished since the lookup
            if let Some(stream) = self.touch_live(endpoint) {
                return Ok(stream);
            }
            Arc::clone(loading.entry(endpoint.clone()).or_default())
        };

        let result = cell.get_or_init(|| self.create(endpoint)).await.clone();

        {
            let mut loading = self.loading.lock();
            if loading
                .get(endpoint)
                .is_some_and(|current| Arc::ptr_eq(current, &cell))
            {
                loading.remove(endpoint);
            }
        }

        result.map_err(|cause| SinkError::connect(endpoint, cause))
    }

    /// Stream for `endpoint` if live, without creating or touching it
    pub fn get_if_present(&self, endpoint: &EndpointId) -> Option<SharedStream<C>> {
        let entries = self.entries.lock();
        entries
            .peek(endpoint)
            .filter(|entry| !self.is_expired(entry))
            .map(|entry| Arc::clone(&entry.stream))
    }

    /// Insert `stream` for `endpoint`, replacing any existing entry
    pub async fn put(&self, endpoint: EndpointId, stream: SharedStream<C>) {
        self.insert(endpoint, stream).await;
    }

    /// Remove `endpoint` and close its stream; no-op when absent
    #[instrument(name = "pool_evict", skip(self), fields(endpoint = %endpoint))]
    pub async fn evict(&self, endpoint: &EndpointId) {
        let removed = self.entries.lock().pop(endpoint);
        if let Some(entry) = removed {
            self.release(endpoint, entry.stream, RemovalCause::Explicit)
                .await;
        }
    }

    /// Remove and close every entry
    pub async fn invalidate_all(&self) {
        let drained: Vec<_> = {
            let mut entries = self.entries.lock();
            std::iter::from_fn(|| entries.pop_lru()).collect()
        };
        if !drained.is_empty() {
            info!(count = drained.len(), "invalidating all pooled streams");
        }
        for (endpoint, entry) in drained {
            self.release(&endpoint, entry.stream, RemovalCause::Explicit)
                .await;
        }
    }

    /// Reap expired entries
    pub async fn maintenance(&self) {
        let expired: Vec<_> = {
            let mut entries = self.entries.lock();
            let keys: Vec<EndpointId> = entries
                .iter()
                .filter(|(_, entry)| self.is_expired(entry))
                .map(|(key, _)| key.clone())
                .collect();
            keys.into_iter()
                .filter_map(|key| entries.pop(&key).map(|entry| (key, entry)))
                .collect()
        };
        for (endpoint, entry) in expired {
            self.release(&endpoint, entry.stream, RemovalCause::Expired)
                .await;
        }
    }

    /// Live entry count (expired entries not yet reaped included)
    pub fn len(&self) -> usize {
        self.entries.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether `endpoint` has an entry (expired or not)
    pub fn contains(&self, endpoint: &EndpointId) -> bool {
        self.entries.lock().contains(endpoint)
    }

    pub fn stats(&self) -> PoolStatsSnapshot {
        self.stats.snapshot()
    }

    fn is_expired(&self, entry: &PoolEntry<C>) -> bool {
        Instant::now().saturating_duration_since(entry.last_access) >= self.settings.ttl
    }

    fn lookup_locked(&self, endpoint: &EndpointId) -> Lookup<C> {
        let mut entries = self.entries.lock();
        match entries.peek(endpoint).map(|entry| self.is_expired(entry)) {
            None => Lookup::Miss,
            Some(true) => entries
                .pop(endpoint)
                .map_or(Lookup::Miss, |entry| Lookup::Expired(entry.stream)),
            Some(false) => entries.get_mut(endpoint).map_or(Lookup::Miss, |entry| {
                entry.last_access = Instant::now();
                Lookup::Hit(Arc::clone(&entry.stream))
            }),
        }
    }

    async fn lookup(&self, endpoint: &EndpointId) -> Option<SharedStream<C>> {
        match self.lookup_locked(endpoint) {
            Lookup::Hit(stream) => Some(stream),
            Lookup::Expired(stream) => {
                self.release(endpoint, stream, RemovalCause::Expired).await;
                None
            }
            Lookup::Miss => None,
        }
    }

    fn touch_live(&self, endpoint: &EndpointId) -> Option<SharedStream<C>> {
        let mut entries = self.entries.lock();
        let entry = entries.get_mut(endpoint)?;
        if self.is_expired(entry) {
            return None;
        }
        entry.last_access = Instant::now();
        Some(Arc::clone(&entry.stream))
    }

    async fn create(&self, endpoint: &EndpointId) -> Result<SharedStream<C>, SharedCause> {
        self.stats.inc_load();
        let opened = PartitionStream::open(
            Arc::clone(&self.client),
            endpoint.clone(),
            self.stream_settings,
        )
        .await;

        match opened {
            Ok(stream) => {
                let shared = Arc::new(tokio::sync::Mutex::new(stream));
                self.insert(endpoint.clone(), Arc::clone(&shared)).await;
                debug!(endpoint = %endpoint, "partition stream pooled");
                Ok(shared)
            }
            Err(e) => {
                self.stats.inc_load_failure();
                Err(SharedCause::from(e.into_cause()))
            }
        }
    }

    async fn insert(&self, endpoint: EndpointId, stream: SharedStream<C>) {
        let displaced = {
            let mut entries = self.entries.lock();
            let displaced = entries.push(
                endpoint.clone(),
                PoolEntry {
                    stream: Arc::clone(&stream),
                    last_access: Instant::now(),
                },
            );
            observability::record_pool_size(entries.len());
            displaced
        };

        if let Some((old_key, old)) = displaced {
            if Arc::ptr_eq(&old.stream, &stream) {
                return;
            }
            let cause = if old_key == endpoint {
                RemovalCause::Replaced
            } else {
                RemovalCause::Size
            };
            self.release(&old_key, old.stream, cause).await;
        }
    }

    async fn release(&self, endpoint: &EndpointId, stream: SharedStream<C>, cause: RemovalCause) {
        self.notify(endpoint, cause);
        stream.lock().await.close().await;
    }

    fn notify(&self, endpoint: &EndpointId, cause: RemovalCause) {
        self.stats.inc_removal(cause);
        observability::record_pool_eviction(cause.as_str());
        observability::record_pool_size(self.len());

        if cause == RemovalCause::Size && self.size_warnings.allow() {
            warn!(
                endpoint = %endpoint,
                max_size = self.settings.max_size,
                "connection pool is full, evicting least recently used stream; \
                 consider raising {} while keeping an eye on open file descriptors",
                contracts::ENV_POOL_SIZE
            );
        }
        debug!(endpoint = %endpoint, cause = cause.as_str(), "pooled stream removed");

        if let Some(listener) = &self.listener {
            listener(endpoint, cause);
        }
    }
}
