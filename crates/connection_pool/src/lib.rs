//! # Connection Pool
//!
//! Per-endpoint streaming connections to the transactional store.
//!
//! 负责：
//! - `PartitionStream`: one connection + one leased transaction batch per endpoint,
//!   batch renewal and reconnect-on-failure
//! - `ConnectionPool`: bounded, TTL-evicting, single-flight cache of streams
//! - `MemoryStore`: in-memory store client with failure injection

pub mod mock_store;
pub mod pool;
pub mod stats;
pub mod stream;

pub use contracts::{PoolSettings, StreamSettings};
pub use mock_store::{CommittedTransaction, MemoryStore};
pub use pool::{ConnectionPool, RemovalCause, RemovalListener, SharedStream};
pub use stats::{PoolStats, PoolStatsSnapshot};
pub use stream::PartitionStream;
