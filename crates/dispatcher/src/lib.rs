//! # Dispatcher
//!
//! 分区写入分发模块。
//!
//! 负责：
//! - 按 endpoint 哈希把记录组路由到固定数量的单写者 lane
//! - 同一 endpoint 的写入严格有序，不同 endpoint 跨 lane 并行
//! - 写入失败时驱逐连接池中的对应 stream
//! - 显式生命周期：`Dispatcher::new` 启动 lane，`shutdown` 排空并关闭

pub mod dispatcher;
pub mod lane;
pub mod metrics;

pub use contracts::{BlockSink, RecordGroups, SinkError};
pub use dispatcher::{Dispatcher, PendingWrite};
pub use lane::LaneHandle;
pub use metrics::{LaneMetrics, MetricsSnapshot};
