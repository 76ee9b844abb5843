//! 导出 sink 指标记录模块
//!
//! 各 crate 在关键路径上调用这些函数；未安装 recorder 时为空操作。

use metrics::{counter, gauge, histogram};

/// 记录一次成功提交
///
/// 每个 begin/write/commit 单元成功后调用。
pub fn record_commit(table: &str, records: usize) {
    counter!("hive_export_commits_total", "table" => table.to_string()).increment(1);
    counter!("hive_export_records_committed_total", "table" => table.to_string())
        .increment(records as u64);
    histogram!("hive_export_commit_records").record(records as f64);
}

/// 记录写入失败（重试耗尽后）
pub fn record_write_failure(table: &str) {
    counter!("hive_export_write_failures_total", "table" => table.to_string()).increment(1);
}

/// 记录事务批次续租
pub fn record_batch_renewal(table: &str) {
    counter!("hive_export_batch_renewals_total", "table" => table.to_string()).increment(1);
}

/// 记录重连
pub fn record_reconnect(table: &str, reason: &str) {
    counter!(
        "hive_export_reconnects_total",
        "table" => table.to_string(),
        "reason" => reason.to_string()
    )
    .increment(1);
}

/// 记录连接池驱逐
///
/// `cause`: size / expired / explicit / replaced
pub fn record_pool_eviction(cause: &str) {
    counter!("hive_export_pool_evictions_total", "cause" => cause.to_string()).increment(1);
}

/// 记录连接池当前大小
pub fn record_pool_size(size: usize) {
    gauge!("hive_export_pool_size").set(size as f64);
}

/// 记录 lane 队列深度
pub fn record_lane_queue_depth(lane: usize, depth: usize) {
    gauge!("hive_export_lane_queue_depth", "lane" => lane.to_string()).set(depth as f64);
}

/// 记录被拒绝的提交（lane 已关闭）
pub fn record_rejected_submission(lane: usize) {
    counter!("hive_export_rejected_submissions_total", "lane" => lane.to_string()).increment(1);
}

/// 记录需要宿主重放的 block 失败
pub fn record_block_failure(source: &str) {
    counter!("hive_export_block_failures_total", "source" => source.to_string()).increment(1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_recording_without_recorder_is_noop() {
        record_commit("events", 3);
        record_write_failure("events");
        record_batch_renewal("events");
        record_reconnect("events", "commit");
        record_pool_eviction("size");
        record_pool_size(2);
        record_lane_queue_depth(0, 1);
        record_rejected_submission(1);
        record_block_failure("partition-0");
    }
}
