//! 配置校验模块
//!
//! 校验规则：
//! - uri / db / table 非空，uri 使用 thrift scheme
//! - timezone 为已知 IANA 时区
//! - 分区列名非空，且所有表的分区列数量一致
//! - unspecified_token 非空
//! - sink 调优参数 >= 1

use chrono_tz::Tz;
use contracts::{ContractError, EndpointFactory, ExportConfig, ENV_POOL_SIZE};

/// 校验 ExportConfig 配置
///
/// 返回第一个遇到的错误，或 Ok(())。
pub fn validate(config: &ExportConfig) -> Result<(), ContractError> {
    validate_destination(config)?;
    validate_timezone(config)?;
    validate_partition_columns(config)?;
    validate_unspecified_token(config)?;
    validate_sink_settings(config)?;
    Ok(())
}

/// 不阻止运行、但值得提醒的配置
pub fn warnings(config: &ExportConfig) -> Vec<String> {
    let mut warnings = Vec::new();
    let sink = &config.sink;

    if config.hive.partition_columns.is_empty() {
        warnings.push("no partition columns configured; every row goes to one endpoint".into());
    }
    if sink.pool_size < sink.concurrent_writers {
        warnings.push(format!(
            "sink.pool_size ({}) is smaller than sink.concurrent_writers ({}); \
             expect constant connection churn (see {ENV_POOL_SIZE})",
            sink.pool_size, sink.concurrent_writers
        ));
    }
    warnings
}

/// 校验目标三元组
fn validate_destination(config: &ExportConfig) -> Result<(), ContractError> {
    let hive = &config.hive;
    for (field, value) in [
        ("hive.uri", &hive.uri),
        ("hive.db", &hive.db),
        ("hive.table", &hive.table),
    ] {
        if value.trim().is_empty() {
            return Err(ContractError::config_validation(field, "must not be empty"));
        }
    }

    EndpointFactory::new(&hive.uri, &hive.db, &hive.table)
        .map(|_| ())
        .map_err(|e| ContractError::config_validation("hive.uri", e.to_string()))
}

/// 校验时区
fn validate_timezone(config: &ExportConfig) -> Result<(), ContractError> {
    config
        .hive
        .timezone
        .parse::<Tz>()
        .map(|_| ())
        .map_err(|_| {
            ContractError::config_validation(
                "hive.timezone",
                format!("unknown time zone '{}'", config.hive.timezone),
            )
        })
}

/// 校验分区列映射
fn validate_partition_columns(config: &ExportConfig) -> Result<(), ContractError> {
    let mut expected: Option<(&str, usize)> = None;

    for (table, columns) in &config.hive.partition_columns {
        if table.trim().is_empty() {
            return Err(ContractError::config_validation(
                "hive.partition_columns",
                "table name cannot be empty",
            ));
        }
        if columns.is_empty() {
            return Err(ContractError::config_validation(
                format!("hive.partition_columns.{table}"),
                "at least one partition column is required",
            ));
        }
        if let Some(idx) = columns.iter().position(|c| c.trim().is_empty()) {
            return Err(ContractError::config_validation(
                format!("hive.partition_columns.{table}[{idx}]"),
                "column name cannot be empty",
            ));
        }

        match expected {
            None => expected = Some((table, columns.len())),
            Some((first, count)) if count != columns.len() => {
                return Err(ContractError::config_validation(
                    "hive.partition_columns",
                    format!(
                        "contains tables with differing number of columns ({first}: {count}, {table}: {})",
                        columns.len()
                    ),
                ));
            }
            Some(_) => {}
        }
    }
    Ok(())
}

fn validate_unspecified_token(config: &ExportConfig) -> Result<(), ContractError> {
    if !EndpointFactory::is_valid_partition_value(&config.hive.unspecified_token) {
        return Err(ContractError::config_validation(
            "hive.unspecified_token",
            "unspecified partition token cannot be blank",
        ));
    }
    Ok(())
}

/// 校验 sink 调优参数
fn validate_sink_settings(config: &ExportConfig) -> Result<(), ContractError> {
    let sink = &config.sink;
    for (field, value) in [
        ("sink.pool_size", sink.pool_size as u64),
        ("sink.connection_ttl_minutes", sink.connection_ttl_minutes),
        ("sink.transaction_batch_size", u64::from(sink.transaction_batch_size)),
        ("sink.concurrent_writers", sink.concurrent_writers as u64),
        ("sink.batch_fetch_attempts", u64::from(sink.batch_fetch_attempts)),
        ("sink.write_attempts", u64::from(sink.write_attempts)),
    ] {
        if value < 1 {
            return Err(ContractError::config_validation(
                field,
                format!("must be >= 1, got {value}"),
            ));
        }
    }
    Ok(())
}
