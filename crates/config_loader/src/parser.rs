//! 配置解析模块
//!
//! 支持 TOML (主要)、JSON 以及宿主导出框架使用的 `.properties` 格式。

use std::collections::BTreeMap;

use contracts::{ContractError, ExportConfig, HiveConfig, SinkSettings, DEFAULT_UNSPECIFIED_TOKEN};

/// `.properties` 键: metastore URI
pub const HIVE_URI_KEY: &str = "hive.uri";
/// `.properties` 键: 目标数据库
pub const HIVE_DB_KEY: &str = "hive.db";
/// `.properties` 键: 目标表
pub const HIVE_TABLE_KEY: &str = "hive.table";
/// `.properties` 键: 分区列 (`TABLE:COL1|COL2,TABLE2:COLA|COLB`)
pub const HIVE_PARTITION_COLUMNS_KEY: &str = "hive.partition.columns";
/// `.properties` 键: 时区
pub const TIMEZONE_KEY: &str = "timezone";
/// `.properties` 键: 空分区值占位符
pub const UNSPECIFIED_TOKEN_KEY: &str = "hive.unspecified.token";
/// `.properties` 键: 是否跳过宿主内部元数据列
pub const SKIP_INTERNALS_KEY: &str = "skipinternals";

/// 配置文件格式
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigFormat {
    /// TOML 格式 (推荐)
    Toml,
    /// JSON 格式
    Json,
    /// Java 风格 `key=value` 属性文件
    Properties,
}

impl ConfigFormat {
    /// 从文件扩展名推断格式
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_lowercase().as_str() {
            "toml" => Some(Self::Toml),
            "json" => Some(Self::Json),
            "properties" => Some(Self::Properties),
            _ => None,
        }
    }
}

/// 解析 TOML 格式配置
pub fn parse_toml(content: &str) -> Result<ExportConfig, ContractError> {
    toml::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("TOML parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 解析 JSON 格式配置
pub fn parse_json(content: &str) -> Result<ExportConfig, ContractError> {
    serde_json::from_str(content).map_err(|e| ContractError::ConfigParse {
        message: format!("JSON parse error: {e}"),
        source: Some(Box::new(e)),
    })
}

/// 解析 `.properties` 格式配置
///
/// 未识别的键被忽略 (宿主会把其它导出目标的属性一并传入)。
/// sink 调优参数不从属性文件读取，只取默认值与环境变量。
pub fn parse_properties(content: &str) -> Result<ExportConfig, ContractError> {
    let props = read_properties(content);
    let get = |key: &str| props.get(key).map(String::as_str).unwrap_or("");

    let partition_columns = parse_partition_columns(get(HIVE_PARTITION_COLUMNS_KEY))?;

    let timezone = match get(TIMEZONE_KEY).trim() {
        "" => "UTC".to_string(),
        tz => tz.to_string(),
    };
    let unspecified_token = match get(UNSPECIFIED_TOKEN_KEY).trim() {
        "" => DEFAULT_UNSPECIFIED_TOKEN.to_string(),
        token => token.to_string(),
    };
    let skip_internal_fields = match get(SKIP_INTERNALS_KEY).trim() {
        "" => true,
        flag => flag.parse::<bool>().map_err(|_| {
            ContractError::config_parse(format!(
                "invalid boolean \"{flag}\" for property {SKIP_INTERNALS_KEY}"
            ))
        })?,
    };

    Ok(ExportConfig {
        hive: HiveConfig {
            uri: get(HIVE_URI_KEY).trim().to_string(),
            db: get(HIVE_DB_KEY).trim().to_string(),
            table: get(HIVE_TABLE_KEY).trim().to_string(),
            partition_columns,
            timezone,
            unspecified_token,
            skip_internal_fields,
        },
        sink: SinkSettings::default(),
    })
}

/// 解析分区列属性值
///
/// 每段形如 `TABLE:COL1|COL2`，表名与列名统一转大写。
/// 只有表名的段不贡献任何映射；多于一个 `:` 的段视为格式错误。
pub fn parse_partition_columns(
    value: &str,
) -> Result<BTreeMap<String, Vec<String>>, ContractError> {
    let mut columns = BTreeMap::new();

    for stanza in value.split(',').map(str::trim).filter(|s| !s.is_empty()) {
        let parts: Vec<&str> = stanza
            .split(':')
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .collect();

        match parts.as_slice() {
            [_table] => {}
            [table, cols] => {
                let cols: Vec<String> = cols
                    .split('|')
                    .map(str::trim)
                    .filter(|c| !c.is_empty())
                    .map(str::to_uppercase)
                    .collect();
                if cols.is_empty() {
                    return Err(malformed(stanza));
                }
                columns.insert(table.to_uppercase(), cols);
            }
            _ => return Err(malformed(stanza)),
        }
    }

    Ok(columns)
}

fn malformed(stanza: &str) -> ContractError {
    ContractError::config_parse(format!(
        "malformed value \"{stanza}\" for property {HIVE_PARTITION_COLUMNS_KEY}"
    ))
}

/// 读取 `key=value` / `key: value` 行，`#` 与 `!` 开头为注释
fn read_properties(content: &str) -> BTreeMap<String, String> {
    content
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#') && !line.starts_with('!'))
        .map(|line| match line.find(['=', ':']) {
            Some(idx) => (
                line[..idx].trim().to_string(),
                line[idx + 1..].trim().to_string(),
            ),
            None => (line.to_string(), String::new()),
        })
        .collect()
}

/// 统一表名、列名大小写并去除空白
pub fn normalize(config: &mut ExportConfig) {
    let hive = &mut config.hive;
    hive.uri = hive.uri.trim().to_string();
    hive.db = hive.db.trim().to_string();
    hive.table = hive.table.trim().to_string();
    hive.timezone = hive.timezone.trim().to_string();
    hive.partition_columns = std::mem::take(&mut hive.partition_columns)
        .into_iter()
        .map(|(table, cols)| {
            (
                table.trim().to_uppercase(),
                cols.iter().map(|c| c.trim().to_uppercase()).collect(),
            )
        })
        .collect();
}

/// 根据格式解析配置
pub fn parse(content: &str, format: ConfigFormat) -> Result<ExportConfig, ContractError> {
    let mut config = match format {
        ConfigFormat::Toml => parse_toml(content)?,
        ConfigFormat::Json => parse_json(content)?,
        ConfigFormat::Properties => parse_properties(content)?,
    };
    normalize(&mut config);
    Ok(config)
}
