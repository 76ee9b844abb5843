//! # Decoder
//!
//! 行解码模块：把宿主导出的类型化行转换为按分区 endpoint 分组的 JSON 记录。
//!
//! 负责：
//! - `PartitionedJsonDecoder`: 单行 -> (EndpointId, JSON 记录)，按 generation 缓存字段解码计划
//! - `StreamingDecoder`: 在一个 block 内累积 `RecordGroups`，完成时 harvest

pub mod field;
pub mod json;
pub mod streaming;

pub use field::{encode_value, TIMESTAMP_FORMAT};
pub use json::{PartitionedJsonDecoder, PartitionedJsonDecoderBuilder};
pub use streaming::StreamingDecoder;
