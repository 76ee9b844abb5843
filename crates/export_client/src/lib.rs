//! # Export Client
//!
//! 宿主导出框架适配层。
//!
//! 负责：
//! - `ExportClient`: 根据 `ExportConfig` 构建 endpoint 工厂、时区与分区列映射
//! - `ExportDecoder`: 每个数据源一个，驱动 block 生命周期（开始 / 逐行解码 / 完成写入）
//! - `RestartBlock`: 需要宿主重放 block 的失败

pub mod client;
pub mod error;

pub use client::{AdvertisedSource, ExportClient, ExportDecoder};
pub use error::RestartBlock;
