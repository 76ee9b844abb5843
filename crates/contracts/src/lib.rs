//! # Contracts
//!
//! Frozen interface contracts shared by every crate in the export sink.
//! Business crates depend on this crate only; reverse dependencies are prohibited.
//!
//! ## Data model
//! - `EndpointId`: destination partition (metastore URI, database, table, partition values)
//! - `RecordGroups`: serialized records keyed by destination endpoint
//! - Store client traits: the seam to the external transactional streaming store

mod config;
mod endpoint;
mod error;
mod row;
mod sink;
mod store;

pub use config::*;
pub use endpoint::{EndpointFactory, EndpointId, ENDPOINT_URI_SCHEME};
pub use error::*;
pub use row::*;
pub use sink::*;
pub use store::*;
