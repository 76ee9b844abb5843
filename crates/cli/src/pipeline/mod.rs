//! Replay pipeline module.

mod orchestrator;
mod stats;

pub use orchestrator::{ReplayConfig, ReplayPipeline};
pub use stats::{EndpointCommits, ReplayStats};
