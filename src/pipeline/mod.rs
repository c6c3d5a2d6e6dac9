//! Pipelines: ordered stages of shell commands built through the cache

mod manifest;
mod runner;

pub use manifest::{Pipeline, StageSpec, PIPELINE_FILE};
pub use runner::{stage_refs, stored_stages, BuildReport, RunOptions, Runner, StageEvent};
