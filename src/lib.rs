//! Stagecache - incremental stage build cache
//!
//! Snapshots the working directory of a multi-stage build after each stage
//! into a content-addressed store, keyed by a cumulative checksum of every
//! input absorbed so far. A later build restores the longest unchanged
//! prefix of stages and rebuilds from the first stage whose inputs differ.

pub mod cache;
pub mod checksum;
pub mod cli;
pub mod config;
pub mod error;
pub mod fsutil;
pub mod pipeline;
pub mod store;
pub mod ui;

pub use error::{CacheError, CacheResult};
