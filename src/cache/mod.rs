//! Incremental stage cache
//!
//! Each stage of a build pipeline is keyed by the checksum of every input
//! absorbed so far. A stage whose stored snapshot carries the same checksum
//! is skipped; the first stage that misses, and every stage after it, is
//! built for real and committed back.
//!
//! # Cache States
//!
//! | Outcome | Working directory | Later lookups |
//! |---------|-------------------|---------------|
//! | Hit | untouched | still compared |
//! | Miss | reset to last hit | always miss |
//!
//! A stage name maps to the ref `<branch>/<escaped name>`; see [`refs`].

mod changes;
pub mod engine;
pub mod gc;
pub mod refs;

pub use engine::{CacheOptions, LookupOutcome, StageCache};
pub use gc::GcReport;
pub use refs::{escape_stage, stage_ref};
