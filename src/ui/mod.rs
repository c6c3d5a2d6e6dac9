//! Terminal output
//!
//! Uses `cliclack` for styled output in interactive terminals, with a
//! plain-text fallback in CI and when output is piped.
//!
//! # Example
//!
//! ```rust,ignore
//! use stagecache::ui::{self, UiContext, TaskSpinner};
//!
//! let ctx = UiContext::detect();
//!
//! let mut spinner = TaskSpinner::new(&ctx);
//! spinner.start("Pruning unreachable objects...");
//! spinner.stop("Pruned 12 of 40 objects");
//!
//! ui::outro_success(&ctx, "Done");
//! ```

mod context;
mod output;
mod progress;

pub use context::UiContext;
pub use output::{
    format_bytes, intro, outro_error, outro_success, step_error, step_info, step_ok_detail,
    step_warn_hint,
};
pub use progress::{BuildProgress, TaskSpinner};
