//! CLI command implementations

pub mod build;
pub mod changes;
pub mod config;
pub mod gc;
pub mod refs;

pub use build::execute as build;
pub use changes::execute as changes;
pub use config::execute as config;
pub use gc::execute as gc;
pub use refs::execute as refs;

use crate::cli::args::PipelineArgs;
use crate::error::{CacheError, CacheResult};
use crate::pipeline::{Pipeline, PIPELINE_FILE};

/// Load the pipeline named on the command line, or the local one
pub(crate) async fn load_pipeline(args: &PipelineArgs) -> CacheResult<Pipeline> {
    let path = match args.pipeline {
        Some(ref path) => path.clone(),
        None => {
            let cwd = std::env::current_dir()
                .map_err(|e| CacheError::io("getting current directory", e))?;
            Pipeline::find_local(&cwd).unwrap_or_else(|| cwd.join(PIPELINE_FILE))
        }
    };
    Pipeline::from_file(&path).await
}

/// Branch given explicitly, or the one of the pipeline
pub(crate) async fn resolve_branch(
    branch: Option<&str>,
    pipeline: &PipelineArgs,
) -> CacheResult<String> {
    match branch {
        Some(branch) => Ok(branch.to_string()),
        None => Ok(load_pipeline(pipeline).await?.branch),
    }
}
