//! Refs command - list the cached stages of a branch

use super::resolve_branch;
use crate::cli::args::RefsArgs;
use crate::config::{Config, ConfigManager};
use crate::error::CacheResult;
use crate::store::{LocalStore, ObjectStore};
use crate::ui::{self, UiContext};
use console::style;

/// Execute the refs command
pub async fn execute(args: RefsArgs, config: &Config) -> CacheResult<()> {
    let ctx = UiContext::detect();
    let branch = resolve_branch(args.branch.as_deref(), &args.pipeline).await?;
    let store = LocalStore::open(&ConfigManager::cache_dir(config))?;

    let stages = store.list_refs(&branch)?;
    if stages.is_empty() {
        ui::step_info(&ctx, &format!("No cached stages for {}", branch));
        return Ok(());
    }

    println!(
        "{:<24} {:<14} {}",
        style("STAGE").bold(),
        style("COMMIT").bold(),
        style("CHECKSUM").bold()
    );
    for stage in stages {
        let refname = format!("{}/{}", branch, stage);
        let Some(commit) = store.resolve(&refname)? else {
            continue;
        };
        let subject = store.read_commit_subject(&commit)?;
        println!(
            "{:<24} {:<14} {}",
            stage,
            commit.short(),
            style(subject.to_hex()).dim()
        );
    }
    Ok(())
}
