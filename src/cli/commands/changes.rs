//! Changes command - compare two cached stages

use super::resolve_branch;
use crate::cache::{CacheOptions, StageCache};
use crate::cli::args::ChangesArgs;
use crate::config::{Config, ConfigManager};
use crate::error::CacheResult;
use crate::ui::{self, UiContext};
use console::style;

/// Execute the changes command
pub async fn execute(args: ChangesArgs, config: &Config) -> CacheResult<()> {
    let ctx = UiContext::detect();
    let branch = resolve_branch(args.branch.as_deref(), &args.pipeline).await?;

    let mut cache = StageCache::open(&CacheOptions {
        store_dir: ConfigManager::cache_dir(config),
        app_dir: config.build.app_dir.clone(),
        branch,
        hardlinks: false,
    })?;
    cache.disable_lookups();

    let changes = cache.all_changes(&args.from, &args.to)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&changes)?);
        return Ok(());
    }

    if changes.is_empty() {
        ui::step_info(
            &ctx,
            &format!("No changes between {} and {}", args.from, args.to),
        );
        return Ok(());
    }

    for path in &changes.added {
        println!("{} {}", style("A").green(), path);
    }
    for path in &changes.modified {
        println!("{} {}", style("M").yellow(), path);
    }
    for path in &changes.removed {
        println!("{} {}", style("D").red(), path);
    }
    Ok(())
}
