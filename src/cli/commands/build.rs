//! Build command - run a pipeline through the cache

use super::load_pipeline;
use crate::cli::args::BuildArgs;
use crate::config::{Config, ConfigManager};
use crate::error::{CacheError, CacheResult};
use crate::pipeline::{RunOptions, Runner, StageEvent};
use crate::ui::{self, BuildProgress, UiContext};

/// Execute the build command
pub async fn execute(args: BuildArgs, config: &Config) -> CacheResult<()> {
    let ctx = UiContext::detect();
    let pipeline = load_pipeline(&args.pipeline).await?;

    let app_dir = args
        .app_dir
        .clone()
        .unwrap_or_else(|| pipeline.base_dir.join(&config.build.app_dir));

    let runner = Runner::new(RunOptions {
        store_dir: ConfigManager::cache_dir(config),
        app_dir,
        shell: config.build.shell.clone(),
        hardlinks: args.hardlinks || config.cache.hardlinks,
        gc: config.cache.gc && !args.no_gc,
    });

    if !args.json {
        ui::intro(&ctx, &format!("Building {}", pipeline.branch));
    }

    let progress = BuildProgress::new(&ctx, pipeline.stages.len());
    let result = runner
        .run(&pipeline, |event| {
            if args.json {
                return;
            }
            match event {
                StageEvent::Started { index, name, .. } => progress.start(*index, name),
                StageEvent::Cached { name } => progress.finish_stage(&ctx, name, "cached"),
                StageEvent::Built { name, commit } => {
                    progress.finish_stage(&ctx, name, &format!("built {}", commit.short()))
                }
            }
        })
        .await;
    progress.finish();
    let report = match result {
        Ok(report) => report,
        Err(e) => {
            if !args.json {
                if let Some(stage) = failed_stage(&e) {
                    ui::step_error(&ctx, &format!("Stage {} failed", stage));
                }
                ui::outro_error(&ctx, "Build failed");
            }
            return Err(e);
        }
    };

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
        return Ok(());
    }

    if let Some(ref gc) = report.gc {
        if !gc.removed_refs.is_empty() {
            ui::step_info(
                &ctx,
                &format!("Removed {} stale stage(s)", gc.removed_refs.len()),
            );
        }
    }

    ui::outro_success(
        &ctx,
        &format!(
            "{} stage(s): {} cached, {} built in {:.1}s",
            report.total_stages(),
            report.cached.len(),
            report.built.len(),
            report.elapsed_ms as f64 / 1000.0
        ),
    );
    Ok(())
}

/// Stage an error belongs to, when it came from a single stage
fn failed_stage(err: &CacheError) -> Option<&str> {
    match err {
        CacheError::StageFailed { stage, .. }
        | CacheError::StageSignaled { stage }
        | CacheError::Commit { stage, .. } => Some(stage),
        _ => None,
    }
}
