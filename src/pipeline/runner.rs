//! Stage runner
//!
//! Drives a [`StageCache`] through a pipeline: absorb each stage's inputs,
//! look it up, and on a miss run its commands and commit the result.

use super::manifest::{Pipeline, StageSpec};
use crate::cache::{CacheOptions, GcReport, LookupOutcome, StageCache};
use crate::error::{CacheError, CacheResult};
use crate::store::{LocalStore, ObjectId, ObjectStore};
use serde::Serialize;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use std::time::Instant;
use tokio::process::Command;
use tracing::{debug, info};

/// How a build is carried out
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Object store location
    pub store_dir: PathBuf,
    /// Working directory the stages build into
    pub app_dir: PathBuf,
    /// Shell used as `<shell> -c <command>`
    pub shell: String,
    /// Share checked-out files with the store
    pub hardlinks: bool,
    /// Remove stale stages and unreachable objects after the build
    pub gc: bool,
}

/// Progress of a single stage, reported while the build runs
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StageEvent {
    /// Lookup is about to happen
    Started {
        index: usize,
        total: usize,
        name: String,
    },
    /// The stored snapshot was reused
    Cached { name: String },
    /// The stage ran and its result was committed
    Built { name: String, commit: ObjectId },
}

/// Summary of a finished build
#[derive(Debug, Clone, Default, Serialize)]
pub struct BuildReport {
    /// Stages restored from the cache
    pub cached: Vec<String>,
    /// Stages that ran
    pub built: Vec<String>,
    /// Commits written, one per built stage
    pub commits: Vec<ObjectId>,
    /// Present when collection ran
    pub gc: Option<GcReport>,
    pub elapsed_ms: u128,
}

impl BuildReport {
    pub fn total_stages(&self) -> usize {
        self.cached.len() + self.built.len()
    }
}

/// Runs pipelines against a local cache
pub struct Runner {
    options: RunOptions,
}

impl Runner {
    pub fn new(options: RunOptions) -> Self {
        Self { options }
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    /// Build every stage of `pipeline`, reporting progress to `observe`
    pub async fn run(
        &self,
        pipeline: &Pipeline,
        mut observe: impl FnMut(&StageEvent),
    ) -> CacheResult<BuildReport> {
        let start = Instant::now();
        let mut cache = StageCache::open(&CacheOptions {
            store_dir: self.options.store_dir.clone(),
            app_dir: self.options.app_dir.clone(),
            branch: pipeline.branch.clone(),
            hardlinks: self.options.hardlinks,
        })?;

        info!(
            "Building {} stages of {}",
            pipeline.stages.len(),
            pipeline.branch
        );

        let mut report = BuildReport::default();
        let total = pipeline.stages.len();

        for (index, stage) in pipeline.stages.iter().enumerate() {
            observe(&StageEvent::Started {
                index,
                total,
                name: stage.name.clone(),
            });

            stage
                .absorb(cache.checksum_mut(), &pipeline.base_dir)
                .await?;

            match cache.lookup(&stage.name)? {
                LookupOutcome::Hit => {
                    info!("Stage {} cached", stage.name);
                    report.cached.push(stage.name.clone());
                    observe(&StageEvent::Cached {
                        name: stage.name.clone(),
                    });
                }
                LookupOutcome::Miss => {
                    let commit = self.build_stage(&mut cache, stage).await?;
                    report.built.push(stage.name.clone());
                    report.commits.push(commit);
                    observe(&StageEvent::Built {
                        name: stage.name.clone(),
                        commit,
                    });
                }
            }
        }

        cache.ensure_checked_out()?;

        if self.options.gc {
            report.gc = Some(cache.collect()?);
        }

        report.elapsed_ms = start.elapsed().as_millis();
        info!(
            "Build finished: {} cached, {} built",
            report.cached.len(),
            report.built.len()
        );
        Ok(report)
    }

    async fn build_stage(
        &self,
        cache: &mut StageCache<LocalStore>,
        stage: &StageSpec,
    ) -> CacheResult<ObjectId> {
        let app_dir = cache.app_dir().to_path_buf();
        tokio::fs::create_dir_all(&app_dir)
            .await
            .map_err(|e| CacheError::io(format!("creating {}", app_dir.display()), e))?;

        for command in &stage.commands {
            self.run_command(stage, command, &app_dir).await?;
        }

        if cache.last_parent().is_some() {
            if let Ok(changes) = cache.outstanding_changes() {
                debug!(
                    "Stage {}: {} added, {} modified, {} removed",
                    stage.name,
                    changes.added.len(),
                    changes.modified.len(),
                    changes.removed.len()
                );
            }
        }

        cache.commit(&stage.commit_body())
    }

    async fn run_command(
        &self,
        stage: &StageSpec,
        command: &str,
        app_dir: &Path,
    ) -> CacheResult<()> {
        debug!("[{}] {} -c {:?}", stage.name, self.options.shell, command);

        let status = Command::new(&self.options.shell)
            .arg("-c")
            .arg(command)
            .current_dir(app_dir)
            .envs(&stage.env)
            .env("STAGECACHE_STAGE", &stage.name)
            .stdin(Stdio::null())
            .stdout(Stdio::inherit())
            .stderr(Stdio::inherit())
            .status()
            .await
            .map_err(|e| {
                CacheError::command_failed(format!("{} -c {}", self.options.shell, command), e)
            })?;

        if status.success() {
            return Ok(());
        }

        match status.code() {
            Some(code) => Err(CacheError::StageFailed {
                stage: stage.name.clone(),
                command: command.to_string(),
                code,
            }),
            None => Err(CacheError::StageSignaled {
                stage: stage.name.clone(),
            }),
        }
    }
}

/// Resolve the refs a pipeline's stages would use, in build order
pub fn stage_refs(pipeline: &Pipeline) -> Vec<String> {
    pipeline
        .stages
        .iter()
        .map(|s| crate::cache::stage_ref(&pipeline.branch, &s.name))
        .collect()
}

/// Look up which stages of `pipeline` currently have a stored snapshot
pub fn stored_stages(
    store: &LocalStore,
    pipeline: &Pipeline,
) -> CacheResult<Vec<(String, Option<ObjectId>)>> {
    stage_refs(pipeline)
        .into_iter()
        .zip(pipeline.stage_names())
        .map(|(refname, name)| Ok((name.to_string(), store.resolve(&refname)?)))
        .collect()
}
