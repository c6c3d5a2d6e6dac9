//! CLI argument definitions using clap derive

use clap::{ArgAction, Parser, Subcommand};
use std::path::PathBuf;

/// Stagecache - incremental stage build cache
///
/// Runs the stages of a build pipeline and snapshots the working directory
/// after each one, so unchanged stages are restored instead of rebuilt.
#[derive(Parser, Debug)]
#[command(name = "stagecache")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Subcommand to execute
    #[command(subcommand)]
    pub command: Commands,

    /// Increase verbosity (-v info, -vv debug)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Configuration file path
    #[arg(short, long, global = true, env = "STAGECACHE_CONFIG")]
    pub config: Option<PathBuf>,

    /// Object store location (overrides cache.dir)
    #[arg(long, global = true, env = "STAGECACHE_CACHE_DIR")]
    pub cache_dir: Option<PathBuf>,
}

/// Available commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Build a pipeline, reusing cached stages
    Build(BuildArgs),

    /// Show what changed between two cached stages
    Changes(ChangesArgs),

    /// List the cached stages of a branch
    Refs(RefsArgs),

    /// Delete objects no ref reaches
    Gc,

    /// Show or initialize configuration
    Config(ConfigArgs),
}

/// Arguments shared by commands that read a pipeline file
#[derive(Parser, Debug, Clone)]
pub struct PipelineArgs {
    /// Pipeline file (defaults to ./stagecache.toml)
    #[arg(short = 'f', long)]
    pub pipeline: Option<PathBuf>,
}

/// Arguments for the build command
#[derive(Parser, Debug)]
pub struct BuildArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Working directory (overrides build.app_dir)
    #[arg(short, long)]
    pub app_dir: Option<PathBuf>,

    /// Hard-link checked-out files from the store
    #[arg(long)]
    pub hardlinks: bool,

    /// Skip removal of stale stages and unreachable objects
    #[arg(long)]
    pub no_gc: bool,

    /// Print the build report as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the changes command
#[derive(Parser, Debug)]
pub struct ChangesArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Branch to inspect (defaults to the pipeline's branch)
    #[arg(short, long)]
    pub branch: Option<String>,

    /// Earlier stage
    #[arg(long, default_value = "init")]
    pub from: String,

    /// Later stage
    #[arg(long, default_value = "finish")]
    pub to: String,

    /// Print changes as JSON
    #[arg(long)]
    pub json: bool,
}

/// Arguments for the refs command
#[derive(Parser, Debug)]
pub struct RefsArgs {
    #[command(flatten)]
    pub pipeline: PipelineArgs,

    /// Branch to list (defaults to the pipeline's branch)
    #[arg(short, long)]
    pub branch: Option<String>,
}

/// Arguments for the config command
#[derive(Parser, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: Option<ConfigAction>,
}

/// Config subcommands
#[derive(Subcommand, Debug)]
pub enum ConfigAction {
    /// Show current configuration
    Show,

    /// Show configuration file path
    Path,

    /// Write a default configuration file
    Init {
        /// Overwrite existing config
        #[arg(short, long)]
        force: bool,
    },
}
