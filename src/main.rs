//! Stagecache CLI entry point

use clap::Parser;
use console::style;
use stagecache::cli::{Cli, Commands};
use stagecache::config::{Config, ConfigManager};
use stagecache::error::CacheResult;
use std::process::ExitCode;
use tracing::debug;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> ExitCode {
    match run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("{} {}", style("Error:").red().bold(), e);
            if let Some(hint) = e.hint() {
                eprintln!("{} {}", style("Hint:").yellow(), hint);
            }
            if e.is_fatal() {
                // Distinct status so wrappers know the working directory is unusable
                return ExitCode::from(2);
            }
            ExitCode::FAILURE
        }
    }
}

async fn run() -> CacheResult<()> {
    let cli = Cli::parse();

    let manager = match cli.config {
        Some(ref path) => ConfigManager::with_path(path.clone()),
        None => ConfigManager::new(),
    };
    let mut config = manager.load().await?;
    if let Some(ref dir) = cli.cache_dir {
        config.cache.dir = Some(dir.clone());
    }

    init_logging(cli.verbose, &config);
    debug!("Using config {}", manager.path().display());

    match cli.command {
        Commands::Build(args) => stagecache::cli::commands::build(args, &config).await,
        Commands::Changes(args) => stagecache::cli::commands::changes(args, &config).await,
        Commands::Refs(args) => stagecache::cli::commands::refs(args, &config).await,
        Commands::Gc => stagecache::cli::commands::gc(&config).await,
        Commands::Config(args) => stagecache::cli::commands::config(args, &config, &manager).await,
    }
}

/// 0 = warn, 1 = info, 2+ = debug; `general.verbose` raises the floor to info
fn init_logging(verbose: u8, config: &Config) {
    let level = match verbose.max(u8::from(config.general.verbose)) {
        0 => "stagecache=warn",
        1 => "stagecache=info",
        _ => "stagecache=debug",
    };
    let builder = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::new(level))
        .with_writer(std::io::stderr)
        .with_target(false)
        .without_time();

    if config.general.log_format == "json" {
        builder.json().init();
    } else {
        builder.init();
    }
}
