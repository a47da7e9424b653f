//! # audience CLI
//!
//! Validate group manifests and replay membership scenarios against them.

mod commands;
mod config;
mod demo;
mod script;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use config::CliConfig;
use std::path::{Path, PathBuf};
use tracing_subscriber::EnvFilter;

const DEFAULT_CONFIG: &str = "audience.yml";

#[derive(Parser)]
#[command(name = "audience")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to configuration file (defaults to ./audience.yml when present)
    #[arg(long, env = "AUDIENCE_CONFIG")]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Validate a manifest and print the group tree
    Check {
        /// Manifest file (overrides the config)
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,
    },

    /// Replay a scenario script and report final membership
    Simulate {
        /// Manifest file (overrides the config)
        #[arg(long)]
        manifest: Option<PathBuf>,

        /// Scenario script
        #[arg(long)]
        script: PathBuf,

        /// Emit JSON instead of text
        #[arg(long)]
        json: bool,

        /// Background tick interval in milliseconds (0 disables it)
        #[arg(long, env = "AUDIENCE_TICK_INTERVAL_MS")]
        tick_interval_ms: Option<u64>,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose { "debug" } else { "info" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

fn load_config(path: Option<&Path>) -> Result<CliConfig> {
    if let Some(path) = path {
        return CliConfig::from_file(path)
            .with_context(|| format!("Failed to load config {}", path.display()));
    }
    let default = Path::new(DEFAULT_CONFIG);
    if default.exists() {
        return CliConfig::from_file(default)
            .with_context(|| format!("Failed to load config {}", default.display()));
    }
    Ok(CliConfig::default())
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Check { manifest, json } => {
            let config = config.with_overrides(manifest, json, None);
            commands::check_manifest(&config)
        }
        Commands::Simulate {
            manifest,
            script,
            json,
            tick_interval_ms,
        } => {
            let config = config.with_overrides(manifest, json, tick_interval_ms);
            commands::simulate(&config, &script).await
        }
    }
}
