//! stepdeck command-line scanner.
//!
//! Discovers the configured framework roots and prints the report. Steps are
//! linked into host binaries, so this scanner has an empty plugin table and
//! every step whose file exists shows up as `not-linked` (file present, no
//! linked artifact). Use it to check descriptors and file layout.
//!
//! # Environment Variables
//!
//! - `RUST_LOG`: log filter (default: "info")
//! - `STEPDECK_*`: configuration overrides, see [`stepdeck::config`]
//!
//! # Usage
//!
//! ```bash
//! stepdeck scan --scan-dir ./frameworks
//! stepdeck scan --config stepdeck.yaml --concurrent --json
//! ```

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Parser, Subcommand};
use stepdeck::{PluginTable, RegistryConfig, RegistryError, StepRegistry};

/// Discover framework step descriptors and report what would load.
#[derive(Parser, Debug)]
#[command(name = "stepdeck")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Scan framework roots and print the discovery report
    Scan {
        /// YAML configuration file
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Framework root directory (repeatable)
        #[arg(short, long = "root")]
        roots: Vec<PathBuf>,

        /// Directory whose subdirectories are framework roots (repeatable)
        #[arg(short, long = "scan-dir")]
        scan_dirs: Vec<PathBuf>,

        /// Scan roots concurrently
        #[arg(long)]
        concurrent: bool,

        /// Print the report as JSON
        #[arg(long)]
        json: bool,
    },
}

#[tokio::main]
async fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();

    let cli = Cli::parse();
    match run(cli.command).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            log::error!("{}", e);
            ExitCode::FAILURE
        }
    }
}

async fn run(command: Commands) -> Result<(), RegistryError> {
    let Commands::Scan {
        config,
        roots,
        scan_dirs,
        concurrent,
        json,
    } = command;

    let mut settings = match config {
        Some(path) => RegistryConfig::from_yaml_file(path)?,
        None => RegistryConfig::default(),
    };
    settings.apply_env()?;
    settings.roots.extend(roots);
    settings.scan_dirs.extend(scan_dirs);
    let concurrent = concurrent || settings.concurrent;

    let mut registry = StepRegistry::new(settings, Arc::new(PluginTable::new()));
    let outcome = if concurrent {
        registry.refresh_concurrent().await
    } else {
        registry.refresh()
    };

    if json {
        println!("{}", serde_json::to_string_pretty(&outcome.report)?);
    } else {
        print!("{}", outcome.report);
    }
    Ok(())
}
