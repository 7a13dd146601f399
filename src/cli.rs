//! CLI argument parsing and command dispatch

use crate::config::{AppKind, Profile};
use crate::error::ConfigError;
use clap::{Parser, Subcommand};
use std::path::PathBuf;

/// clickstream-loadgen command line
#[derive(Parser)]
#[command(name = "clickstream-loadgen")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Command to run
    #[command(subcommand)]
    pub command: Commands,
}

/// Subcommands
#[derive(Subcommand)]
pub enum Commands {
    /// Generate live events and upload them continuously
    Realtime {
        /// Parameter preset: standalone or benchmark
        #[arg(short, long, default_value = "standalone")]
        preset: String,
        /// Application type: notepad or shopping
        #[arg(short, long, default_value = "shopping")]
        app: String,
        /// Platform filter: android, ios, web, or all
        #[arg(long)]
        platform: Option<String>,
        /// Path to the deployment descriptor JSON
        #[arg(short, long)]
        descriptor: Option<PathBuf>,
        /// Stop after this many seconds; omit to run until Ctrl+C
        #[arg(long)]
        duration_secs: Option<u64>,
        /// Master seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Backfill a historical window of events
    History {
        /// Parameter preset: standalone or benchmark
        #[arg(short, long, default_value = "standalone")]
        preset: String,
        /// Application type: notepad or shopping
        #[arg(short, long, default_value = "shopping")]
        app: String,
        /// Platform filter: android, ios, web, or all
        #[arg(long)]
        platform: Option<String>,
        /// Path to the deployment descriptor JSON
        #[arg(short, long)]
        descriptor: Option<PathBuf>,
        /// Override the window length in days
        #[arg(long)]
        days: Option<u32>,
        /// Master seed for reproducible runs
        #[arg(long)]
        seed: Option<u64>,
    },
    /// Resolve and print the effective configuration
    Validate {
        /// Parameter preset: standalone or benchmark
        #[arg(short, long, default_value = "standalone")]
        preset: String,
        /// Application type: notepad or shopping
        #[arg(short, long, default_value = "shopping")]
        app: String,
        /// Path to the deployment descriptor JSON
        #[arg(short, long)]
        descriptor: Option<PathBuf>,
    },
}

/// Look up a parameter preset by name
pub fn preset_profile(preset: &str, app_kind: AppKind) -> Result<Profile, ConfigError> {
    match preset.to_ascii_lowercase().as_str() {
        "standalone" => Ok(Profile::standalone(app_kind)),
        "benchmark" => Ok(Profile::benchmark(app_kind)),
        other => Err(ConfigError::Invalid {
            field: "preset",
            reason: format!("unknown preset {other:?}, expected standalone or benchmark"),
        }),
    }
}
