//! clickstream-loadgen - synthetic clickstream load generator

use anyhow::Result;
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use clickstream_loadgen::cli::{preset_profile, Cli, Commands};
use clickstream_loadgen::config::{self, DESCRIPTOR_DEFAULT_PATH};
use clickstream_loadgen::stats::RunStats;
use clickstream_loadgen::{AppKind, HttpSink, Orchestrator, OrchestratorBuilder, Profile};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env().add_directive(default_level.into()),
        )
        .init();

    match cli.command {
        Commands::Realtime {
            preset,
            app,
            platform,
            descriptor,
            duration_secs,
            seed,
        } => {
            let profile = build_profile(&preset, &app, platform.as_deref(), descriptor, seed)?;
            let stats = build_orchestrator(profile)?
                .run_realtime_with_signal_handling(duration_secs.map(Duration::from_secs))
                .await?;
            print_summary(&stats);
        }
        Commands::History {
            preset,
            app,
            platform,
            descriptor,
            days,
            seed,
        } => {
            let mut profile = build_profile(&preset, &app, platform.as_deref(), descriptor, seed)?;
            if let Some(days) = days {
                profile.duration_of_days = days;
                profile.validate()?;
            }
            let stats = build_orchestrator(profile)?
                .run_historical_with_signal_handling()
                .await?;
            print_summary(&stats);
        }
        Commands::Validate {
            preset,
            app,
            descriptor,
        } => {
            let profile = build_profile(&preset, &app, None, descriptor, None)?;
            println!("{}", serde_json::to_string_pretty(&profile)?);
        }
    }

    Ok(())
}

/// Resolve preset, descriptor overlay, and overrides into a validated profile
fn build_profile(
    preset: &str,
    app: &str,
    platform: Option<&str>,
    descriptor: Option<PathBuf>,
    seed: Option<u64>,
) -> Result<Profile> {
    let app_kind: AppKind = app.parse()?;
    let mut profile = preset_profile(preset, app_kind)?;
    if let Some(platform) = platform {
        profile.platform = platform.parse()?;
    }
    profile.seed = seed.or(profile.seed);

    let descriptor_path = descriptor.unwrap_or_else(|| PathBuf::from(DESCRIPTOR_DEFAULT_PATH));
    let profile = config::resolve(profile, &descriptor_path);
    profile.validate()?;
    Ok(profile)
}

fn build_orchestrator(profile: Profile) -> Result<Orchestrator> {
    let sink = Arc::new(HttpSink::from_profile(&profile)?);
    Ok(OrchestratorBuilder::new()
        .profile(profile)
        .sink(sink)
        .build()?)
}

fn print_summary(stats: &RunStats) {
    let latency = stats.upload.latency();
    println!("run finished in {:.1}s", stats.elapsed.as_secs_f64());
    println!(
        "  generated: {} users, {} sessions, {} events ({:.0} events/s)",
        stats.users,
        stats.generator.sessions,
        stats.generator.events,
        stats.events_per_second()
    );
    println!(
        "  batches:   {} emitted, {} sent, {} dropped",
        stats.generator.batches, stats.upload.batches_sent, stats.upload.batches_dropped
    );
    println!(
        "  events:    {} sent, {} lost ({:.2}% delivered), {} retries",
        stats.upload.events_sent,
        stats.upload.events_lost,
        stats.delivery_rate() * 100.0,
        stats.upload.retries
    );
    println!(
        "  upload ms: p50 {:.1}, p90 {:.1}, p99 {:.1}, max {:.1}",
        latency.p50, latency.p90, latency.p99, latency.max
    );
}
