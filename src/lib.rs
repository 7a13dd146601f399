//! clickstream-loadgen: synthetic clickstream load generation
//!
//! Simulates populations of users emitting time-ordered session and action
//! events, batches the events, and pushes them to an analytics ingestion
//! endpoint under explicit concurrency and throughput limits.
//!
//! # Architecture
//!
//! - **config**: immutable [`Profile`](config::Profile) built once at
//!   startup; the deployment descriptor overlay is best-effort
//! - **population**: deterministic synthetic users with daily-active
//!   patterns
//! - **events**: per-application generators (notepad actions, shopping
//!   funnel) producing wire-ready events
//! - **batch**: count- and time-bounded batching between generation and
//!   upload
//! - **uploader**: gzip, retry classification, loss accounting
//! - **pacing**: fixed-delay or token-bucket throttling
//! - **orchestrator**: real-time and historical pipelines with graceful
//!   shutdown
//!
//! # Example
//!
//! ```no_run
//! use clickstream_loadgen::{
//!     AppKind, HttpSink, OrchestratorBuilder, Profile,
//! };
//! use std::sync::Arc;
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let mut profile = Profile::standalone(AppKind::Shopping);
//!     profile.endpoint = "https://ingest.example.com/collect".into();
//!     profile.app_id = "my-app".into();
//!
//!     let sink = Arc::new(HttpSink::from_profile(&profile)?);
//!     let orchestrator = OrchestratorBuilder::new()
//!         .profile(profile)
//!         .sink(sink)
//!         .build()?;
//!
//!     let stats = orchestrator.run_historical_with_signal_handling().await?;
//!     println!("delivered {} events", stats.upload.events_sent);
//!     Ok(())
//! }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]

pub mod batch;
pub mod cli;
pub mod config;
pub mod error;
pub mod events;
pub mod orchestrator;
pub mod pacing;
pub mod population;
pub mod range;
pub mod stats;
pub mod uploader;

pub use batch::{Batch, BatchAccumulator};
pub use config::{AppKind, Platform, Profile};
pub use error::{ConfigError, Error, GenerationError, RangeError, Result};
pub use events::{Event, EventGenerator, GenerationWindow};
pub use orchestrator::{Orchestrator, OrchestratorBuilder};
pub use pacing::RateController;
pub use population::{User, UserPopulation};
pub use range::ClosedOpenRange;
pub use stats::RunStats;
pub use uploader::{BatchSink, HttpSink, RetryPolicy, UploadError, UploadOutcome, Uploader};
