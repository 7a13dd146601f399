//! Pipeline orchestration
//!
//! The orchestrator wires the run together: it shards the user population
//! across generator workers, connects generation to upload through a
//! bounded queue, coordinates graceful shutdown over a broadcast channel,
//! and closes out loss accounting.
//!
//! # Example
//!
//! ```ignore
//! let orchestrator = OrchestratorBuilder::new()
//!     .profile(profile)
//!     .sink(Arc::new(HttpSink::from_profile(&profile)?))
//!     .build()?;
//!
//! let stats = orchestrator
//!     .run_realtime_with_signal_handling(Some(Duration::from_secs(600)))
//!     .await?;
//! println!("delivered {:.1}%", stats.delivery_rate() * 100.0);
//! ```

mod builder;
mod executor;

pub use builder::OrchestratorBuilder;
pub use executor::Orchestrator;
