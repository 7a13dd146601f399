//! Builder pattern for Orchestrator construction

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::broadcast;

use crate::config::Profile;
use crate::error::ConfigError;
use crate::uploader::{BatchSink, RetryPolicy};

use super::executor::Orchestrator;

/// Builder for creating an [`Orchestrator`] with validated configuration
pub struct OrchestratorBuilder {
    profile: Option<Profile>,
    sink: Option<Arc<dyn BatchSink>>,
    retry_policy: RetryPolicy,
    shutdown_timeout: Duration,
    queue_capacity: Option<usize>,
}

impl OrchestratorBuilder {
    /// New builder with default retry and shutdown settings
    pub fn new() -> Self {
        Self {
            profile: None,
            sink: None,
            retry_policy: RetryPolicy::default(),
            shutdown_timeout: Duration::from_secs(30),
            queue_capacity: None,
        }
    }

    /// Set the resolved run profile
    pub fn profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    /// Set the batch destination
    pub fn sink(mut self, sink: Arc<dyn BatchSink>) -> Self {
        self.sink = Some(sink);
        self
    }

    /// Set the per-batch retry policy
    pub fn retry_policy(mut self, policy: RetryPolicy) -> Self {
        self.retry_policy = policy;
        self
    }

    /// Set how long in-flight uploads may run after shutdown begins
    pub fn shutdown_timeout(mut self, timeout: Duration) -> Self {
        self.shutdown_timeout = timeout;
        self
    }

    /// Override the generator-to-uploader queue capacity
    pub fn queue_capacity(mut self, capacity: usize) -> Self {
        self.queue_capacity = Some(capacity.max(1));
        self
    }

    /// Build the orchestrator
    ///
    /// # Errors
    /// Returns an error when profile or sink are missing, or when the
    /// profile fails validation.
    pub fn build(self) -> Result<Orchestrator, ConfigError> {
        let profile = self.profile.ok_or(ConfigError::MissingField("profile"))?;
        let sink = self.sink.ok_or(ConfigError::MissingField("sink"))?;
        profile.validate()?;

        // Small queue on purpose: producers must feel backpressure when the
        // endpoint is slow.
        let queue_capacity = self
            .queue_capacity
            .unwrap_or(profile.max_batch_requests_in_flight.max(2) * 2);
        let (shutdown_tx, _) = broadcast::channel(1);

        Ok(Orchestrator {
            profile: Arc::new(profile),
            sink,
            retry_policy: self.retry_policy,
            shutdown_timeout: self.shutdown_timeout,
            queue_capacity,
            shutdown_tx,
        })
    }
}

impl Default for OrchestratorBuilder {
    fn default() -> Self {
        Self::new()
    }
}
