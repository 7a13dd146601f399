//! Batch upload: sink seam, error classification, bounded retry
//!
//! [`BatchSink`] is the seam between the pipeline and the wire; tests
//! inject mock sinks, production uses [`HttpSink`]. The [`Uploader`] wraps
//! a sink with capped, backed-off retries and reports a per-batch
//! [`UploadOutcome`]. Uploads are explicitly not exactly-once: a batch that
//! exhausts its attempts is dropped and its events counted as lost.

mod http;

pub use http::HttpSink;

use crate::batch::Batch;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use thiserror::Error;

/// Upload failure classification
#[derive(Debug, Error)]
pub enum UploadError {
    /// Transport-level failure (connection reset, DNS, protocol)
    #[error("HTTP transport error: {0}")]
    Http(#[from] reqwest::Error),

    /// The request ran past the client timeout
    #[error("request timed out")]
    Timeout,

    /// The endpoint answered 429
    #[error("rate limited by endpoint")]
    RateLimited,

    /// The endpoint answered 5xx
    #[error("server error: HTTP {status}")]
    Server {
        /// Response status code
        status: u16,
    },

    /// The endpoint answered a non-429 4xx; retrying cannot help
    #[error("rejected by endpoint: HTTP {status}")]
    Rejected {
        /// Response status code
        status: u16,
    },

    /// The batch could not be serialized
    #[error("failed to encode batch: {0}")]
    Encode(#[from] serde_json::Error),

    /// Gzip compression failed
    #[error("failed to compress batch: {0}")]
    Compress(#[from] std::io::Error),
}

impl UploadError {
    /// Whether another attempt could plausibly succeed
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            UploadError::Http(_)
                | UploadError::Timeout
                | UploadError::RateLimited
                | UploadError::Server { .. }
        )
    }

    /// Recommended base backoff before the next attempt
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            UploadError::RateLimited => Some(Duration::from_secs(1)),
            UploadError::Server { .. } => Some(Duration::from_millis(500)),
            UploadError::Timeout => Some(Duration::from_millis(250)),
            UploadError::Http(_) => Some(Duration::from_millis(250)),
            _ => None,
        }
    }
}

/// Destination for finished batches
#[async_trait]
pub trait BatchSink: Send + Sync {
    /// Sink identifier for logs
    fn name(&self) -> &str;

    /// Deliver one batch
    async fn send(&self, batch: &Batch) -> Result<(), UploadError>;
}

/// Retry bounds for one batch
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Total attempts per batch, first try included
    pub max_attempts: usize,
    /// Backoff base when the error suggests none
    pub base_backoff: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 3,
            base_backoff: Duration::from_millis(200),
        }
    }
}

/// Outcome of sending one batch
#[derive(Debug)]
pub enum UploadOutcome {
    /// Delivered after `attempts` tries
    Sent {
        /// Attempts spent, first try included
        attempts: usize,
    },
    /// Dropped after `attempts` tries; events are lost
    Dropped {
        /// Attempts spent, first try included
        attempts: usize,
        /// The final error
        error: UploadError,
    },
}

impl UploadOutcome {
    /// Whether the batch was delivered
    pub fn is_sent(&self) -> bool {
        matches!(self, UploadOutcome::Sent { .. })
    }
}

/// Retry wrapper around a sink
pub struct Uploader {
    sink: Arc<dyn BatchSink>,
    policy: RetryPolicy,
}

impl Uploader {
    /// New uploader over `sink`
    pub fn new(sink: Arc<dyn BatchSink>, policy: RetryPolicy) -> Self {
        Self { sink, policy }
    }

    /// Send one batch with bounded attempts and exponential backoff
    ///
    /// Fatal errors and exhausted retries drop the batch; the batch's
    /// sequence number and size are logged for post-mortem.
    pub async fn upload(&self, batch: &Batch) -> UploadOutcome {
        let mut attempts = 0;
        loop {
            attempts += 1;
            match self.sink.send(batch).await {
                Ok(()) => {
                    tracing::debug!(seq = batch.seq, events = batch.len(), attempts, "batch sent");
                    return UploadOutcome::Sent { attempts };
                }
                Err(error) => {
                    if !error.is_retryable() || attempts >= self.policy.max_attempts {
                        tracing::warn!(
                            seq = batch.seq,
                            events = batch.len(),
                            attempts,
                            error = %error,
                            "batch dropped"
                        );
                        return UploadOutcome::Dropped { attempts, error };
                    }
                    let base = error.retry_after().unwrap_or(self.policy.base_backoff);
                    let backoff = base.saturating_mul(1u32 << (attempts - 1).min(16));
                    tracing::debug!(
                        seq = batch.seq,
                        attempt = attempts,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %error,
                        "retrying batch"
                    );
                    tokio::time::sleep(backoff).await;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Platform;
    use crate::events::Event;
    use serde_json::Map;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn batch(events: usize) -> Batch {
        Batch {
            seq: 7,
            events: (0..events)
                .map(|n| Event {
                    event_id: format!("e{n}"),
                    event_type: "screen_view".into(),
                    timestamp: 1_700_000_000_000,
                    app_id: "app".into(),
                    unique_id: "u".into(),
                    session_id: "s".into(),
                    platform: Platform::Ios,
                    attributes: Map::new(),
                })
                .collect(),
        }
    }

    /// Sink that fails the first `failures` sends, then succeeds
    struct FlakySink {
        failures: usize,
        calls: AtomicUsize,
        error: fn() -> UploadError,
    }

    #[async_trait]
    impl BatchSink for FlakySink {
        fn name(&self) -> &str {
            "flaky"
        }

        async fn send(&self, _batch: &Batch) -> Result<(), UploadError> {
            let call = self.calls.fetch_add(1, Ordering::SeqCst);
            if call < self.failures {
                Err((self.error)())
            } else {
                Ok(())
            }
        }
    }

    fn fast_policy(max_attempts: usize) -> RetryPolicy {
        RetryPolicy {
            max_attempts,
            base_backoff: Duration::from_millis(1),
        }
    }

    #[test]
    fn test_error_classification() {
        assert!(UploadError::Timeout.is_retryable());
        assert!(UploadError::RateLimited.is_retryable());
        assert!(UploadError::Server { status: 500 }.is_retryable());

        assert!(!UploadError::Rejected { status: 400 }.is_retryable());
        assert!(!UploadError::Rejected { status: 403 }.is_retryable());
        assert!(UploadError::Rejected { status: 400 }.retry_after().is_none());
    }

    #[tokio::test]
    async fn test_upload_succeeds_first_try() {
        let sink = Arc::new(FlakySink {
            failures: 0,
            calls: AtomicUsize::new(0),
            error: || UploadError::Timeout,
        });
        let uploader = Uploader::new(sink, fast_policy(3));

        match uploader.upload(&batch(3)).await {
            UploadOutcome::Sent { attempts } => assert_eq!(attempts, 1),
            other => panic!("expected Sent, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_upload_retries_then_succeeds() {
        let sink = Arc::new(FlakySink {
            failures: 2,
            calls: AtomicUsize::new(0),
            error: || UploadError::Server { status: 503 },
        });
        let uploader = Uploader::new(sink, fast_policy(5));

        match uploader.upload(&batch(3)).await {
            UploadOutcome::Sent { attempts } => assert_eq!(attempts, 3),
            other => panic!("expected Sent, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_three_server_errors_drop_the_batch() {
        // Backoff bases come from retry_after, so pause time to keep the
        // test instant.
        tokio::time::pause();
        let sink = Arc::new(FlakySink {
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
            error: || UploadError::Server { status: 500 },
        });
        let uploader = Uploader::new(Arc::clone(&sink) as Arc<dyn BatchSink>, fast_policy(3));

        match uploader.upload(&batch(10)).await {
            UploadOutcome::Dropped { attempts, error } => {
                assert_eq!(attempts, 3);
                assert!(matches!(error, UploadError::Server { status: 500 }));
            }
            other => panic!("expected Dropped, got {other:?}"),
        }
        assert_eq!(sink.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_fatal_error_drops_without_retry() {
        let sink = Arc::new(FlakySink {
            failures: usize::MAX,
            calls: AtomicUsize::new(0),
            error: || UploadError::Rejected { status: 403 },
        });
        let uploader = Uploader::new(Arc::clone(&sink) as Arc<dyn BatchSink>, fast_policy(3));

        match uploader.upload(&batch(1)).await {
            UploadOutcome::Dropped { attempts, .. } => assert_eq!(attempts, 1),
            other => panic!("expected Dropped, got {other:?}"),
        }
        assert_eq!(sink.calls.load(Ordering::SeqCst), 1);
    }
}
