//! Run statistics and loss accounting
//!
//! Upload workers report one [`UploadRecord`] per batch to an aggregator
//! task; the aggregator folds them into [`UploadStats`]. Batches that were
//! emitted but never accounted for (abandoned at the shutdown timeout) are
//! added to the loss counters when the run closes out.

use crate::batch::Batch;
use crate::uploader::UploadOutcome;
use std::time::Duration;

/// Counters owned by one generator worker or backfill lane
#[derive(Debug, Default, Clone)]
pub struct GeneratorStats {
    /// Sessions produced
    pub sessions: u64,
    /// Events produced
    pub events: u64,
    /// Batches emitted toward the uploader
    pub batches: u64,
}

impl GeneratorStats {
    /// Fold another worker's counters into this one
    pub fn merge(&mut self, other: &GeneratorStats) {
        self.sessions += other.sessions;
        self.events += other.events;
        self.batches += other.batches;
    }
}

/// What finally happened to one batch
#[derive(Debug, Clone)]
pub enum BatchDisposition {
    /// Delivered to the endpoint
    Sent,
    /// Dropped; events are lost
    Dropped {
        /// Final error, rendered for the record
        reason: String,
    },
}

/// One batch's upload outcome, reported to the aggregator
#[derive(Debug)]
pub struct UploadRecord {
    /// Batch sequence number
    pub seq: u64,
    /// Events the batch carried
    pub events: usize,
    /// Attempts spent, first try included
    pub attempts: usize,
    /// Final disposition
    pub disposition: BatchDisposition,
    /// Wall-clock time from first attempt to final outcome
    pub elapsed: Duration,
}

impl UploadRecord {
    /// Build a record from an upload outcome
    pub fn from_outcome(batch: &Batch, outcome: UploadOutcome, elapsed: Duration) -> Self {
        let (attempts, disposition) = match outcome {
            UploadOutcome::Sent { attempts } => (attempts, BatchDisposition::Sent),
            UploadOutcome::Dropped { attempts, error } => (
                attempts,
                BatchDisposition::Dropped {
                    reason: error.to_string(),
                },
            ),
        };
        Self {
            seq: batch.seq,
            events: batch.len(),
            attempts,
            disposition,
            elapsed,
        }
    }
}

/// Upload latency percentiles in milliseconds
#[derive(Debug, Clone, Copy, Default)]
pub struct LatencyPercentiles {
    /// Minimum
    pub min: f64,
    /// Median
    pub p50: f64,
    /// 90th percentile
    pub p90: f64,
    /// 99th percentile
    pub p99: f64,
    /// Maximum
    pub max: f64,
    /// Mean
    pub mean: f64,
}

/// Memory-efficient latency store backed by HdrHistogram
///
/// Microsecond precision, one hour ceiling.
pub struct LatencyHistogram {
    histogram: hdrhistogram::Histogram<u64>,
}

impl LatencyHistogram {
    /// Empty histogram
    pub fn new() -> Self {
        let histogram = hdrhistogram::Histogram::new_with_bounds(1, 3_600_000_000, 3)
            .expect("histogram bounds are static");
        Self { histogram }
    }

    /// Record one duration
    pub fn record(&mut self, duration: Duration) {
        let _ = self.histogram.record(duration.as_micros() as u64);
    }

    /// Recorded sample count
    pub fn len(&self) -> u64 {
        self.histogram.len()
    }

    /// Whether nothing has been recorded
    pub fn is_empty(&self) -> bool {
        self.histogram.is_empty()
    }

    /// Percentiles over everything recorded, in milliseconds
    pub fn percentiles(&self) -> LatencyPercentiles {
        if self.histogram.is_empty() {
            return LatencyPercentiles::default();
        }
        LatencyPercentiles {
            min: self.histogram.min() as f64 / 1000.0,
            p50: self.histogram.value_at_quantile(0.50) as f64 / 1000.0,
            p90: self.histogram.value_at_quantile(0.90) as f64 / 1000.0,
            p99: self.histogram.value_at_quantile(0.99) as f64 / 1000.0,
            max: self.histogram.max() as f64 / 1000.0,
            mean: self.histogram.mean() / 1000.0,
        }
    }
}

impl Default for LatencyHistogram {
    fn default() -> Self {
        Self::new()
    }
}

/// Aggregated upload-side counters for a run
pub struct UploadStats {
    /// Batches delivered
    pub batches_sent: u64,
    /// Events delivered
    pub events_sent: u64,
    /// Batches dropped (fatal error or retries exhausted)
    pub batches_dropped: u64,
    /// Events lost with dropped or abandoned batches
    pub events_lost: u64,
    /// Retry attempts beyond each batch's first try
    pub retries: u64,
    latency: LatencyHistogram,
}

impl UploadStats {
    /// Empty counters
    pub fn new() -> Self {
        Self {
            batches_sent: 0,
            events_sent: 0,
            batches_dropped: 0,
            events_lost: 0,
            retries: 0,
            latency: LatencyHistogram::new(),
        }
    }

    /// Fold one batch record into the counters
    pub fn record(&mut self, record: &UploadRecord) {
        self.retries += record.attempts.saturating_sub(1) as u64;
        self.latency.record(record.elapsed);
        match &record.disposition {
            BatchDisposition::Sent => {
                self.batches_sent += 1;
                self.events_sent += record.events as u64;
            }
            BatchDisposition::Dropped { .. } => {
                self.batches_dropped += 1;
                self.events_lost += record.events as u64;
            }
        }
    }

    /// Count batches that were emitted but never reached a final outcome
    /// (abandoned when the shutdown timeout expired)
    pub fn add_abandoned(&mut self, batches: u64, events: u64) {
        self.batches_dropped += batches;
        self.events_lost += events;
    }

    /// Upload latency percentiles in milliseconds
    pub fn latency(&self) -> LatencyPercentiles {
        self.latency.percentiles()
    }
}

impl Default for UploadStats {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for UploadStats {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UploadStats")
            .field("batches_sent", &self.batches_sent)
            .field("events_sent", &self.events_sent)
            .field("batches_dropped", &self.batches_dropped)
            .field("events_lost", &self.events_lost)
            .field("retries", &self.retries)
            .field("latency_samples", &self.latency.len())
            .finish()
    }
}

/// Everything known about one finished run
#[derive(Debug)]
pub struct RunStats {
    /// Users in the simulated population
    pub users: usize,
    /// Generation-side counters, merged across workers
    pub generator: GeneratorStats,
    /// Upload-side counters
    pub upload: UploadStats,
    /// Wall-clock run time
    pub elapsed: Duration,
}

impl RunStats {
    /// Generated events per wall-clock second
    pub fn events_per_second(&self) -> f64 {
        let secs = self.elapsed.as_secs_f64();
        if secs > 0.0 {
            self.generator.events as f64 / secs
        } else {
            0.0
        }
    }

    /// Delivered fraction of generated events, 0.0 - 1.0
    pub fn delivery_rate(&self) -> f64 {
        if self.generator.events == 0 {
            return 1.0;
        }
        self.upload.events_sent as f64 / self.generator.events as f64
    }
}
