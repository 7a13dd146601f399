//! Batching of generated events into upload-sized requests
//!
//! The accumulator is deliberately independent of generator speed: a batch
//! closes when it reaches the configured event count, or when the flush
//! duration has elapsed since its first event, whichever comes first. The
//! time bound exists for real-time mode, where traffic may trickle in
//! slower than the count threshold.

use crate::events::Event;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// An ordered, bounded group of events uploaded in one request
///
/// Ownership transfers to the uploader on emit; a batch has at most one
/// consumer.
#[derive(Debug, Clone)]
pub struct Batch {
    /// Monotone sequence number across the run
    pub seq: u64,
    /// Events in generation order
    pub events: Vec<Event>,
}

impl Batch {
    /// Number of events in the batch
    pub fn len(&self) -> usize {
        self.events.len()
    }

    /// Whether the batch holds no events
    pub fn is_empty(&self) -> bool {
        self.events.is_empty()
    }

    /// Serialize the events to the wire body (a JSON array)
    pub fn to_json(&self) -> Result<Vec<u8>, serde_json::Error> {
        serde_json::to_vec(&self.events)
    }
}

/// Groups events into batches bounded by count and by age
///
/// Batches are emitted in the order their first event arrived; event order
/// within a batch is generation order. Each worker owns one accumulator;
/// the sequence counter is shared so batch numbers stay unique across the
/// run.
#[derive(Debug)]
pub struct BatchAccumulator {
    capacity: usize,
    flush_after: Duration,
    max_event_span_ms: Option<i64>,
    seq: Arc<AtomicU64>,
    buf: Vec<Event>,
    first_event_at: Option<Instant>,
    first_event_ts: Option<i64>,
}

impl BatchAccumulator {
    /// New accumulator with its own private sequence counter
    pub fn new(capacity: usize, flush_after: Duration) -> Self {
        Self::with_seq_counter(capacity, flush_after, Arc::new(AtomicU64::new(0)))
    }

    /// New accumulator drawing batch numbers from a shared counter
    pub fn with_seq_counter(
        capacity: usize,
        flush_after: Duration,
        seq: Arc<AtomicU64>,
    ) -> Self {
        Self {
            capacity: capacity.max(1),
            flush_after,
            max_event_span_ms: None,
            seq,
            buf: Vec::new(),
            first_event_at: None,
            first_event_ts: None,
        }
    }

    /// Bound the event-time span one batch may cover
    ///
    /// An incoming event whose timestamp is `span` or more past the batch's
    /// first event closes the batch and opens the next one.
    pub fn with_event_span_bound(mut self, span: Duration) -> Self {
        self.max_event_span_ms = Some(span.as_millis() as i64);
        self
    }

    /// Buffer one event; returns the closed batch when a bound hits
    pub fn accept(&mut self, event: Event) -> Option<Batch> {
        let mut closed = None;
        if let (Some(span), Some(first_ts)) = (self.max_event_span_ms, self.first_event_ts) {
            if !self.buf.is_empty() && event.timestamp.saturating_sub(first_ts) >= span {
                closed = Some(self.close());
            }
        }
        if self.buf.is_empty() {
            self.first_event_at = Some(Instant::now());
            self.first_event_ts = Some(event.timestamp);
        }
        self.buf.push(event);
        if self.buf.len() >= self.capacity {
            // A span close leaves a single freshly-opened event, so both
            // bounds can never fire on the same accept.
            closed = Some(self.close());
        }
        closed
    }

    /// Emit the current partial batch if it has outlived the flush bound
    pub fn poll_flush(&mut self) -> Option<Batch> {
        match self.first_event_at {
            Some(first) if !self.buf.is_empty() && first.elapsed() >= self.flush_after => {
                Some(self.close())
            }
            _ => None,
        }
    }

    /// Force-close any partial batch; used at shutdown
    pub fn drain(&mut self) -> Option<Batch> {
        if self.buf.is_empty() {
            return None;
        }
        Some(self.close())
    }

    /// Events currently buffered
    pub fn pending(&self) -> usize {
        self.buf.len()
    }

    fn close(&mut self) -> Batch {
        self.first_event_at = None;
        self.first_event_ts = None;
        Batch {
            seq: self.seq.fetch_add(1, Ordering::SeqCst),
            events: std::mem::take(&mut self.buf),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Platform;
    use serde_json::Map;

    fn event(n: u32) -> Event {
        Event {
            event_id: format!("e{n}"),
            event_type: "note_edit".into(),
            timestamp: 1_700_000_000_000 + i64::from(n),
            app_id: "app".into(),
            unique_id: "user_00000001".into(),
            session_id: "s1".into(),
            platform: Platform::Web,
            attributes: Map::new(),
        }
    }

    #[test]
    fn test_count_bound_splits_batches() {
        // 25_000 events at a 10_000 cap: two full batches plus a drained tail.
        let mut acc = BatchAccumulator::new(10_000, Duration::from_secs(3600));
        let mut batches = Vec::new();

        for n in 0..25_000u32 {
            if let Some(batch) = acc.accept(event(n)) {
                batches.push(batch);
            }
        }
        if let Some(batch) = acc.drain() {
            batches.push(batch);
        }

        let sizes: Vec<usize> = batches.iter().map(Batch::len).collect();
        assert_eq!(sizes, vec![10_000, 10_000, 5_000]);
        let seqs: Vec<u64> = batches.iter().map(|b| b.seq).collect();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn test_generation_order_preserved() {
        let mut acc = BatchAccumulator::new(5, Duration::from_secs(3600));
        let mut emitted = Vec::new();
        for n in 0..12u32 {
            if let Some(batch) = acc.accept(event(n)) {
                emitted.extend(batch.events);
            }
        }
        emitted.extend(acc.drain().unwrap().events);

        let ids: Vec<&str> = emitted.iter().map(|e| e.event_id.as_str()).collect();
        let expected: Vec<String> = (0..12).map(|n| format!("e{n}")).collect();
        assert_eq!(ids, expected.iter().map(String::as_str).collect::<Vec<_>>());
    }

    #[test]
    fn test_flush_timer_emits_partial_batch() {
        let mut acc = BatchAccumulator::new(1000, Duration::from_millis(10));
        assert!(acc.accept(event(0)).is_none());
        assert!(acc.poll_flush().is_none());

        std::thread::sleep(Duration::from_millis(20));
        let batch = acc.poll_flush().expect("flush bound should emit");
        assert_eq!(batch.len(), 1);
        assert_eq!(acc.pending(), 0);
    }

    #[test]
    fn test_flush_timer_ignores_empty_buffer() {
        let mut acc = BatchAccumulator::new(10, Duration::from_millis(1));
        std::thread::sleep(Duration::from_millis(5));
        assert!(acc.poll_flush().is_none());
        assert!(acc.drain().is_none());
    }

    #[test]
    fn test_flush_age_resets_per_batch() {
        let mut acc = BatchAccumulator::new(2, Duration::from_millis(50));
        acc.accept(event(0));
        let full = acc.accept(event(1));
        assert!(full.is_some());

        // A fresh first event restarts the age clock.
        acc.accept(event(2));
        assert!(acc.poll_flush().is_none());
    }

    #[test]
    fn test_event_span_bound_closes_batch() {
        let mut acc = BatchAccumulator::new(1000, Duration::from_secs(3600))
            .with_event_span_bound(Duration::from_secs(120));

        // Events 1ms apart stay in one batch.
        assert!(acc.accept(event(0)).is_none());
        assert!(acc.accept(event(1)).is_none());

        // An event 2 minutes past the batch's first event closes it.
        let mut late = event(2);
        late.timestamp += 120_000;
        let batch = acc.accept(late).expect("span bound should close");
        assert_eq!(batch.len(), 2);
        assert_eq!(acc.pending(), 1);
    }

    #[test]
    fn test_shared_seq_counter_is_global() {
        let seq = Arc::new(AtomicU64::new(0));
        let mut a = BatchAccumulator::with_seq_counter(1, Duration::from_secs(1), Arc::clone(&seq));
        let mut b = BatchAccumulator::with_seq_counter(1, Duration::from_secs(1), Arc::clone(&seq));

        let first = a.accept(event(0)).unwrap();
        let second = b.accept(event(1)).unwrap();
        let third = a.accept(event(2)).unwrap();

        let mut seqs = vec![first.seq, second.seq, third.seq];
        seqs.sort_unstable();
        assert_eq!(seqs, vec![0, 1, 2]);
    }

    #[test]
    fn test_batch_json_roundtrip() {
        let batch = Batch {
            seq: 9,
            events: (0..4).map(event).collect(),
        };
        let body = batch.to_json().unwrap();
        let back: Vec<Event> = serde_json::from_slice(&body).unwrap();
        assert_eq!(back, batch.events);
    }
}
