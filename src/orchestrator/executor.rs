//! Orchestrator execution logic
//!
//! Two pipelines share the same building blocks:
//!
//! - **real-time**: sharded generator workers feed a bounded queue drained
//!   by a pool of upload workers until the run duration elapses or a
//!   shutdown is requested;
//! - **historical**: parallel backfill lanes each own a slice of the user
//!   population and walk the whole day window for it, compressing and
//!   uploading inline.
//!
//! Per-batch outcomes flow over a records channel into an aggregator task,
//! so loss accounting survives workers that are abandoned at the shutdown
//! timeout.

use std::sync::atomic::AtomicU64;
use std::sync::Arc;
use std::time::{Duration, Instant};

use indicatif::{ProgressBar, ProgressStyle};
use tokio::sync::{broadcast, mpsc, Mutex, Semaphore};
use tokio::task::JoinHandle;

use crate::batch::{Batch, BatchAccumulator};
use crate::config::Profile;
use crate::error::Error;
use crate::events::{EventGenerator, GenerationWindow};
use crate::pacing::RateController;
use crate::population::{derive_seed, User, UserPopulation};
use crate::stats::{GeneratorStats, RunStats, UploadRecord, UploadStats};
use crate::uploader::{BatchSink, RetryPolicy, Uploader};

/// Offset so backfill lanes never share a seed lane with real-time workers
const BACKFILL_SEED_LANE: u64 = 1 << 32;

/// Coordinates generator and upload workers for one run
pub struct Orchestrator {
    pub(crate) profile: Arc<Profile>,
    pub(crate) sink: Arc<dyn BatchSink>,
    pub(crate) retry_policy: RetryPolicy,
    pub(crate) shutdown_timeout: Duration,
    pub(crate) queue_capacity: usize,
    pub(crate) shutdown_tx: broadcast::Sender<()>,
}

impl Orchestrator {
    /// Request a graceful shutdown of the running pipeline
    pub fn shutdown(&self) {
        let _ = self.shutdown_tx.send(());
    }

    /// The run profile
    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    /// Run the real-time pipeline
    ///
    /// Generates events stamped "now" until `run_for` elapses (when given)
    /// or [`shutdown`](Self::shutdown) is called. Generator workers own
    /// disjoint user shards, so no user's events are ever produced by two
    /// workers concurrently.
    pub async fn run_realtime(&self, run_for: Option<Duration>) -> Result<RunStats, Error> {
        let profile = Arc::clone(&self.profile);
        let start = Instant::now();
        let master_seed = profile.seed.unwrap_or_else(rand::random);

        let population = UserPopulation::from_profile(&profile, 1, master_seed)?;
        tracing::info!(
            users = population.len(),
            dau = population.dau(0),
            generator_workers = profile.generator_workers,
            upload_workers = profile.max_upload_workers,
            seed = master_seed,
            "starting real-time run"
        );

        let (batch_tx, batch_rx) = mpsc::channel::<Batch>(self.queue_capacity);
        let batch_rx = Arc::new(Mutex::new(batch_rx));
        let (record_tx, record_rx) = mpsc::channel::<UploadRecord>(1024);
        let seq = Arc::new(AtomicU64::new(0));
        let aggregator = spawn_aggregator(record_rx);

        let mut generator_handles = Vec::with_capacity(profile.generator_workers);
        for (worker_id, shard) in population
            .shards(profile.generator_workers)
            .into_iter()
            .enumerate()
        {
            generator_handles.push(tokio::spawn(run_generator_worker(
                worker_id,
                shard,
                Arc::clone(&profile),
                derive_seed(master_seed, worker_id as u64 + 1),
                batch_tx.clone(),
                self.shutdown_tx.subscribe(),
                Arc::clone(&seq),
            )));
        }
        drop(batch_tx);

        let uploader = Arc::new(Uploader::new(
            Arc::clone(&self.sink),
            self.retry_policy.clone(),
        ));
        let pacing = Arc::new(RateController::from_profile(&profile));
        let semaphore = Arc::new(Semaphore::new(profile.max_batch_requests_in_flight));
        let mut upload_handles = Vec::with_capacity(profile.max_upload_workers);
        for worker_id in 0..profile.max_upload_workers {
            upload_handles.push(tokio::spawn(run_upload_worker(
                worker_id,
                Arc::clone(&batch_rx),
                Arc::clone(&uploader),
                Arc::clone(&pacing),
                Arc::clone(&semaphore),
                record_tx.clone(),
            )));
        }
        drop(record_tx);

        // The run duration is just a delayed shutdown. Spawned after the
        // workers subscribe, so a short duration cannot fire into a
        // receiverless channel.
        let timer = run_for.map(|run_for| {
            let shutdown_tx = self.shutdown_tx.clone();
            tokio::spawn(async move {
                tokio::time::sleep(run_for).await;
                tracing::info!("run duration reached, initiating shutdown");
                let _ = shutdown_tx.send(());
            })
        });

        let generator = join_generators(generator_handles).await;

        // Uploaders drain the queue and exit when it closes; past the
        // timeout the rest is abandoned and counted as lost.
        let all_uploads = futures::future::join_all(upload_handles.iter_mut());
        if tokio::time::timeout(self.shutdown_timeout, all_uploads)
            .await
            .is_err()
        {
            tracing::warn!(
                timeout_secs = self.shutdown_timeout.as_secs(),
                "shutdown timeout expired, abandoning in-flight uploads"
            );
            for handle in &upload_handles {
                handle.abort();
            }
        }
        if let Some(timer) = timer {
            timer.abort();
        }

        let upload = close_out_uploads(aggregator, &generator).await?;
        let stats = RunStats {
            users: population.len(),
            generator,
            upload,
            elapsed: start.elapsed(),
        };
        log_run_complete(&stats);
        Ok(stats)
    }

    /// Run the real-time pipeline with Ctrl+C triggering graceful shutdown
    pub async fn run_realtime_with_signal_handling(
        &self,
        run_for: Option<Duration>,
    ) -> Result<RunStats, Error> {
        let signal = self.spawn_signal_task();
        let result = self.run_realtime(run_for).await;
        signal.abort();
        result
    }

    /// Run the historical backfill pipeline
    ///
    /// Covers `duration_of_days` past days. Each backfill lane owns a
    /// disjoint slice of users and the full window for them; a day's events
    /// are split into `gzip_passes_per_day` compress-and-upload passes.
    pub async fn run_historical(&self) -> Result<RunStats, Error> {
        let profile = Arc::clone(&self.profile);
        let start = Instant::now();
        let master_seed = profile.seed.unwrap_or_else(rand::random);
        let days = profile.duration_of_days;

        let population = UserPopulation::from_profile(&profile, days, master_seed)?;
        let total_user_days: u64 = population
            .users()
            .iter()
            .map(|u| u.active_day_count() as u64)
            .sum();
        tracing::info!(
            users = population.len(),
            days,
            user_days = total_user_days,
            lanes = profile.process_workers,
            seed = master_seed,
            "starting historical backfill"
        );

        let progress = ProgressBar::new(total_user_days);
        progress.set_style(
            ProgressStyle::default_bar()
                .template(
                    "{spinner:.green} [{elapsed_precise}] [{bar:40.cyan/blue}] {pos}/{len} ({eta})",
                )
                .expect("static template")
                .progress_chars("#>-"),
        );

        let (record_tx, record_rx) = mpsc::channel::<UploadRecord>(1024);
        let seq = Arc::new(AtomicU64::new(0));
        let aggregator = spawn_aggregator(record_rx);

        let uploader = Arc::new(Uploader::new(
            Arc::clone(&self.sink),
            self.retry_policy.clone(),
        ));
        let pacing = Arc::new(RateController::from_profile(&profile));
        let semaphore = Arc::new(Semaphore::new(profile.max_batch_requests_in_flight));

        let mut lane_handles = Vec::with_capacity(profile.process_workers);
        for (lane_id, slice) in population
            .shards(profile.process_workers)
            .into_iter()
            .enumerate()
        {
            lane_handles.push(tokio::spawn(run_backfill_lane(
                lane_id,
                slice,
                Arc::clone(&profile),
                derive_seed(master_seed, BACKFILL_SEED_LANE + lane_id as u64),
                Arc::clone(&uploader),
                Arc::clone(&pacing),
                Arc::clone(&semaphore),
                record_tx.clone(),
                Arc::clone(&seq),
                self.shutdown_tx.subscribe(),
                progress.clone(),
            )));
        }
        drop(record_tx);

        let generator = join_generators(lane_handles).await;
        progress.finish_with_message("backfill complete");

        let upload = close_out_uploads(aggregator, &generator).await?;
        let stats = RunStats {
            users: population.len(),
            generator,
            upload,
            elapsed: start.elapsed(),
        };
        log_run_complete(&stats);
        Ok(stats)
    }

    /// Run the historical pipeline with Ctrl+C triggering graceful shutdown
    pub async fn run_historical_with_signal_handling(&self) -> Result<RunStats, Error> {
        let signal = self.spawn_signal_task();
        let result = self.run_historical().await;
        signal.abort();
        result
    }

    fn spawn_signal_task(&self) -> JoinHandle<()> {
        let shutdown_tx = self.shutdown_tx.clone();
        tokio::spawn(async move {
            match tokio::signal::ctrl_c().await {
                Ok(()) => {
                    tracing::info!("received Ctrl+C, initiating graceful shutdown");
                    let _ = shutdown_tx.send(());
                }
                Err(e) => {
                    tracing::error!(error = %e, "failed to listen for Ctrl+C");
                }
            }
        })
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("app_kind", &self.profile.app_kind)
            .field("sink", &self.sink.name())
            .field("queue_capacity", &self.queue_capacity)
            .finish()
    }
}

/// Fold per-batch records into upload stats until every sender is gone
fn spawn_aggregator(mut record_rx: mpsc::Receiver<UploadRecord>) -> JoinHandle<UploadStats> {
    tokio::spawn(async move {
        let mut stats = UploadStats::new();
        while let Some(record) = record_rx.recv().await {
            stats.record(&record);
        }
        stats
    })
}

/// Join generator-side workers, merging stats and isolating failures
///
/// A worker that fails (an unsupported enum reaching generation, a panic)
/// aborts that worker only; the others keep running.
async fn join_generators(
    handles: Vec<JoinHandle<Result<GeneratorStats, Error>>>,
) -> GeneratorStats {
    let mut merged = GeneratorStats::default();
    for (worker_id, handle) in handles.into_iter().enumerate() {
        match handle.await {
            Ok(Ok(stats)) => merged.merge(&stats),
            Ok(Err(e)) => {
                tracing::error!(worker_id, error = %e, "generator worker failed");
            }
            Err(e) => {
                tracing::error!(worker_id, error = %e, "generator worker panicked");
            }
        }
    }
    merged
}

/// Await the aggregator and charge unaccounted batches to the loss counter
async fn close_out_uploads(
    aggregator: JoinHandle<UploadStats>,
    generator: &GeneratorStats,
) -> Result<UploadStats, Error> {
    let mut upload = aggregator
        .await
        .map_err(|e| Error::Orchestration(format!("aggregator task failed: {e}")))?;

    let accounted_batches = upload.batches_sent + upload.batches_dropped;
    if generator.batches > accounted_batches {
        let batches = generator.batches - accounted_batches;
        let events = generator
            .events
            .saturating_sub(upload.events_sent + upload.events_lost);
        tracing::warn!(batches, events, "uploads abandoned at shutdown counted as lost");
        upload.add_abandoned(batches, events);
    }
    Ok(upload)
}

fn log_run_complete(stats: &RunStats) {
    let latency = stats.upload.latency();
    tracing::info!(
        elapsed_secs = stats.elapsed.as_secs_f64(),
        users = stats.users,
        sessions = stats.generator.sessions,
        events = stats.generator.events,
        batches = stats.generator.batches,
        events_sent = stats.upload.events_sent,
        events_lost = stats.upload.events_lost,
        retries = stats.upload.retries,
        events_per_second = stats.events_per_second(),
        upload_p50_ms = latency.p50,
        upload_p99_ms = latency.p99,
        "run complete"
    );
}

/// Non-blocking check of the shutdown broadcast
///
/// Anything but an empty channel (a signal, a closed sender, a lagged
/// receiver) means the worker should wind down.
fn shutdown_requested(shutdown: &mut broadcast::Receiver<()>) -> bool {
    !matches!(
        shutdown.try_recv(),
        Err(broadcast::error::TryRecvError::Empty)
    )
}

/// Real-time generator worker: cycles over its user shard until shutdown
async fn run_generator_worker(
    worker_id: usize,
    users: Vec<User>,
    profile: Arc<Profile>,
    seed: u64,
    batch_tx: mpsc::Sender<Batch>,
    mut shutdown: broadcast::Receiver<()>,
    seq: Arc<AtomicU64>,
) -> Result<GeneratorStats, Error> {
    let mut generator = EventGenerator::new(&profile, seed).map_err(Error::Generation)?;
    let pacing = RateController::from_profile(&profile);
    let mut accumulator = BatchAccumulator::with_seq_counter(
        profile.events_per_request,
        profile.flush_duration,
        seq,
    )
    .with_event_span_bound(profile.batch_event_duration);
    let mut stats = GeneratorStats::default();

    tracing::debug!(worker_id, users = users.len(), "generator worker started");
    'run: loop {
        let mut produced = false;
        for user in &users {
            if shutdown_requested(&mut shutdown) {
                break 'run;
            }
            if !user.is_active_on(0) {
                continue;
            }
            produced = true;

            let events = generator.produce_events(user, &GenerationWindow::RealTime);
            stats.sessions += u64::from(user.session_count);
            stats.events += events.len() as u64;
            for event in events {
                if let Some(batch) = accumulator.accept(event) {
                    stats.batches += 1;
                    if batch_tx.send(batch).await.is_err() {
                        break 'run;
                    }
                }
            }
            if let Some(batch) = accumulator.poll_flush() {
                stats.batches += 1;
                if batch_tx.send(batch).await.is_err() {
                    break 'run;
                }
            }
            pacing.throttle().await;
        }
        if !produced {
            // Shard has no active users; idle until shutdown.
            if tokio::time::timeout(profile.flush_duration, shutdown.recv())
                .await
                .is_ok()
            {
                break 'run;
            }
        }
    }

    // Finish the current batch, then stop: no event is left half-buffered.
    if let Some(batch) = accumulator.drain() {
        stats.batches += 1;
        let _ = batch_tx.send(batch).await;
    }
    tracing::debug!(
        worker_id,
        sessions = stats.sessions,
        events = stats.events,
        batches = stats.batches,
        "generator worker finished"
    );
    Ok(stats)
}

/// Upload worker: drains the shared queue until it closes
async fn run_upload_worker(
    worker_id: usize,
    batch_rx: Arc<Mutex<mpsc::Receiver<Batch>>>,
    uploader: Arc<Uploader>,
    pacing: Arc<RateController>,
    semaphore: Arc<Semaphore>,
    record_tx: mpsc::Sender<UploadRecord>,
) {
    tracing::debug!(worker_id, "upload worker started");
    loop {
        let batch = { batch_rx.lock().await.recv().await };
        let Some(batch) = batch else { break };

        pacing.throttle().await;
        let permit = match semaphore.acquire().await {
            Ok(permit) => permit,
            Err(_) => break,
        };
        let start = Instant::now();
        let outcome = uploader.upload(&batch).await;
        drop(permit);

        let record = UploadRecord::from_outcome(&batch, outcome, start.elapsed());
        if record_tx.send(record).await.is_err() {
            break;
        }
    }
    tracing::debug!(worker_id, "upload worker finished");
}

/// Backfill lane: generates, batches, and uploads a user slice's history
#[allow(clippy::too_many_arguments)]
async fn run_backfill_lane(
    lane_id: usize,
    users: Vec<User>,
    profile: Arc<Profile>,
    seed: u64,
    uploader: Arc<Uploader>,
    pacing: Arc<RateController>,
    semaphore: Arc<Semaphore>,
    record_tx: mpsc::Sender<UploadRecord>,
    seq: Arc<AtomicU64>,
    mut shutdown: broadcast::Receiver<()>,
    progress: ProgressBar,
) -> Result<GeneratorStats, Error> {
    let mut generator = EventGenerator::new(&profile, seed).map_err(Error::Generation)?;
    // Backfill batches close by count or pass boundary, never by wall clock.
    let mut accumulator = BatchAccumulator::with_seq_counter(
        profile.events_per_request,
        Duration::from_secs(3600),
        seq,
    );
    let mut stats = GeneratorStats::default();

    tracing::debug!(lane_id, users = users.len(), "backfill lane started");
    for day in 0..profile.duration_of_days {
        let window = GenerationWindow::backfill_day(profile.duration_of_days, day);
        let active: Vec<&User> = users
            .iter()
            .filter(|u| u.is_active_on(day as usize))
            .collect();
        if active.is_empty() {
            continue;
        }

        let passes = profile.gzip_passes_per_day as usize;
        let per_pass = active.len().div_ceil(passes).max(1);
        for pass in active.chunks(per_pass) {
            if shutdown_requested(&mut shutdown) {
                if let Some(batch) = accumulator.drain() {
                    stats.batches += 1;
                    dispatch(&uploader, &pacing, &semaphore, &record_tx, batch).await;
                }
                tracing::info!(lane_id, day, "backfill lane stopped by shutdown");
                return Ok(stats);
            }

            for user in pass {
                let events = generator.produce_events(user, &window);
                stats.sessions += u64::from(user.session_count);
                stats.events += events.len() as u64;
                for event in events {
                    if let Some(batch) = accumulator.accept(event) {
                        stats.batches += 1;
                        dispatch(&uploader, &pacing, &semaphore, &record_tx, batch).await;
                    }
                }
                progress.inc(1);
            }
            // Pass boundary: the compress-and-upload unit ends here.
            if let Some(batch) = accumulator.drain() {
                stats.batches += 1;
                dispatch(&uploader, &pacing, &semaphore, &record_tx, batch).await;
            }
        }
    }
    tracing::debug!(
        lane_id,
        sessions = stats.sessions,
        events = stats.events,
        batches = stats.batches,
        "backfill lane finished"
    );
    Ok(stats)
}

/// Throttled, in-flight-capped upload of one batch
async fn dispatch(
    uploader: &Uploader,
    pacing: &RateController,
    semaphore: &Semaphore,
    record_tx: &mpsc::Sender<UploadRecord>,
    batch: Batch,
) {
    pacing.throttle().await;
    let Ok(permit) = semaphore.acquire().await else {
        return;
    };
    let start = Instant::now();
    let outcome = uploader.upload(&batch).await;
    drop(permit);
    let _ = record_tx
        .send(UploadRecord::from_outcome(&batch, outcome, start.elapsed()))
        .await;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::AppKind;
    use crate::orchestrator::OrchestratorBuilder;
    use crate::range::ClosedOpenRange;
    use crate::uploader::UploadError;
    use async_trait::async_trait;
    use std::sync::atomic::{AtomicU64 as AtomicCounter, Ordering};

    /// Sink that counts delivered events
    struct CountingSink {
        events: AtomicCounter,
        batches: AtomicCounter,
    }

    impl CountingSink {
        fn new() -> Self {
            Self {
                events: AtomicCounter::new(0),
                batches: AtomicCounter::new(0),
            }
        }
    }

    #[async_trait]
    impl BatchSink for CountingSink {
        fn name(&self) -> &str {
            "counting"
        }

        async fn send(&self, batch: &Batch) -> Result<(), UploadError> {
            self.batches.fetch_add(1, Ordering::SeqCst);
            self.events.fetch_add(batch.len() as u64, Ordering::SeqCst);
            Ok(())
        }
    }

    /// Sink that rejects everything with a fatal status
    struct RejectingSink;

    #[async_trait]
    impl BatchSink for RejectingSink {
        fn name(&self) -> &str {
            "rejecting"
        }

        async fn send(&self, _batch: &Batch) -> Result<(), UploadError> {
            Err(UploadError::Rejected { status: 400 })
        }
    }

    fn tiny_profile() -> Profile {
        let mut profile = Profile::benchmark(AppKind::Shopping);
        profile.all_users = 40;
        profile.dau_range = ClosedOpenRange::new(10, 20).unwrap();
        profile.session_count_range = ClosedOpenRange::new(1, 3).unwrap();
        profile.actions_per_session = ClosedOpenRange::new(1, 4).unwrap();
        profile.events_per_request = 16;
        profile.flush_duration = Duration::from_millis(20);
        profile.generator_workers = 2;
        profile.max_upload_workers = 2;
        profile.process_workers = 3;
        profile.duration_of_days = 2;
        profile.gzip_passes_per_day = 2;
        profile.need_sleep = true;
        profile.request_sleep_time = Duration::from_millis(1);
        profile.seed = Some(1234);
        profile
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_realtime_run_delivers_events() {
        let sink = Arc::new(CountingSink::new());
        let orchestrator = OrchestratorBuilder::new()
            .profile(tiny_profile())
            .sink(Arc::clone(&sink) as Arc<dyn BatchSink>)
            .shutdown_timeout(Duration::from_secs(5))
            .build()
            .unwrap();

        let stats = orchestrator
            .run_realtime(Some(Duration::from_millis(300)))
            .await
            .unwrap();

        assert!(stats.generator.events > 0, "no events generated");
        assert_eq!(stats.upload.events_lost, 0);
        assert_eq!(stats.upload.events_sent, sink.events.load(Ordering::SeqCst));
        // Every generated event is accounted for: sent or lost.
        assert_eq!(
            stats.generator.events,
            stats.upload.events_sent + stats.upload.events_lost
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_historical_run_covers_window() {
        let sink = Arc::new(CountingSink::new());
        let orchestrator = OrchestratorBuilder::new()
            .profile(tiny_profile())
            .sink(Arc::clone(&sink) as Arc<dyn BatchSink>)
            .build()
            .unwrap();

        let stats = orchestrator.run_historical().await.unwrap();

        assert!(stats.generator.events > 0);
        assert_eq!(stats.generator.batches, sink.batches.load(Ordering::SeqCst));
        assert_eq!(stats.upload.events_sent, stats.generator.events);
        assert_eq!(stats.upload.events_lost, 0);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_fatal_endpoint_counts_losses() {
        let orchestrator = OrchestratorBuilder::new()
            .profile(tiny_profile())
            .sink(Arc::new(RejectingSink))
            .build()
            .unwrap();

        let stats = orchestrator.run_historical().await.unwrap();

        assert!(stats.generator.events > 0);
        assert_eq!(stats.upload.events_sent, 0);
        assert_eq!(stats.upload.events_lost, stats.generator.events);
        assert_eq!(stats.upload.batches_dropped, stats.generator.batches);
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_explicit_shutdown_stops_realtime() {
        let sink = Arc::new(CountingSink::new());
        let orchestrator = Arc::new(
            OrchestratorBuilder::new()
                .profile(tiny_profile())
                .sink(Arc::clone(&sink) as Arc<dyn BatchSink>)
                .build()
                .unwrap(),
        );

        let trigger = Arc::clone(&orchestrator);
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(100)).await;
            trigger.shutdown();
        });

        let stats = orchestrator.run_realtime(None).await.unwrap();
        assert_eq!(
            stats.generator.events,
            stats.upload.events_sent + stats.upload.events_lost
        );
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_historical_deterministic_generation_counts() {
        let run = |seed: u64| async move {
            let sink = Arc::new(CountingSink::new());
            let mut profile = tiny_profile();
            profile.seed = Some(seed);
            let orchestrator = OrchestratorBuilder::new()
                .profile(profile)
                .sink(sink as Arc<dyn BatchSink>)
                .build()
                .unwrap();
            orchestrator.run_historical().await.unwrap().generator
        };

        let a = run(77).await;
        let b = run(77).await;
        assert_eq!(a.events, b.events);
        assert_eq!(a.sessions, b.sessions);
    }
}
