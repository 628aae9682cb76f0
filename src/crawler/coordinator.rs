//! Crawler coordinator - lifecycle of a whole crawl
//!
//! This module wires the shared queue, rate limiter and state store to one
//! producer per partition and a pool of workers, including:
//! - Starting every component in dependency order
//! - Periodic progress logging
//! - Detecting natural completion (all producers finished, no item pending)
//! - Ordered, idempotent, time-bounded shutdown

use crate::crawler::producer::{Producer, ProducerSettings, ProducerState};
use crate::crawler::traits::{Discovery, ItemProcessor};
use crate::crawler::worker::{Worker, WorkerStats};
use crate::output::RecordWriter;
use crate::queue::{QueueStats, WorkQueue, DEFAULT_QUEUE_CAPACITY};
use crate::rate_limit::RateLimiter;
use crate::state::StateStore;
use std::fmt;
use std::future::Future;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;
use tokio::time::{Instant, MissedTickBehavior};

/// Engine tuning for one crawl
#[derive(Debug, Clone)]
pub struct CrawlSettings {
    pub worker_count: usize,
    pub queue_capacity: usize,

    /// How long a worker waits on an empty queue before re-checking its stop flag
    pub poll_timeout: Duration,

    /// How often the coordinator checks for completion
    pub monitor_interval: Duration,

    /// How often progress is logged
    pub status_interval: Duration,

    /// Bound on waiting for tasks during shutdown
    pub shutdown_timeout: Duration,

    pub producer: ProducerSettings,
}

impl Default for CrawlSettings {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            poll_timeout: Duration::from_millis(5000),
            monitor_interval: Duration::from_millis(1000),
            status_interval: Duration::from_secs(30),
            shutdown_timeout: Duration::from_secs(30),
            producer: ProducerSettings::default(),
        }
    }
}

/// Final tally of a crawl
#[derive(Debug, Clone)]
pub struct CrawlReport {
    pub items_processed: u64,
    pub items_failed: u64,
    pub items_skipped: u64,
    pub queue: QueueStats,

    /// Final producer state per partition, in configuration order
    pub partitions: Vec<(String, ProducerState)>,

    pub elapsed: Duration,
}

impl CrawlReport {
    /// Whether every partition's listing ran to its end
    pub fn is_complete(&self) -> bool {
        self.partitions
            .iter()
            .all(|(_, state)| *state == ProducerState::Exhausted)
    }
}

impl fmt::Display for CrawlReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{} processed, {} failed, {} skipped in {:.1}s",
            self.items_processed,
            self.items_failed,
            self.items_skipped,
            self.elapsed.as_secs_f64()
        )?;
        for (partition, state) in &self.partitions {
            write!(f, "; {} {}", partition, state)?;
        }
        Ok(())
    }
}

#[derive(Default)]
struct Tasks {
    producers: Vec<JoinHandle<ProducerState>>,
    workers: Vec<JoinHandle<WorkerStats>>,
}

/// Main crawler coordinator structure
pub struct Coordinator {
    settings: CrawlSettings,
    queue: Arc<WorkQueue>,
    store: Arc<StateStore>,
    limiter: Arc<RateLimiter>,
    writer: Arc<dyn RecordWriter>,
    producers: Vec<Arc<Producer>>,
    workers: Vec<Arc<Worker>>,
    tasks: Mutex<Tasks>,
    started: AtomicBool,
    shut_down: AtomicBool,
}

impl Coordinator {
    /// Creates a coordinator with one producer per partition
    ///
    /// # Arguments
    ///
    /// * `settings` - Engine tuning
    /// * `partitions` - Partition keys to crawl
    /// * `store` - Progress store shared by producers and workers
    /// * `limiter` - Rate limiter shared by producers and workers
    /// * `discovery` - Listing collaborator
    /// * `processor` - Fetch and transform collaborator
    /// * `writer` - Output collaborator
    pub fn new(
        settings: CrawlSettings,
        partitions: &[String],
        store: Arc<StateStore>,
        limiter: Arc<RateLimiter>,
        discovery: Arc<dyn Discovery>,
        processor: Arc<dyn ItemProcessor>,
        writer: Arc<dyn RecordWriter>,
    ) -> Self {
        let queue = Arc::new(WorkQueue::new(settings.queue_capacity));

        let producers = partitions
            .iter()
            .map(|partition| {
                Arc::new(Producer::new(
                    partition.as_str(),
                    Arc::clone(&discovery),
                    Arc::clone(&queue),
                    Arc::clone(&store),
                    Arc::clone(&limiter),
                    settings.producer.clone(),
                ))
            })
            .collect();

        let workers = (0..settings.worker_count.max(1))
            .map(|id| {
                Arc::new(Worker::new(
                    id,
                    Arc::clone(&queue),
                    Arc::clone(&store),
                    Arc::clone(&limiter),
                    Arc::clone(&processor),
                    Arc::clone(&writer),
                    settings.poll_timeout,
                ))
            })
            .collect();

        Self {
            settings,
            queue,
            store,
            limiter,
            writer,
            producers,
            workers,
            tasks: Mutex::new(Tasks::default()),
            started: AtomicBool::new(false),
            shut_down: AtomicBool::new(false),
        }
    }

    pub fn queue(&self) -> &Arc<WorkQueue> {
        &self.queue
    }

    pub fn store(&self) -> &Arc<StateStore> {
        &self.store
    }

    /// Current state of every producer, in configuration order
    pub fn producer_states(&self) -> Vec<(String, ProducerState)> {
        self.producers
            .iter()
            .map(|p| (p.partition().to_string(), p.state()))
            .collect()
    }

    /// Summed counters of every worker
    pub fn worker_stats(&self) -> WorkerStats {
        let mut total = WorkerStats::default();
        for worker in &self.workers {
            total += worker.stats();
        }
        total
    }

    /// All producers finished and every enqueued item handled
    ///
    /// Items a worker has dequeued but not yet marked count as outstanding,
    /// so the final fetches finish before shutdown starts its timeout.
    pub fn is_complete(&self) -> bool {
        self.producers.iter().all(|p| p.state().is_finished())
            && self.queue.is_empty()
            && self.queue.stats().pending() == 0
    }

    /// Starts the queue, the sweep task, the workers and the producers
    ///
    /// Must be called from within a tokio runtime. Calling it again is a no-op.
    pub fn start(&self) {
        if self.started.swap(true, Ordering::SeqCst) {
            return;
        }

        tracing::info!(
            "Starting crawl of {} partitions with {} workers",
            self.producers.len(),
            self.workers.len()
        );

        self.queue.start();
        self.limiter.spawn_sweeper();

        let mut tasks = self.lock_tasks();
        for worker in &self.workers {
            tasks.workers.push(tokio::spawn(Arc::clone(worker).run()));
        }
        for producer in &self.producers {
            tasks.producers.push(tokio::spawn(Arc::clone(producer).run()));
        }
    }

    /// Runs the crawl until it completes or `shutdown_signal` resolves
    ///
    /// # Returns
    ///
    /// * `Ok(CrawlReport)` - The crawl ended and every component was shut down
    /// * `Err(CrawlError)` - The output could not be flushed or closed
    pub async fn run<F>(&self, shutdown_signal: F) -> crate::Result<CrawlReport>
    where
        F: Future<Output = ()>,
    {
        let started = Instant::now();
        self.start();

        tokio::pin!(shutdown_signal);
        let mut monitor = tokio::time::interval(self.settings.monitor_interval);
        monitor.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut last_status = Instant::now();

        loop {
            tokio::select! {
                _ = &mut shutdown_signal => {
                    tracing::info!("Shutdown requested, stopping crawl");
                    break;
                }
                _ = monitor.tick() => {
                    if self.is_complete() {
                        tracing::info!("All producers finished and every item was handled");
                        break;
                    }
                    if last_status.elapsed() >= self.settings.status_interval {
                        self.log_status();
                        last_status = Instant::now();
                    }
                }
            }
        }

        let closed = self.shutdown().await;
        let report = self.report(started.elapsed());
        tracing::info!("Crawl finished: {}", report);
        closed.map(|_| report)
    }

    /// Stops everything in order: producers, workers, queue, rate limiter, output
    ///
    /// Waits for tasks up to the configured timeout and aborts stragglers.
    /// Only the first call does anything.
    pub async fn shutdown(&self) -> crate::Result<()> {
        if self.shut_down.swap(true, Ordering::SeqCst) {
            return Ok(());
        }
        tracing::info!("Shutting down crawler");

        for producer in &self.producers {
            producer.stop();
        }
        for worker in &self.workers {
            worker.stop();
        }
        self.queue.stop();

        let tasks = std::mem::take(&mut *self.lock_tasks());
        let deadline = Instant::now() + self.settings.shutdown_timeout;
        for handle in tasks.producers {
            join_until(handle, deadline, "producer").await;
        }
        for handle in tasks.workers {
            join_until(handle, deadline, "worker").await;
        }

        self.limiter.shutdown().await;

        if let Err(e) = self.writer.flush() {
            tracing::error!("Failed to flush output: {}", e);
        }
        self.writer.close()?;

        tracing::info!("Shutdown complete");
        Ok(())
    }

    fn report(&self, elapsed: Duration) -> CrawlReport {
        let stats = self.worker_stats();
        CrawlReport {
            items_processed: stats.processed,
            items_failed: stats.failed,
            items_skipped: stats.skipped,
            queue: self.queue.stats(),
            partitions: self.producer_states(),
            elapsed,
        }
    }

    fn log_status(&self) {
        let stats = self.worker_stats();
        tracing::info!(
            "Progress: {} processed, {} failed, {} skipped | queue {}",
            stats.processed,
            stats.failed,
            stats.skipped,
            self.queue.stats()
        );

        for (partition, state) in self.producer_states() {
            tracing::info!(partition = %partition, "Producer {}", state);
        }

        for (key, tracker) in self.limiter.stats() {
            tracing::debug!(
                "Rate limit {}: {} requests, interval {}ms",
                key,
                tracker.request_count,
                tracker.min_interval_ms
            );
        }
    }

    fn lock_tasks(&self) -> std::sync::MutexGuard<'_, Tasks> {
        self.tasks.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

/// Waits for `handle` until `deadline`, aborting it if it is still running
async fn join_until<T>(mut handle: JoinHandle<T>, deadline: Instant, what: &str) {
    match tokio::time::timeout_at(deadline, &mut handle).await {
        Ok(Ok(_)) => {}
        Ok(Err(e)) if e.is_cancelled() => {}
        Ok(Err(e)) => tracing::warn!("A {} task ended abnormally: {}", what, e),
        Err(_) => {
            tracing::warn!("A {} task did not stop within the shutdown timeout, aborting", what);
            handle.abort();
        }
    }
}
