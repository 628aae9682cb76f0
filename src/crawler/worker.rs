//! Fetch workers sharing one queue
//!
//! Each worker takes an item, skips it if it is already processed, fetches and
//! transforms it under the rate limiter, writes the result, then commits it to
//! the [`StateStore`]. A failed item is logged and abandoned; it never stops
//! the worker.

use crate::crawler::traits::ItemProcessor;
use crate::output::RecordWriter;
use crate::queue::{WorkItem, WorkQueue};
use crate::rate_limit::RateLimiter;
use crate::state::StateStore;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Per-worker counters
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WorkerStats {
    /// Items fetched, written and committed (or committed first by another worker)
    pub processed: u64,

    /// Items abandoned after a fetch, write or commit failure
    pub failed: u64,

    /// Items skipped because they were already processed
    pub skipped: u64,
}

impl std::ops::AddAssign for WorkerStats {
    fn add_assign(&mut self, other: Self) {
        self.processed += other.processed;
        self.failed += other.failed;
        self.skipped += other.skipped;
    }
}

/// Outcome of handling one item
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Outcome {
    Processed,
    Skipped,
    Failed,
}

/// A worker in the shared pool
pub struct Worker {
    id: usize,
    queue: Arc<WorkQueue>,
    store: Arc<StateStore>,
    limiter: Arc<RateLimiter>,
    processor: Arc<dyn ItemProcessor>,
    writer: Arc<dyn RecordWriter>,
    poll_timeout: Duration,
    stop_requested: AtomicBool,
    processed: AtomicU64,
    failed: AtomicU64,
    skipped: AtomicU64,
}

impl Worker {
    pub fn new(
        id: usize,
        queue: Arc<WorkQueue>,
        store: Arc<StateStore>,
        limiter: Arc<RateLimiter>,
        processor: Arc<dyn ItemProcessor>,
        writer: Arc<dyn RecordWriter>,
        poll_timeout: Duration,
    ) -> Self {
        Self {
            id,
            queue,
            store,
            limiter,
            processor,
            writer,
            poll_timeout,
            stop_requested: AtomicBool::new(false),
            processed: AtomicU64::new(0),
            failed: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn stats(&self) -> WorkerStats {
        WorkerStats {
            processed: self.processed.load(Ordering::Relaxed),
            failed: self.failed.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        }
    }

    /// Asks the worker to exit after its current item
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
    }

    pub fn should_stop(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Processes items until stopped or the queue stops
    pub async fn run(self: Arc<Self>) -> WorkerStats {
        tracing::debug!(worker = self.id, "Worker started");

        while !self.should_stop() {
            let Some(item) = self.queue.dequeue_timeout(self.poll_timeout).await else {
                if !self.queue.is_running() {
                    break;
                }
                continue;
            };

            match self.handle(&item).await {
                Outcome::Processed => {
                    self.processed.fetch_add(1, Ordering::Relaxed);
                    self.queue.mark_completed();
                }
                Outcome::Skipped => {
                    self.skipped.fetch_add(1, Ordering::Relaxed);
                    self.queue.mark_completed();
                }
                Outcome::Failed => {
                    self.failed.fetch_add(1, Ordering::Relaxed);
                    self.queue.mark_failed();
                }
            }
        }

        let stats = self.stats();
        tracing::debug!(
            worker = self.id,
            "Worker finished: {} processed, {} skipped, {} failed",
            stats.processed,
            stats.skipped,
            stats.failed
        );
        stats
    }

    async fn handle(&self, item: &WorkItem) -> Outcome {
        let partition = item.partition();
        let item_key = item.item_key();

        match self.store.is_processed(partition, item_key).await {
            Ok(true) => {
                tracing::debug!(worker = self.id, item = %item, "Already processed, skipping");
                return Outcome::Skipped;
            }
            Ok(false) => {}
            // The commit below is the authoritative check
            Err(e) => tracing::warn!(worker = self.id, item = %item, "Processed check failed: {}", e),
        }

        let rate_limit_key = self.processor.rate_limit_key(partition);
        self.limiter.acquire(&rate_limit_key).await;

        let record = match self.processor.process(partition, item_key).await {
            Ok(record) => record,
            Err(e) => {
                tracing::warn!(worker = self.id, item = %item, "Failed to process: {}", e);
                return Outcome::Failed;
            }
        };
        self.limiter.record(&rate_limit_key);

        if let Err(e) = self.writer.write(partition, &record) {
            tracing::error!(worker = self.id, item = %item, "Failed to write output: {}", e);
            return Outcome::Failed;
        }

        match self.store.try_commit(partition, item_key).await {
            Ok(true) => {
                tracing::debug!(worker = self.id, item = %item, "Committed");
                Outcome::Processed
            }
            Ok(false) => {
                tracing::debug!(worker = self.id, item = %item, "Committed earlier by another worker");
                Outcome::Processed
            }
            Err(e) => {
                tracing::error!(
                    worker = self.id,
                    item = %item,
                    "Output written but commit not durable, item may be reprocessed: {}",
                    e
                );
                Outcome::Failed
            }
        }
    }
}
