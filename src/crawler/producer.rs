//! Discovery producer, one per partition
//!
//! A producer resumes from the stored cursor, lists one page at a time through
//! the [`Discovery`] collaborator, enqueues every key not yet processed, and
//! advances the cursor after each page. A full queue makes it pause and retry
//! the same key, so no discovered key is dropped.

use crate::crawler::traits::Discovery;
use crate::queue::{WorkItem, WorkQueue};
use crate::rate_limit::RateLimiter;
use crate::state::StateStore;
use crate::storage::StorageError;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::Notify;

/// Lifecycle of a producer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProducerState {
    /// Created, loading the cursor
    Resuming,

    /// Requesting or enqueueing a page
    Listing,

    /// Waiting for room in a full queue
    Draining,

    /// The listing has no more pages
    Exhausted,

    /// Stopped by request or by an unrecoverable listing failure
    Stopped,
}

impl ProducerState {
    /// Whether the producer will not enqueue anything more
    pub fn is_finished(&self) -> bool {
        matches!(self, Self::Exhausted | Self::Stopped)
    }
}

impl fmt::Display for ProducerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Resuming => "resuming",
            Self::Listing => "listing",
            Self::Draining => "draining",
            Self::Exhausted => "exhausted",
            Self::Stopped => "stopped",
        };
        f.write_str(name)
    }
}

/// Pause and retry policy for a producer
#[derive(Debug, Clone)]
pub struct ProducerSettings {
    /// Pause before retrying a key the queue rejected
    pub backpressure_pause: Duration,

    /// Pause before retrying a failed listing
    pub listing_retry_pause: Duration,

    /// Consecutive failed listings after which the producer stops
    pub max_listing_failures: u32,
}

impl Default for ProducerSettings {
    fn default() -> Self {
        Self {
            backpressure_pause: Duration::from_millis(1000),
            listing_retry_pause: Duration::from_millis(5000),
            max_listing_failures: 5,
        }
    }
}

/// Lists item keys for one partition and feeds them to the work queue
pub struct Producer {
    partition: String,
    discovery: Arc<dyn Discovery>,
    queue: Arc<WorkQueue>,
    store: Arc<StateStore>,
    limiter: Arc<RateLimiter>,
    settings: ProducerSettings,
    state: Mutex<ProducerState>,
    stop_requested: AtomicBool,
    wake: Notify,
    enqueued: AtomicU64,
    skipped: AtomicU64,
}

/// Whether the producer loop should keep going
enum Flow {
    Continue,
    Halt(ProducerState),
}

impl Producer {
    pub fn new(
        partition: impl Into<String>,
        discovery: Arc<dyn Discovery>,
        queue: Arc<WorkQueue>,
        store: Arc<StateStore>,
        limiter: Arc<RateLimiter>,
        settings: ProducerSettings,
    ) -> Self {
        Self {
            partition: partition.into(),
            discovery,
            queue,
            store,
            limiter,
            settings,
            state: Mutex::new(ProducerState::Resuming),
            stop_requested: AtomicBool::new(false),
            wake: Notify::new(),
            enqueued: AtomicU64::new(0),
            skipped: AtomicU64::new(0),
        }
    }

    pub fn partition(&self) -> &str {
        &self.partition
    }

    pub fn state(&self) -> ProducerState {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Keys this producer put on the queue
    pub fn enqueued(&self) -> u64 {
        self.enqueued.load(Ordering::Relaxed)
    }

    /// Discovered keys skipped because they were already processed
    pub fn skipped(&self) -> u64 {
        self.skipped.load(Ordering::Relaxed)
    }

    /// Asks the producer to stop before its next listing; also cuts any pause short
    pub fn stop(&self) {
        self.stop_requested.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    pub fn should_stop(&self) -> bool {
        self.stop_requested.load(Ordering::SeqCst)
    }

    /// Runs the producer until the partition is exhausted or it is stopped
    ///
    /// Returns the final state, either [`ProducerState::Exhausted`] or
    /// [`ProducerState::Stopped`].
    pub async fn run(self: Arc<Self>) -> ProducerState {
        let final_state = self.produce().await;
        self.set_state(final_state);
        tracing::info!(
            partition = %self.partition,
            "Producer {}: {} enqueued, {} already processed",
            final_state,
            self.enqueued(),
            self.skipped()
        );
        final_state
    }

    async fn produce(&self) -> ProducerState {
        self.set_state(ProducerState::Resuming);
        let mut cursor = match self.store.get_cursor(&self.partition).await {
            Ok(cursor) => cursor,
            Err(e) => {
                tracing::error!(partition = %self.partition, "Cannot load cursor: {}", e);
                return ProducerState::Stopped;
            }
        };
        tracing::info!(partition = %self.partition, "Producer resuming from cursor {}", cursor);

        let rate_limit_key = self.discovery.rate_limit_key(&self.partition);
        let page_size = self.discovery.page_size();
        let mut failures = 0u32;

        loop {
            if self.should_stop() {
                return ProducerState::Stopped;
            }
            self.set_state(ProducerState::Listing);

            self.limiter.acquire(&rate_limit_key).await;
            let listing = self.discovery.list(&self.partition, cursor).await;
            self.limiter.record(&rate_limit_key);

            let batch = match listing {
                Ok(batch) => {
                    failures = 0;
                    batch
                }
                Err(e) if e.is_transient() => {
                    failures += 1;
                    if failures >= self.settings.max_listing_failures {
                        tracing::error!(
                            partition = %self.partition,
                            "Giving up after {} failed listings at cursor {}: {}",
                            failures,
                            cursor,
                            e
                        );
                        return ProducerState::Stopped;
                    }
                    tracing::warn!(
                        partition = %self.partition,
                        "Listing at cursor {} failed ({}/{}): {}",
                        cursor,
                        failures,
                        self.settings.max_listing_failures,
                        e
                    );
                    self.pause(self.settings.listing_retry_pause).await;
                    continue;
                }
                Err(e) => {
                    tracing::error!(
                        partition = %self.partition,
                        "Listing at cursor {} failed permanently: {}",
                        cursor,
                        e
                    );
                    return ProducerState::Stopped;
                }
            };

            if batch.is_empty() {
                tracing::info!(partition = %self.partition, "No more items at cursor {}", cursor);
                return ProducerState::Exhausted;
            }

            let batch_len = batch.len();
            tracing::debug!(
                partition = %self.partition,
                "Listed {} keys at cursor {}",
                batch_len,
                cursor
            );

            for item_key in batch {
                if let Flow::Halt(state) = self.offer(item_key).await {
                    return state;
                }
            }

            let next = cursor + batch_len as u64;
            if let Err(e) = self.store.advance_cursor(&self.partition, next).await {
                tracing::warn!(
                    partition = %self.partition,
                    "Cursor {} not persisted, a restart will relist this page: {}",
                    next,
                    e
                );
            }
            cursor = next;

            if batch_len < page_size {
                tracing::info!(
                    partition = %self.partition,
                    "Short page ({} of {}), listing complete",
                    batch_len,
                    page_size
                );
                return ProducerState::Exhausted;
            }
        }
    }

    /// Enqueues `item_key` unless already processed, waiting out backpressure
    async fn offer(&self, item_key: String) -> Flow {
        match self.store.is_processed(&self.partition, &item_key).await {
            Ok(true) => {
                self.skipped.fetch_add(1, Ordering::Relaxed);
                tracing::debug!(partition = %self.partition, item = %item_key, "Already processed");
                return Flow::Continue;
            }
            Ok(false) => {}
            Err(StorageError::InvalidItemKey(_)) => {
                tracing::warn!(
                    partition = %self.partition,
                    item = ?item_key,
                    "Discovered key cannot be recorded as processed, dropping it"
                );
                return Flow::Continue;
            }
            // The worker checks again before committing
            Err(e) => tracing::warn!(
                partition = %self.partition,
                item = %item_key,
                "Processed check failed, enqueueing anyway: {}",
                e
            ),
        }

        let item = WorkItem::new(self.partition.as_str(), item_key);
        loop {
            if self.queue.try_enqueue(item.clone()) {
                self.enqueued.fetch_add(1, Ordering::Relaxed);
                self.set_state(ProducerState::Listing);
                return Flow::Continue;
            }

            if !self.queue.is_running() || self.should_stop() {
                tracing::debug!(partition = %self.partition, item = %item, "Dropped on shutdown");
                return Flow::Halt(ProducerState::Stopped);
            }

            if self.state() != ProducerState::Draining {
                tracing::debug!(partition = %self.partition, "Queue full, pausing");
                self.set_state(ProducerState::Draining);
            }
            self.pause(self.settings.backpressure_pause).await;
        }
    }

    /// Sleeps for `duration`, returning early if [`Producer::stop`] is called
    async fn pause(&self, duration: Duration) {
        let woken = self.wake.notified();
        tokio::pin!(woken);
        woken.as_mut().enable();
        if self.should_stop() {
            return;
        }

        tokio::select! {
            _ = tokio::time::sleep(duration) => {}
            _ = woken => {}
        }
    }

    fn set_state(&self, state: ProducerState) {
        *self.state.lock().unwrap_or_else(|poisoned| poisoned.into_inner()) = state;
    }
}
