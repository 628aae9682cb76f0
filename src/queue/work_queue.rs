use chrono::{DateTime, Utc};
use std::collections::VecDeque;
use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::Duration;
use tokio::sync::Notify;

/// Capacity used when the configuration does not override it
pub const DEFAULT_QUEUE_CAPACITY: usize = 1000;

/// One unit of fetch work
///
/// Immutable once created: the fields are only readable through accessors.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct WorkItem {
    partition: String,
    item_key: String,
    enqueued_at: DateTime<Utc>,
}

impl WorkItem {
    /// Creates a new work item stamped with the current time
    pub fn new(partition: impl Into<String>, item_key: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            item_key: item_key.into(),
            enqueued_at: Utc::now(),
        }
    }

    /// The partition this item belongs to
    pub fn partition(&self) -> &str {
        &self.partition
    }

    /// The item key within its partition
    pub fn item_key(&self) -> &str {
        &self.item_key
    }

    /// When the item was created
    pub fn enqueued_at(&self) -> DateTime<Utc> {
        self.enqueued_at
    }
}

impl fmt::Display for WorkItem {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.partition, self.item_key)
    }
}

/// Observability counters for the queue
///
/// These are derived values and never a source of truth for correctness.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct QueueStats {
    pub total_enqueued: u64,
    pub total_completed: u64,
    pub total_failed: u64,
    pub current_size: usize,
    pub capacity: usize,
    pub running: bool,
}

impl QueueStats {
    /// Items enqueued but not yet marked completed or failed
    pub fn pending(&self) -> u64 {
        self.total_enqueued
            .saturating_sub(self.total_completed + self.total_failed)
    }
}

impl fmt::Display for QueueStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "queued={} completed={} failed={} pending={} size={}/{} running={}",
            self.total_enqueued,
            self.total_completed,
            self.total_failed,
            self.pending(),
            self.current_size,
            self.capacity,
            self.running
        )
    }
}

/// Bounded, thread-safe FIFO of [`WorkItem`]s
///
/// The queue starts stopped; [`WorkQueue::start`] must be called before items
/// are accepted. After [`WorkQueue::stop`], enqueueing always fails and every
/// waiter blocked in [`WorkQueue::dequeue`] returns `None`.
pub struct WorkQueue {
    items: Mutex<VecDeque<WorkItem>>,
    capacity: usize,
    running: AtomicBool,
    available: Notify,
    total_enqueued: AtomicU64,
    total_completed: AtomicU64,
    total_failed: AtomicU64,
}

impl WorkQueue {
    /// Creates a stopped queue holding at most `capacity` items
    ///
    /// A capacity of zero is raised to one so the queue can make progress.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            items: Mutex::new(VecDeque::with_capacity(capacity.min(DEFAULT_QUEUE_CAPACITY))),
            capacity,
            running: AtomicBool::new(false),
            available: Notify::new(),
            total_enqueued: AtomicU64::new(0),
            total_completed: AtomicU64::new(0),
            total_failed: AtomicU64::new(0),
        }
    }

    /// Starts accepting items
    pub fn start(&self) {
        if !self.running.swap(true, Ordering::SeqCst) {
            tracing::info!("Work queue started (capacity {})", self.capacity);
        }
    }

    /// Stops the queue and wakes every blocked consumer
    ///
    /// Calling this more than once is harmless.
    pub fn stop(&self) {
        if self.running.swap(false, Ordering::SeqCst) {
            tracing::info!("Work queue stopped");
        }
        self.available.notify_waiters();
    }

    /// Whether the queue currently accepts items
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Maximum number of items the queue will hold
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Attempts to add an item without blocking
    ///
    /// Returns `false` if the queue is full or not running. The caller owns
    /// any retry policy; the queue never delays.
    pub fn try_enqueue(&self, item: WorkItem) -> bool {
        if !self.is_running() {
            return false;
        }

        {
            let mut items = self.lock_items();
            if items.len() >= self.capacity {
                tracing::trace!("Queue full, rejecting {}", item);
                return false;
            }
            tracing::trace!("Enqueued {}", item);
            items.push_back(item);
        }

        self.total_enqueued.fetch_add(1, Ordering::Relaxed);
        self.available.notify_one();
        true
    }

    /// Removes the head item if one is present
    pub fn try_dequeue(&self) -> Option<WorkItem> {
        self.lock_items().pop_front()
    }

    /// Waits until an item is available or the queue is stopped
    ///
    /// Returns `None` as soon as the queue is stopped, even if items remain.
    pub async fn dequeue(&self) -> Option<WorkItem> {
        loop {
            let notified = self.available.notified();
            tokio::pin!(notified);
            // Register interest before checking so a concurrent push or stop
            // between the check and the await is not missed.
            notified.as_mut().enable();

            if !self.is_running() {
                return None;
            }
            if let Some(item) = self.try_dequeue() {
                return Some(item);
            }

            notified.await;
        }
    }

    /// Like [`WorkQueue::dequeue`], but gives up after `timeout`
    pub async fn dequeue_timeout(&self, timeout: Duration) -> Option<WorkItem> {
        tokio::time::timeout(timeout, self.dequeue())
            .await
            .ok()
            .flatten()
    }

    /// Records that a dequeued item was handled successfully
    pub fn mark_completed(&self) {
        self.total_completed.fetch_add(1, Ordering::Relaxed);
    }

    /// Records that a dequeued item was abandoned
    pub fn mark_failed(&self) {
        self.total_failed.fetch_add(1, Ordering::Relaxed);
    }

    /// Number of items currently queued
    pub fn len(&self) -> usize {
        self.lock_items().len()
    }

    /// Whether no items are queued
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Drops every queued item and resets the counters
    pub fn clear(&self) {
        self.lock_items().clear();
        self.total_enqueued.store(0, Ordering::Relaxed);
        self.total_completed.store(0, Ordering::Relaxed);
        self.total_failed.store(0, Ordering::Relaxed);
        tracing::info!("Work queue cleared");
    }

    /// Snapshot of the queue counters
    pub fn stats(&self) -> QueueStats {
        QueueStats {
            total_enqueued: self.total_enqueued.load(Ordering::Relaxed),
            total_completed: self.total_completed.load(Ordering::Relaxed),
            total_failed: self.total_failed.load(Ordering::Relaxed),
            current_size: self.len(),
            capacity: self.capacity,
            running: self.is_running(),
        }
    }

    fn lock_items(&self) -> std::sync::MutexGuard<'_, VecDeque<WorkItem>> {
        // A panic while holding this lock cannot leave the deque half-updated,
        // so a poisoned lock is still safe to use.
        self.items.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for WorkQueue {
    fn default() -> Self {
        Self::new(DEFAULT_QUEUE_CAPACITY)
    }
}
