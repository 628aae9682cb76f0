use crate::rate_limit::tracker::{DomainTracker, TrackerSnapshot};
use dashmap::DashMap;
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

/// Tuning for the [`RateLimiter`]
#[derive(Debug, Clone)]
pub struct RateLimitSettings {
    /// Interval assigned to a key the first time it is seen
    pub default_interval: Duration,

    /// Ceiling for [`RateLimiter::tighten`]
    pub max_interval: Duration,

    /// How long a tracker may go without activity before it is swept
    pub idle_timeout: Duration,

    /// How often the background sweep runs
    pub sweep_interval: Duration,
}

impl Default for RateLimitSettings {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_millis(2000),
            max_interval: Duration::from_secs(60),
            idle_timeout: Duration::from_secs(600),
            sweep_interval: Duration::from_secs(300),
        }
    }
}

struct Sweeper {
    handle: JoinHandle<()>,
    shutdown: watch::Sender<bool>,
}

/// Enforces a minimum interval between requests to the same key
///
/// Per-key state lives in a sharded concurrent map; an entry guard is held only
/// while a slot is computed, never across a sleep, so callers for different
/// keys do not wait on each other.
pub struct RateLimiter {
    trackers: Arc<DashMap<String, DomainTracker>>,
    settings: RateLimitSettings,
    sweeper: Mutex<Option<Sweeper>>,
}

impl RateLimiter {
    pub fn new(settings: RateLimitSettings) -> Self {
        Self {
            trackers: Arc::new(DashMap::new()),
            settings,
            sweeper: Mutex::new(None),
        }
    }

    pub fn settings(&self) -> &RateLimitSettings {
        &self.settings
    }

    /// Waits until a request to `key` is permitted
    ///
    /// The wait is measured from the previous request slot for the key, not
    /// from when this call was made, so concurrent callers queue up behind
    /// one another at `min_interval` spacing.
    pub async fn acquire(&self, key: &str) {
        let now = Instant::now();
        let slot = self.with_tracker(key, now, |tracker| tracker.reserve(now));

        if slot > now {
            let wait = slot - now;
            tracing::debug!("Rate limiting {}: waiting {:?}", key, wait);
            tokio::time::sleep_until(slot).await;
        }
    }

    /// Stamps now as the last request time for `key` and counts the request
    pub fn record(&self, key: &str) {
        let now = Instant::now();
        self.with_tracker(key, now, |tracker| tracker.record_request(now));
    }

    /// Changes the interval for `key`; takes effect on the next [`RateLimiter::acquire`]
    pub fn update_interval(&self, key: &str, interval: Duration) {
        let now = Instant::now();
        self.with_tracker(key, now, |tracker| tracker.set_interval(interval));
        tracing::info!("Rate limit interval for {} set to {:?}", key, interval);
    }

    /// Doubles the interval for `key`, capped at the configured maximum
    ///
    /// Returns the new interval.
    pub fn tighten(&self, key: &str) -> Duration {
        let now = Instant::now();
        let max = self.settings.max_interval;
        let interval = self.with_tracker(key, now, |tracker| {
            let doubled = std::cmp::min(tracker.min_interval().saturating_mul(2), max);
            tracker.set_interval(doubled);
            doubled
        });
        tracing::warn!("Rate limited by {}, interval raised to {:?}", key, interval);
        interval
    }

    /// Current interval for `key`, or the default for unseen keys
    pub fn interval(&self, key: &str) -> Duration {
        self.trackers
            .get(key)
            .map(|tracker| tracker.min_interval())
            .unwrap_or(self.settings.default_interval)
    }

    /// Snapshot of every live tracker
    pub fn stats(&self) -> HashMap<String, TrackerSnapshot> {
        self.trackers
            .iter()
            .map(|entry| (entry.key().clone(), entry.value().snapshot()))
            .collect()
    }

    /// Number of live trackers
    pub fn tracker_count(&self) -> usize {
        self.trackers.len()
    }

    /// Removes trackers idle for longer than the configured timeout
    ///
    /// Returns the number removed.
    pub fn sweep_idle(&self) -> usize {
        sweep(&self.trackers, self.settings.idle_timeout)
    }

    /// Starts the background sweep task if it is not already running
    ///
    /// Must be called from within a tokio runtime.
    pub fn spawn_sweeper(&self) {
        let mut sweeper = self.lock_sweeper();
        if sweeper.is_some() {
            return;
        }

        let trackers = Arc::clone(&self.trackers);
        let idle_timeout = self.settings.idle_timeout;
        let period = self.settings.sweep_interval;
        let (shutdown, mut stopped) = watch::channel(false);

        let handle = tokio::spawn(async move {
            let mut ticker = tokio::time::interval_at(Instant::now() + period, period);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {
                        sweep(&trackers, idle_timeout);
                    }
                    _ = stopped.changed() => break,
                }
            }
        });

        *sweeper = Some(Sweeper { handle, shutdown });
        tracing::debug!("Rate limiter sweep task started (every {:?})", period);
    }

    /// Stops the sweep task and waits for it to finish
    ///
    /// Safe to call repeatedly, or without having started the sweeper.
    pub async fn shutdown(&self) {
        let sweeper = self.lock_sweeper().take();
        if let Some(sweeper) = sweeper {
            let _ = sweeper.shutdown.send(true);
            if let Err(e) = sweeper.handle.await {
                tracing::warn!("Rate limiter sweep task ended abnormally: {}", e);
            }
            tracing::info!("Rate limiter shut down");
        }
    }

    fn with_tracker<T>(&self, key: &str, now: Instant, f: impl FnOnce(&mut DomainTracker) -> T) -> T {
        if let Some(mut tracker) = self.trackers.get_mut(key) {
            return f(&mut tracker);
        }
        let mut tracker = self
            .trackers
            .entry(key.to_string())
            .or_insert_with(|| DomainTracker::new(key, self.settings.default_interval, now));
        f(&mut tracker)
    }

    fn lock_sweeper(&self) -> std::sync::MutexGuard<'_, Option<Sweeper>> {
        self.sweeper.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl Default for RateLimiter {
    fn default() -> Self {
        Self::new(RateLimitSettings::default())
    }
}

fn sweep(trackers: &DashMap<String, DomainTracker>, idle_timeout: Duration) -> usize {
    let now = Instant::now();
    let before = trackers.len();
    trackers.retain(|key, tracker| {
        let idle = tracker.is_idle(now, idle_timeout);
        if idle {
            tracing::debug!("Removing inactive rate limit tracker: {}", key);
        }
        !idle
    });
    before.saturating_sub(trackers.len())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn limiter(interval_ms: u64) -> RateLimiter {
        RateLimiter::new(RateLimitSettings {
            default_interval: Duration::from_millis(interval_ms),
            max_interval: Duration::from_millis(interval_ms * 8),
            idle_timeout: Duration::from_millis(100),
            sweep_interval: Duration::from_millis(20),
        })
    }

    #[tokio::test]
    async fn test_first_acquire_is_immediate() {
        let limiter = limiter(1000);
        let started = std::time::Instant::now();
        limiter.acquire("example.com").await;
        assert!(started.elapsed() < Duration::from_millis(100));
    }

    #[tokio::test]
    async fn test_acquire_waits_after_record() {
        let limiter = limiter(80);
        limiter.acquire("example.com").await;
        limiter.record("example.com");

        let started = std::time::Instant::now();
        limiter.acquire("example.com").await;
        assert!(started.elapsed() >= Duration::from_millis(70));
    }

    #[tokio::test]
    async fn test_concurrent_callers_are_spaced() {
        let limiter = Arc::new(limiter(40));
        let started = std::time::Instant::now();

        let callers: Vec<_> = (0..5)
            .map(|_| {
                let limiter = Arc::clone(&limiter);
                tokio::spawn(async move {
                    limiter.acquire("example.com").await;
                    limiter.record("example.com");
                    std::time::Instant::now()
                })
            })
            .collect();

        let mut finished = Vec::new();
        for caller in callers {
            finished.push(caller.await.unwrap());
        }
        finished.sort();

        // Five requests need at least four full intervals between them.
        let last = finished[4].duration_since(started);
        assert!(last >= Duration::from_millis(155), "finished after {:?}", last);
        assert_eq!(limiter.stats()["example.com"].request_count, 5);
    }

    #[tokio::test]
    async fn test_keys_are_independent() {
        let limiter = Arc::new(limiter(2000));
        limiter.acquire("slow.example.com").await;
        limiter.record("slow.example.com");

        // A waiter queued on the slow key must not delay another key.
        let waiter = {
            let limiter = Arc::clone(&limiter);
            tokio::spawn(async move { limiter.acquire("slow.example.com").await })
        };

        let started = std::time::Instant::now();
        limiter.acquire("fast.example.com").await;
        assert!(started.elapsed() < Duration::from_millis(100));
        waiter.abort();
    }

    #[tokio::test]
    async fn test_update_interval_applies_to_next_acquire() {
        let limiter = limiter(50);
        limiter.acquire("example.com").await;
        limiter.record("example.com");

        limiter.update_interval("example.com", Duration::from_millis(100));
        assert_eq!(limiter.interval("example.com"), Duration::from_millis(100));

        let started = std::time::Instant::now();
        limiter.acquire("example.com").await;
        assert!(started.elapsed() >= Duration::from_millis(90));
    }

    #[tokio::test]
    async fn test_tighten_doubles_up_to_max() {
        let limiter = limiter(100);
        assert_eq!(limiter.tighten("example.com"), Duration::from_millis(200));
        assert_eq!(limiter.tighten("example.com"), Duration::from_millis(400));
        assert_eq!(limiter.tighten("example.com"), Duration::from_millis(800));
        assert_eq!(limiter.tighten("example.com"), Duration::from_millis(800));
    }

    #[test]
    fn test_interval_defaults_for_unknown_key() {
        let limiter = limiter(250);
        assert_eq!(limiter.interval("unknown"), Duration::from_millis(250));
        assert_eq!(limiter.tracker_count(), 0);
    }

    #[tokio::test]
    async fn test_sweep_removes_idle_trackers_only() {
        let limiter = limiter(10);
        limiter.record("old.example.com");
        tokio::time::sleep(Duration::from_millis(150)).await;
        limiter.record("new.example.com");

        assert_eq!(limiter.sweep_idle(), 1);
        let stats = limiter.stats();
        assert!(stats.contains_key("new.example.com"));
        assert!(!stats.contains_key("old.example.com"));
    }

    #[tokio::test]
    async fn test_background_sweeper_and_shutdown() {
        let limiter = limiter(10);
        limiter.spawn_sweeper();
        limiter.spawn_sweeper();
        limiter.record("example.com");

        tokio::time::sleep(Duration::from_millis(250)).await;
        assert_eq!(limiter.tracker_count(), 0);

        limiter.shutdown().await;
        limiter.shutdown().await;
    }
}
