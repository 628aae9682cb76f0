use chrono::{DateTime, Utc};
use std::time::Duration;
use tokio::time::Instant;

/// Point-in-time view of a tracker, for status reporting
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSnapshot {
    pub key: String,
    pub min_interval_ms: u64,
    pub request_count: u64,
    pub last_request_at: Option<DateTime<Utc>>,
}

/// Tracks the pacing of requests to a single rate-limit key
///
/// The anchor (`last_request`) is the instant of the most recent request slot,
/// either handed out by [`DomainTracker::reserve`] or stamped by
/// [`DomainTracker::record_request`]. It only ever moves forward.
#[derive(Debug, Clone)]
pub struct DomainTracker {
    key: String,

    /// Minimum time between two requests to this key
    min_interval: Duration,

    /// Anchor for the next slot
    last_request: Option<Instant>,

    /// Last reservation or recorded request, used by the idle sweep
    last_activity: Instant,

    /// Number of recorded requests
    request_count: u64,

    /// Wall-clock time of the last recorded request
    last_request_at: Option<DateTime<Utc>>,
}

impl DomainTracker {
    /// Creates a tracker with no request history
    pub fn new(key: impl Into<String>, min_interval: Duration, now: Instant) -> Self {
        Self {
            key: key.into(),
            min_interval,
            last_request: None,
            last_activity: now,
            request_count: 0,
            last_request_at: None,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn min_interval(&self) -> Duration {
        self.min_interval
    }

    pub fn request_count(&self) -> u64 {
        self.request_count
    }

    /// Claims the next request slot and returns the instant it opens
    ///
    /// The slot is `min_interval` after the current anchor (or `now` if that
    /// is later), and becomes the new anchor. Concurrent callers therefore
    /// receive slots spaced by at least `min_interval`.
    pub fn reserve(&mut self, now: Instant) -> Instant {
        let slot = match self.last_request {
            Some(last) => std::cmp::max(now, last + self.min_interval),
            None => now,
        };
        self.last_request = Some(slot);
        self.last_activity = now;
        slot
    }

    /// Records that a request was made at `now`
    pub fn record_request(&mut self, now: Instant) {
        self.last_request = Some(match self.last_request {
            Some(last) => std::cmp::max(last, now),
            None => now,
        });
        self.last_activity = now;
        self.request_count += 1;
        self.last_request_at = Some(Utc::now());
    }

    /// Replaces the minimum interval; applies from the next reservation on
    pub fn set_interval(&mut self, min_interval: Duration) {
        self.min_interval = min_interval;
    }

    /// Calculates the time until the next request can be made
    ///
    /// Returns None if a request can be made now, or the duration to wait otherwise.
    pub fn time_until_next_request(&self, now: Instant) -> Option<Duration> {
        let last = self.last_request?;
        let ready_at = last + self.min_interval;
        if ready_at > now {
            Some(ready_at - now)
        } else {
            None
        }
    }

    /// Whether the tracker has seen no activity for `idle_timeout` and holds
    /// no reservation in the future
    pub fn is_idle(&self, now: Instant, idle_timeout: Duration) -> bool {
        let reserved_ahead = self.last_request.is_some_and(|last| last > now);
        !reserved_ahead && now.saturating_duration_since(self.last_activity) >= idle_timeout
    }

    pub fn snapshot(&self) -> TrackerSnapshot {
        TrackerSnapshot {
            key: self.key.clone(),
            min_interval_ms: self.min_interval.as_millis() as u64,
            request_count: self.request_count,
            last_request_at: self.last_request_at,
        }
    }
}
