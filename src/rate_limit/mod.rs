//! Per-key politeness delays
//!
//! This module provides rate limiting for remote sources, keyed by domain:
//!
//! - `DomainTracker`: per-key pacing state (interval, last request, request count)
//! - `RateLimiter`: the shared limiter handed to producers and workers, with a
//!   background task that sweeps idle trackers
//!
//! Trackers for unrelated keys are locked independently, so a slow domain never
//! delays requests to another.

mod limiter;
mod tracker;

pub use limiter::{RateLimitSettings, RateLimiter};
pub use tracker::{DomainTracker, TrackerSnapshot};
