use crate::crawler::{CrawlSettings, ProducerSettings};
use crate::rate_limit::RateLimitSettings;
use crate::source::RetryPolicy;
use crate::storage::BackendKind;
use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Main configuration structure for Crawl-Ledger
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Config {
    /// Partition (project) keys to crawl
    pub partitions: Vec<String>,

    #[serde(default)]
    pub crawler: CrawlerConfig,

    #[serde(default)]
    pub rate_limit: RateLimitConfig,

    pub source: SourceConfig,

    #[serde(default)]
    pub state: StateConfig,

    #[serde(default)]
    pub output: OutputConfig,
}

/// Crawl engine configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct CrawlerConfig {
    /// Number of fetch workers
    pub worker_count: usize,

    /// Bound on queued items
    pub queue_capacity: usize,

    /// Worker dequeue timeout (milliseconds)
    pub poll_timeout_ms: u64,

    /// Producer pause when the queue is full (milliseconds)
    pub backpressure_pause_ms: u64,

    /// Producer pause after a failed listing (milliseconds)
    pub listing_retry_pause_ms: u64,

    /// Consecutive failed listings before a producer gives up
    pub max_listing_failures: u32,

    /// Completion check period (milliseconds)
    pub monitor_interval_ms: u64,

    /// Progress log period (seconds)
    pub status_interval_secs: u64,

    /// Bound on waiting for tasks during shutdown (seconds)
    pub shutdown_timeout_secs: u64,
}

impl Default for CrawlerConfig {
    fn default() -> Self {
        Self {
            worker_count: 4,
            queue_capacity: 1000,
            poll_timeout_ms: 5000,
            backpressure_pause_ms: 1000,
            listing_retry_pause_ms: 5000,
            max_listing_failures: 5,
            monitor_interval_ms: 1000,
            status_interval_secs: 30,
            shutdown_timeout_secs: 30,
        }
    }
}

impl CrawlerConfig {
    pub fn to_settings(&self) -> CrawlSettings {
        CrawlSettings {
            worker_count: self.worker_count,
            queue_capacity: self.queue_capacity,
            poll_timeout: Duration::from_millis(self.poll_timeout_ms),
            monitor_interval: Duration::from_millis(self.monitor_interval_ms),
            status_interval: Duration::from_secs(self.status_interval_secs),
            shutdown_timeout: Duration::from_secs(self.shutdown_timeout_secs),
            producer: ProducerSettings {
                backpressure_pause: Duration::from_millis(self.backpressure_pause_ms),
                listing_retry_pause: Duration::from_millis(self.listing_retry_pause_ms),
                max_listing_failures: self.max_listing_failures,
            },
        }
    }
}

/// Politeness configuration, applied per remote host
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct RateLimitConfig {
    /// Minimum time between requests to the same host (milliseconds)
    pub min_interval_ms: u64,

    /// Ceiling when the interval is raised after a 429 (milliseconds)
    pub max_interval_ms: u64,

    /// Idle time after which a host's tracker is dropped (seconds)
    pub idle_timeout_secs: u64,

    /// How often idle trackers are swept (seconds)
    pub sweep_interval_secs: u64,
}

impl Default for RateLimitConfig {
    fn default() -> Self {
        Self {
            min_interval_ms: 2000,
            max_interval_ms: 60_000,
            idle_timeout_secs: 600,
            sweep_interval_secs: 300,
        }
    }
}

impl RateLimitConfig {
    pub fn to_settings(&self) -> RateLimitSettings {
        RateLimitSettings {
            default_interval: Duration::from_millis(self.min_interval_ms),
            max_interval: Duration::from_millis(self.max_interval_ms),
            idle_timeout: Duration::from_secs(self.idle_timeout_secs),
            sweep_interval: Duration::from_secs(self.sweep_interval_secs),
        }
    }
}

/// Remote issue tracker
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct SourceConfig {
    /// Tracker root URL, e.g. `https://issues.apache.org/jira`
    pub base_url: String,

    /// Issues on a full listing page
    #[serde(default = "default_page_size")]
    pub page_size: usize,

    /// Attempts per request, including the first
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,

    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

fn default_page_size() -> usize {
    50
}

fn default_max_retries() -> u32 {
    3
}

fn default_request_timeout_secs() -> u64 {
    30
}

fn default_user_agent() -> String {
    format!("crawl-ledger/{}", env!("CARGO_PKG_VERSION"))
}

impl SourceConfig {
    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    pub fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            max_attempts: self.max_retries,
            ..RetryPolicy::default()
        }
    }
}

/// Progress persistence
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct StateConfig {
    pub directory: PathBuf,
    pub backend: BackendKind,
}

impl Default for StateConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("crawl_state"),
            backend: BackendKind::default(),
        }
    }
}

/// Output configuration
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "kebab-case", default)]
pub struct OutputConfig {
    /// Directory JSONL files are written to
    pub directory: PathBuf,
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            directory: PathBuf::from("output"),
        }
    }
}
