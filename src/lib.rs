//! Crawl-Ledger: a resumable, rate-limited crawl engine
//!
//! This crate discovers items from a paginated remote source, fetches each one
//! through a pool of workers, and records progress per partition so a crawl can
//! resume after interruption without counting any item twice.

pub mod config;
pub mod crawler;
pub mod output;
pub mod queue;
pub mod rate_limit;
pub mod source;
pub mod state;
pub mod storage;

use thiserror::Error;

/// Main error type for Crawl-Ledger operations
#[derive(Debug, Error)]
pub enum CrawlError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("Storage error: {0}")]
    Storage(#[from] storage::StorageError),

    #[error("Source error: {0}")]
    Source(#[from] SourceError),

    #[error("Output error: {0}")]
    Output(#[from] output::OutputError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("HTTP client error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("URL parse error: {0}")]
    UrlParse(#[from] ::url::ParseError),

    #[error("Startup failed: {0}")]
    Startup(String),
}

/// Configuration-specific errors
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse TOML: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Invalid URL in config: {0}")]
    InvalidUrl(String),
}

/// Errors reported by the remote-source collaborators
#[derive(Debug, Error)]
pub enum SourceError {
    /// Network failure, 5xx or rate-limit response that persisted through retries
    #[error("Transient failure for {url}: {message}")]
    Transient { url: String, message: String },

    /// A response status that retrying will not fix
    #[error("HTTP {status} for {url}")]
    Http { url: String, status: u16 },

    /// The response arrived but its content could not be understood
    #[error("Failed to parse {url}: {message}")]
    Parse { url: String, message: String },

    #[error("Invalid URL: {0}")]
    InvalidUrl(String),
}

impl SourceError {
    /// Whether trying the same request again later might succeed
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }
}

/// Result type alias for Crawl-Ledger operations
pub type Result<T> = std::result::Result<T, CrawlError>;

/// Result type alias for configuration operations
pub type ConfigResult<T> = std::result::Result<T, ConfigError>;

/// Result type alias for source operations
pub type SourceResult<T> = std::result::Result<T, SourceError>;

// Re-export commonly used types
pub use config::Config;
pub use crawler::{Coordinator, CrawlReport};
pub use queue::{WorkItem, WorkQueue};
pub use rate_limit::RateLimiter;
pub use state::{PartitionState, StateStore};
