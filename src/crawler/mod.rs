//! Crawl engine
//!
//! This module contains the core crawling logic, including:
//! - Per-partition producers that page through listings from the saved cursor
//! - A worker pool that fetches, writes and commits items
//! - The coordinator that starts, monitors and shuts everything down
//!
//! Remote sources plug in through the [`Discovery`] and [`ItemProcessor`] traits.

mod coordinator;
mod producer;
#[cfg(test)]
mod testing;
mod traits;
mod worker;

pub use coordinator::{Coordinator, CrawlReport, CrawlSettings};
pub use producer::{Producer, ProducerSettings, ProducerState};
pub use traits::{Discovery, ItemProcessor};
pub use worker::{Worker, WorkerStats};

use crate::config::Config;
use crate::output::JsonlWriter;
use crate::rate_limit::RateLimiter;
use crate::source::{build_http_client, HttpFetcher, IssueTrackerSource};
use crate::state::StateStore;
use crate::storage::open_backend;
use std::future::Future;
use std::sync::Arc;

/// Opens the configured state backend and wraps it in a [`StateStore`]
///
/// Fails if the state directory or database cannot be created.
pub fn open_store(config: &Config) -> crate::Result<StateStore> {
    let backend = open_backend(config.state.backend, &config.state.directory)?;
    Ok(StateStore::new(backend))
}

/// Runs a complete crawl operation
///
/// This is the main entry point for starting a crawl. It will:
/// 1. Open the state store
/// 2. Build the rate limiter, HTTP client and issue-tracker source
/// 3. Open the JSONL output
/// 4. Run the coordinator until completion or `shutdown_signal`
///
/// # Arguments
///
/// * `config` - The crawler configuration
/// * `shutdown_signal` - Resolves when the operator asks the crawl to stop
///
/// # Returns
///
/// * `Ok(CrawlReport)` - Crawl ended and was shut down cleanly
/// * `Err(CrawlError)` - Startup failed or the output could not be closed
pub async fn run_crawl<F>(config: &Config, shutdown_signal: F) -> crate::Result<CrawlReport>
where
    F: Future<Output = ()>,
{
    let store = Arc::new(open_store(config)?);
    run_crawl_with_store(config, store, shutdown_signal).await
}

/// [`run_crawl`] against an already opened store
pub async fn run_crawl_with_store<F>(
    config: &Config,
    store: Arc<StateStore>,
    shutdown_signal: F,
) -> crate::Result<CrawlReport>
where
    F: Future<Output = ()>,
{
    let limiter = Arc::new(RateLimiter::new(config.rate_limit.to_settings()));

    let client = build_http_client(&config.source.user_agent, config.source.request_timeout())?;
    let fetcher = HttpFetcher::new(
        client,
        Arc::clone(&limiter),
        config.source.retry_policy(),
    );
    let source = Arc::new(IssueTrackerSource::new(
        &config.source.base_url,
        config.source.page_size,
        fetcher,
    )?);

    let writer = Arc::new(JsonlWriter::new(&config.output.directory)?);

    let coordinator = Coordinator::new(
        config.crawler.to_settings(),
        &config.partitions,
        store,
        limiter,
        Arc::clone(&source) as Arc<dyn Discovery>,
        source as Arc<dyn ItemProcessor>,
        writer,
    );

    coordinator.run(shutdown_signal).await
}
