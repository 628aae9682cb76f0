//! Collaborator traits consumed by producers and workers
//!
//! The engine knows nothing about HTML or HTTP. A source plugs in by
//! implementing [`Discovery`] (paginated listing of item keys) and
//! [`ItemProcessor`] (fetch and transform one item).

use crate::output::TransformedRecord;
use crate::SourceResult;
use async_trait::async_trait;

/// Paginated listing of item keys within a partition
#[async_trait]
pub trait Discovery: Send + Sync {
    /// Lists the page of item keys starting at offset `cursor`
    ///
    /// Keys are returned in listing order. An empty page means the partition
    /// is exhausted, and so does a page shorter than [`Discovery::page_size`]:
    /// the producer stops listing after either.
    async fn list(&self, partition: &str, cursor: u64) -> SourceResult<Vec<String>>;

    /// Number of keys on a full page
    fn page_size(&self) -> usize;

    /// Key the rate limiter paces listing requests for `partition` under
    fn rate_limit_key(&self, partition: &str) -> String;
}

/// Fetches one item and turns it into an output record
#[async_trait]
pub trait ItemProcessor: Send + Sync {
    /// Fetches and transforms `item_key`
    ///
    /// Errors are per-item: the worker logs them and moves on.
    async fn process(&self, partition: &str, item_key: &str) -> SourceResult<TransformedRecord>;

    /// Key the rate limiter paces item requests for `partition` under
    fn rate_limit_key(&self, partition: &str) -> String;
}
