//! Remote issue-tracker source
//!
//! This module plugs a public issue tracker into the crawl engine:
//! - `HttpFetcher`: GET with retry, backoff and 429 tightening
//! - `parser`: issue keys from listing pages, issues from detail pages
//! - `IssueTrackerSource`: the `Discovery` and `ItemProcessor` implementation

mod fetcher;
mod issue;
pub mod parser;
mod tracker;

pub use fetcher::{build_http_client, host_key, HttpFetcher, RetryPolicy};
pub use issue::{Comment, Issue};
pub use tracker::IssueTrackerSource;
