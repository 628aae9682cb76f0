//! Issue-tracker source
//!
//! Lists a project's issues page by page from the tracker's issue navigator
//! and turns each issue's detail page into an output record.

use crate::crawler::{Discovery, ItemProcessor};
use crate::output::{to_record, TransformedRecord};
use crate::source::fetcher::{host_key, HttpFetcher};
use crate::source::parser::{extract_issue_keys, parse_issue};
use crate::{SourceError, SourceResult};
use async_trait::async_trait;

/// Both collaborators of the crawl engine, backed by one issue tracker
pub struct IssueTrackerSource {
    base_url: String,
    host: String,
    page_size: usize,
    fetcher: HttpFetcher,
}

impl IssueTrackerSource {
    /// Creates a source for the tracker at `base_url`
    ///
    /// # Arguments
    ///
    /// * `base_url` - Tracker root, e.g. `https://issues.apache.org/jira`
    /// * `page_size` - Issues on a full listing page
    /// * `fetcher` - HTTP fetcher shared by listing and detail requests
    ///
    /// # Returns
    ///
    /// * `Ok(IssueTrackerSource)` - The base URL has a host
    /// * `Err(SourceError::InvalidUrl)` - It does not parse or has no host
    pub fn new(base_url: &str, page_size: usize, fetcher: HttpFetcher) -> SourceResult<Self> {
        let base_url = base_url.trim_end_matches('/').to_string();
        let host = host_key(&base_url)?;
        Ok(Self {
            base_url,
            host,
            page_size,
            fetcher,
        })
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    /// Issue navigator page for `project` starting at offset `cursor`
    pub fn listing_url(&self, project: &str, cursor: u64) -> String {
        format!(
            "{}/issues/?jql=project%3D{}&startIndex={}",
            self.base_url, project, cursor
        )
    }

    pub fn issue_url(&self, key: &str) -> String {
        format!("{}/browse/{}", self.base_url, key)
    }
}

#[async_trait]
impl Discovery for IssueTrackerSource {
    async fn list(&self, partition: &str, cursor: u64) -> SourceResult<Vec<String>> {
        let url = self.listing_url(partition, cursor);
        let html = self.fetcher.fetch(&url).await?;
        let keys = extract_issue_keys(&html);
        tracing::debug!(partition = %partition, "Found {} issue keys at {}", keys.len(), url);
        Ok(keys)
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn rate_limit_key(&self, _partition: &str) -> String {
        self.host.clone()
    }
}

#[async_trait]
impl ItemProcessor for IssueTrackerSource {
    async fn process(&self, partition: &str, item_key: &str) -> SourceResult<TransformedRecord> {
        let url = self.issue_url(item_key);
        let html = self.fetcher.fetch(&url).await?;
        let issue = parse_issue(&html, item_key).ok_or_else(|| SourceError::Parse {
            url: url.clone(),
            message: "no summary found".to_string(),
        })?;
        Ok(to_record(partition, &issue))
    }

    fn rate_limit_key(&self, _partition: &str) -> String {
        self.host.clone()
    }
}
