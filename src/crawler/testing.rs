//! In-memory collaborators for crawler tests

use crate::crawler::traits::{Discovery, ItemProcessor};
use crate::output::{OutputError, OutputResult, RecordWriter, TransformedRecord};
use crate::{SourceError, SourceResult};
use async_trait::async_trait;
use std::collections::{HashMap, HashSet, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Mutex;
use std::time::Duration;

pub const TEST_HOST: &str = "test.example.com";

pub fn transient() -> SourceError {
    SourceError::Transient {
        url: format!("https://{}", TEST_HOST),
        message: "503 Service Unavailable".to_string(),
    }
}

/// Returns scripted pages per partition in order, then empty pages
pub struct ScriptedDiscovery {
    pages: Mutex<HashMap<String, VecDeque<SourceResult<Vec<String>>>>>,
    cursors: Mutex<Vec<(String, u64)>>,
    page_size: usize,
}

impl ScriptedDiscovery {
    pub fn new(page_size: usize) -> Self {
        Self {
            pages: Mutex::new(HashMap::new()),
            cursors: Mutex::new(Vec::new()),
            page_size,
        }
    }

    /// Discovery for the single partition `P`
    pub fn single(page_size: usize, pages: Vec<SourceResult<Vec<&str>>>) -> Self {
        Self::new(page_size).with_pages("P", pages)
    }

    pub fn with_pages(self, partition: &str, pages: Vec<SourceResult<Vec<&str>>>) -> Self {
        let pages = pages
            .into_iter()
            .map(|page| page.map(|keys| keys.into_iter().map(String::from).collect()))
            .collect();
        self.pages
            .lock()
            .unwrap()
            .insert(partition.to_string(), pages);
        self
    }

    /// Cursors `partition` was listed at, in call order
    pub fn cursors(&self, partition: &str) -> Vec<u64> {
        self.cursors
            .lock()
            .unwrap()
            .iter()
            .filter(|(p, _)| p == partition)
            .map(|(_, c)| *c)
            .collect()
    }
}

#[async_trait]
impl Discovery for ScriptedDiscovery {
    async fn list(&self, partition: &str, cursor: u64) -> SourceResult<Vec<String>> {
        self.cursors
            .lock()
            .unwrap()
            .push((partition.to_string(), cursor));
        self.pages
            .lock()
            .unwrap()
            .get_mut(partition)
            .and_then(|pages| pages.pop_front())
            .unwrap_or(Ok(Vec::new()))
    }

    fn page_size(&self) -> usize {
        self.page_size
    }

    fn rate_limit_key(&self, _partition: &str) -> String {
        TEST_HOST.to_string()
    }
}

/// Succeeds for every key except those listed as failing
pub struct FakeProcessor {
    failing: HashSet<String>,
    delay: Duration,
    calls: Mutex<Vec<String>>,
}

impl FakeProcessor {
    pub fn new(failing: &[&str]) -> Self {
        Self {
            failing: failing.iter().map(|s| s.to_string()).collect(),
            delay: Duration::ZERO,
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Makes every call take `delay`
    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = delay;
        self
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl ItemProcessor for FakeProcessor {
    async fn process(&self, partition: &str, item_key: &str) -> SourceResult<TransformedRecord> {
        self.calls.lock().unwrap().push(item_key.to_string());
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        if self.failing.contains(item_key) {
            return Err(SourceError::Parse {
                url: format!("https://{}/browse/{}", TEST_HOST, item_key),
                message: "no summary".to_string(),
            });
        }
        Ok(TransformedRecord::new(
            partition,
            item_key,
            vec![serde_json::json!({ "key": item_key })],
        ))
    }

    fn rate_limit_key(&self, _partition: &str) -> String {
        TEST_HOST.to_string()
    }
}

/// Collects written item keys
#[derive(Default)]
pub struct MemoryWriter {
    pub records: Mutex<Vec<String>>,
    pub fail: bool,
    pub closes: AtomicUsize,
}

impl MemoryWriter {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn records(&self) -> Vec<String> {
        self.records.lock().unwrap().clone()
    }

    pub fn close_count(&self) -> usize {
        self.closes.load(Ordering::SeqCst)
    }
}

impl RecordWriter for MemoryWriter {
    fn write(&self, _partition: &str, record: &TransformedRecord) -> OutputResult<()> {
        if self.fail {
            return Err(OutputError::Closed);
        }
        self.records.lock().unwrap().push(record.item_key.clone());
        Ok(())
    }

    fn flush(&self) -> OutputResult<()> {
        Ok(())
    }

    fn close(&self) -> OutputResult<()> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}
