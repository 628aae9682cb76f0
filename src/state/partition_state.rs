/// Durable progress record for one partition
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Resume position and commit counters for a partition
///
/// Paired 1:1 with the partition's processed-set; `processed_count` equals the
/// size of that set whenever the pair is persisted.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct PartitionState {
    pub partition: String,

    /// Listing offset the producer resumes from
    pub cursor: u64,

    /// Item key of the most recent commit, empty if none
    #[serde(default)]
    pub last_item_key: String,

    pub processed_count: u64,

    pub last_update_time: DateTime<Utc>,
}

impl PartitionState {
    /// Creates the record for a never-crawled partition
    pub fn new(partition: impl Into<String>) -> Self {
        Self {
            partition: partition.into(),
            cursor: 0,
            last_item_key: String::new(),
            processed_count: 0,
            last_update_time: Utc::now(),
        }
    }

    /// Returns true if nothing has been committed and the cursor never moved
    pub fn is_fresh(&self) -> bool {
        self.cursor == 0 && self.processed_count == 0
    }

    /// Applies a commit of `item_key`
    pub fn record_commit(&mut self, item_key: &str) {
        self.processed_count += 1;
        self.last_item_key = item_key.to_string();
        self.last_update_time = Utc::now();
    }

    /// Moves the cursor to `cursor` if that is further ahead
    ///
    /// Returns true if the cursor changed.
    pub fn advance(&mut self, cursor: u64) -> bool {
        if cursor <= self.cursor {
            return false;
        }
        self.cursor = cursor;
        self.last_update_time = Utc::now();
        true
    }
}

impl fmt::Display for PartitionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "{}: {} processed, cursor {}, last item {}, updated {}",
            self.partition,
            self.processed_count,
            self.cursor,
            if self.last_item_key.is_empty() {
                "-"
            } else {
                &self.last_item_key
            },
            self.last_update_time.format("%Y-%m-%d %H:%M:%S UTC")
        )
    }
}
