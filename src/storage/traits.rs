//! Storage traits and error types
//!
//! This module defines the trait interface for state persistence backends and
//! associated error types.

use crate::state::PartitionState;
use std::collections::HashSet;
use thiserror::Error;

/// Errors that can occur during storage operations
#[derive(Debug, Error)]
pub enum StorageError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("SQLite error: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("Failed to serialize partition state: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Failed to deserialize partition state: {0}")]
    Deserialize(String),

    #[error("Invalid partition key: {0:?}")]
    InvalidPartition(String),

    #[error("Invalid item key: {0:?}")]
    InvalidItemKey(String),

    #[error("Corrupt state for partition {partition}: {message}")]
    Corrupt { partition: String, message: String },
}

/// Result type for storage operations
pub type StorageResult<T> = Result<T, StorageError>;

/// Everything persisted for one partition
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StoredPartition {
    pub state: PartitionState,
    pub processed: HashSet<String>,
}

impl StoredPartition {
    /// Makes `processed_count` agree with the processed-set
    ///
    /// Returns true if the stored count had to be corrected.
    pub fn reconcile(&mut self) -> bool {
        let actual = self.processed.len() as u64;
        if self.state.processed_count == actual {
            return false;
        }
        tracing::warn!(
            partition = %self.state.partition,
            "Stored processed count {} disagrees with {} processed keys, using the latter",
            self.state.processed_count,
            actual
        );
        self.state.processed_count = actual;
        true
    }
}

/// Trait for state persistence backends
///
/// A backend stores, per partition, the [`PartitionState`] record and the set of
/// processed item keys. Callers serialize writes per partition, so an
/// implementation only has to make each individual write all-or-nothing.
pub trait StateBackend: Send + Sync {
    /// Short name used in log messages
    fn name(&self) -> &'static str;

    /// Loads a partition
    ///
    /// # Returns
    ///
    /// * `Ok(Some(stored))` - The partition has persisted state
    /// * `Ok(None)` - The partition has never been crawled (or was reset)
    /// * `Err(StorageError)` - The state exists but could not be read
    fn load(&self, partition: &str) -> StorageResult<Option<StoredPartition>>;

    /// Persists a commit: the updated record together with the processed-set
    ///
    /// # Arguments
    ///
    /// * `state` - The record after the commit was applied
    /// * `processed` - The full processed-set, already containing `item_key`
    /// * `item_key` - The key that was just committed
    fn persist_commit(
        &self,
        state: &PartitionState,
        processed: &HashSet<String>,
        item_key: &str,
    ) -> StorageResult<()>;

    /// Persists the record alone, after a cursor change
    fn persist_cursor(&self, state: &PartitionState) -> StorageResult<()>;

    /// Removes everything stored for a partition
    fn clear(&self, partition: &str) -> StorageResult<()>;

    /// Lists every partition with persisted state, sorted
    fn list_partitions(&self) -> StorageResult<Vec<String>>;
}

/// Checks that a partition key is safe to use in file names and queries
///
/// Keys must be non-empty and consist of ASCII letters, digits, `-` and `_`.
pub fn validate_partition_key(partition: &str) -> StorageResult<()> {
    let valid = !partition.is_empty()
        && partition
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_');

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidPartition(partition.to_string()))
    }
}

/// Checks that an item key survives a round trip through the processed list
///
/// The list holds one key per line, so keys must be non-empty, contain no
/// control characters, and have no leading or trailing whitespace.
pub fn validate_item_key(item_key: &str) -> StorageResult<()> {
    let valid = !item_key.is_empty()
        && item_key.trim() == item_key
        && !item_key.chars().any(char::is_control);

    if valid {
        Ok(())
    } else {
        Err(StorageError::InvalidItemKey(item_key.to_string()))
    }
}
