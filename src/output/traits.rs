//! Output writer trait and record type
//!
//! This module defines the trait interface for record writers and the record
//! type handed from item processors to writers.

use serde::Serialize;
use serde_json::Value;
use thiserror::Error;

/// Errors that can occur during output operations
#[derive(Debug, Error)]
pub enum OutputError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to serialize record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("Writer is closed")]
    Closed,
}

/// Result type for output operations
pub type OutputResult<T> = Result<T, OutputError>;

/// One fetched item, shaped into output tasks
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TransformedRecord {
    /// Partition the item belongs to
    pub partition: String,

    /// Key of the source item
    pub item_key: String,

    /// Task objects, each written as one output line
    pub tasks: Vec<Value>,
}

impl TransformedRecord {
    pub fn new(partition: impl Into<String>, item_key: impl Into<String>, tasks: Vec<Value>) -> Self {
        Self {
            partition: partition.into(),
            item_key: item_key.into(),
            tasks,
        }
    }
}

/// Trait for record writers
///
/// Writers are shared by every worker, so implementations must be thread-safe.
/// Writing the same logical item twice is allowed; output is append-only.
pub trait RecordWriter: Send + Sync {
    /// Appends a record to the output for `partition`
    ///
    /// # Arguments
    ///
    /// * `partition` - The partition the record belongs to
    /// * `record` - The record to write
    fn write(&self, partition: &str, record: &TransformedRecord) -> OutputResult<()>;

    /// Flushes any buffered output
    fn flush(&self) -> OutputResult<()>;

    /// Flushes and releases all resources; later writes fail with [`OutputError::Closed`]
    ///
    /// Calling close more than once is a no-op.
    fn close(&self) -> OutputResult<()>;
}
