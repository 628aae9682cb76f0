//! Storage module for persisting crawl progress
//!
//! This module handles durable state for every partition:
//! - The `StateBackend` trait that `StateStore` persists through
//! - `FileBackend`: a TOML record plus a newline-delimited key list per partition
//! - `SqliteBackend`: the same data in a single SQLite database

mod files;
mod schema;
mod sqlite;
mod traits;

pub use files::FileBackend;
pub use sqlite::{SqliteBackend, DATABASE_FILE};
pub use traits::{
    validate_item_key, validate_partition_key, StateBackend, StorageError, StorageResult,
    StoredPartition,
};

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;

/// Which persistence backend to use
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackendKind {
    #[default]
    Files,
    Sqlite,
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Files => write!(f, "files"),
            Self::Sqlite => write!(f, "sqlite"),
        }
    }
}

/// Opens the configured backend in `dir`
///
/// # Arguments
///
/// * `kind` - Backend type
/// * `dir` - State directory, created if missing
///
/// # Returns
///
/// * `Ok(Arc<dyn StateBackend>)` - Backend ready for use
/// * `Err(StorageError)` - The directory or database could not be created
pub fn open_backend(kind: BackendKind, dir: &Path) -> StorageResult<Arc<dyn StateBackend>> {
    let backend: Arc<dyn StateBackend> = match kind {
        BackendKind::Files => Arc::new(FileBackend::new(dir)?),
        BackendKind::Sqlite => Arc::new(SqliteBackend::new(&dir.join(DATABASE_FILE))?),
    };
    tracing::info!("Opened {} state backend in {}", kind, dir.display());
    Ok(backend)
}
