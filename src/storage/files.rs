//! File-based state backend
//!
//! Each partition is stored as a pair of files in the state directory:
//!
//! - `<partition>_state.toml`: the [`PartitionState`] record
//! - `<partition>_processed.txt`: processed item keys, one per line, sorted
//!
//! Both are written to a temporary sibling and renamed into place, list first.

use crate::state::PartitionState;
use crate::storage::traits::{
    validate_item_key, validate_partition_key, StateBackend, StorageError, StorageResult,
    StoredPartition,
};
use std::collections::HashSet;
use std::fs;
use std::io::{self, Write};
use std::path::{Path, PathBuf};

const STATE_SUFFIX: &str = "_state.toml";
const PROCESSED_SUFFIX: &str = "_processed.txt";

/// Stores partition state as TOML records and newline-delimited key lists
#[derive(Debug, Clone)]
pub struct FileBackend {
    dir: PathBuf,
}

impl FileBackend {
    /// Opens (creating if necessary) a state directory
    ///
    /// # Arguments
    ///
    /// * `dir` - Directory holding the per-partition files
    ///
    /// # Returns
    ///
    /// * `Ok(FileBackend)` - The directory exists and is usable
    /// * `Err(StorageError)` - The directory could not be created
    pub fn new(dir: impl Into<PathBuf>) -> StorageResult<Self> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        tracing::debug!("Using state directory {}", dir.display());
        Ok(Self { dir })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    fn state_path(&self, partition: &str) -> PathBuf {
        self.dir.join(format!("{}{}", partition, STATE_SUFFIX))
    }

    fn processed_path(&self, partition: &str) -> PathBuf {
        self.dir.join(format!("{}{}", partition, PROCESSED_SUFFIX))
    }

    fn write_state(&self, state: &PartitionState) -> StorageResult<()> {
        let text = toml::to_string(state)?;
        write_atomically(&self.state_path(&state.partition), text.as_bytes())?;
        Ok(())
    }

    fn write_processed(&self, partition: &str, processed: &HashSet<String>) -> StorageResult<()> {
        let mut keys: Vec<&str> = processed.iter().map(String::as_str).collect();
        keys.sort_unstable();

        let mut text = String::with_capacity(keys.iter().map(|k| k.len() + 1).sum());
        for key in keys {
            text.push_str(key);
            text.push('\n');
        }

        write_atomically(&self.processed_path(partition), text.as_bytes())?;
        Ok(())
    }
}

impl StateBackend for FileBackend {
    fn name(&self) -> &'static str {
        "files"
    }

    fn load(&self, partition: &str) -> StorageResult<Option<StoredPartition>> {
        validate_partition_key(partition)?;

        let state_text = read_optional(&self.state_path(partition))?;
        let processed_text = read_optional(&self.processed_path(partition))?;

        if state_text.is_none() && processed_text.is_none() {
            return Ok(None);
        }

        let processed: HashSet<String> = processed_text
            .as_deref()
            .unwrap_or_default()
            .lines()
            .map(str::trim)
            .filter(|line| !line.is_empty())
            .map(String::from)
            .collect();

        let state = match state_text {
            Some(text) => {
                let state: PartitionState =
                    toml::from_str(&text).map_err(|e| StorageError::Corrupt {
                        partition: partition.to_string(),
                        message: e.to_string(),
                    })?;
                if state.partition != partition {
                    return Err(StorageError::Corrupt {
                        partition: partition.to_string(),
                        message: format!("record belongs to partition {:?}", state.partition),
                    });
                }
                state
            }
            // The list is renamed into place first, so a crash can leave it without a record.
            None => {
                tracing::warn!(
                    partition,
                    "Processed list found without a state record, starting from cursor 0"
                );
                PartitionState::new(partition)
            }
        };

        let mut stored = StoredPartition { state, processed };
        stored.reconcile();
        Ok(Some(stored))
    }

    fn persist_commit(
        &self,
        state: &PartitionState,
        processed: &HashSet<String>,
        item_key: &str,
    ) -> StorageResult<()> {
        validate_partition_key(&state.partition)?;
        validate_item_key(item_key)?;
        self.write_processed(&state.partition, processed)?;
        self.write_state(state)?;
        tracing::trace!(partition = %state.partition, item = item_key, "Persisted commit");
        Ok(())
    }

    fn persist_cursor(&self, state: &PartitionState) -> StorageResult<()> {
        validate_partition_key(&state.partition)?;
        self.write_state(state)
    }

    fn clear(&self, partition: &str) -> StorageResult<()> {
        validate_partition_key(partition)?;
        remove_if_exists(&self.state_path(partition))?;
        remove_if_exists(&self.processed_path(partition))?;
        Ok(())
    }

    fn list_partitions(&self) -> StorageResult<Vec<String>> {
        let mut partitions = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let entry = entry?;
            let name = entry.file_name();
            let Some(name) = name.to_str() else {
                continue;
            };
            let partition = name
                .strip_suffix(STATE_SUFFIX)
                .or_else(|| name.strip_suffix(PROCESSED_SUFFIX));
            if let Some(partition) = partition {
                if validate_partition_key(partition).is_ok() {
                    partitions.push(partition.to_string());
                }
            }
        }
        partitions.sort();
        partitions.dedup();
        Ok(partitions)
    }
}

/// Writes `contents` to a temporary sibling of `path`, syncs it, then renames it over `path`
fn write_atomically(path: &Path, contents: &[u8]) -> io::Result<()> {
    let file_name = path
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| io::Error::new(io::ErrorKind::InvalidInput, "path has no file name"))?;
    let tmp = path.with_file_name(format!(".{}.tmp", file_name));

    let result = (|| {
        let mut file = fs::File::create(&tmp)?;
        file.write_all(contents)?;
        file.sync_all()?;
        fs::rename(&tmp, path)
    })();

    if result.is_err() {
        let _ = fs::remove_file(&tmp);
    }
    result
}

fn read_optional(path: &Path) -> io::Result<Option<String>> {
    match fs::read_to_string(path) {
        Ok(text) => Ok(Some(text)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(e),
    }
}

fn remove_if_exists(path: &Path) -> io::Result<()> {
    match fs::remove_file(path) {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(()),
        Err(e) => Err(e),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_backend() -> (TempDir, FileBackend) {
        let dir = TempDir::new().unwrap();
        let backend = FileBackend::new(dir.path().join("crawl_state")).unwrap();
        (dir, backend)
    }

    fn keys(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_new_creates_directory() {
        let (_dir, backend) = create_test_backend();
        assert!(backend.dir().is_dir());
    }

    #[test]
    fn test_missing_partition_loads_as_none() {
        let (_dir, backend) = create_test_backend();
        assert!(backend.load("SPARK").unwrap().is_none());
    }

    #[test]
    fn test_commit_roundtrip() {
        let (_dir, backend) = create_test_backend();

        let mut state = PartitionState::new("SPARK");
        state.advance(50);
        state.record_commit("SPARK-2");
        state.record_commit("SPARK-1");
        let processed = keys(&["SPARK-2", "SPARK-1"]);

        backend.persist_commit(&state, &processed, "SPARK-1").unwrap();

        let loaded = backend.load("SPARK").unwrap().unwrap();
        assert_eq!(loaded.state, state);
        assert_eq!(loaded.processed, processed);

        let list = fs::read_to_string(backend.dir().join("SPARK_processed.txt")).unwrap();
        assert_eq!(list, "SPARK-1\nSPARK-2\n");
    }

    #[test]
    fn test_unusual_keys_roundtrip() {
        let (_dir, backend) = create_test_backend();

        let mut state = PartitionState::new("P");
        let processed = keys(&["key with spaces", "schlüssel-7", "P-1"]);
        for key in &processed {
            state.record_commit(key);
        }
        backend.persist_commit(&state, &processed, "P-1").unwrap();

        let loaded = backend.load("P").unwrap().unwrap();
        assert_eq!(loaded.processed, processed);
        assert_eq!(loaded.state.processed_count, 3);
    }

    #[test]
    fn test_key_with_line_break_not_persisted() {
        let (_dir, backend) = create_test_backend();

        let mut state = PartitionState::new("P");
        state.record_commit("a\nb");
        let processed = keys(&["a\nb"]);

        assert!(matches!(
            backend.persist_commit(&state, &processed, "a\nb"),
            Err(StorageError::InvalidItemKey(_))
        ));
        assert!(backend.load("P").unwrap().is_none());
    }

    #[test]
    fn test_persist_cursor_without_commits() {
        let (_dir, backend) = create_test_backend();

        let mut state = PartitionState::new("HADOOP");
        state.advance(100);
        backend.persist_cursor(&state).unwrap();

        let loaded = backend.load("HADOOP").unwrap().unwrap();
        assert_eq!(loaded.state.cursor, 100);
        assert!(loaded.processed.is_empty());
    }

    #[test]
    fn test_load_reconciles_count() {
        let (_dir, backend) = create_test_backend();

        let mut state = PartitionState::new("SPARK");
        state.processed_count = 10;
        backend
            .persist_commit(&state, &keys(&["SPARK-1", "SPARK-2"]), "SPARK-2")
            .unwrap();

        let loaded = backend.load("SPARK").unwrap().unwrap();
        assert_eq!(loaded.state.processed_count, 2);
    }

    #[test]
    fn test_list_without_record_loads_fresh_cursor() {
        let (_dir, backend) = create_test_backend();
        fs::write(backend.dir().join("SPARK_processed.txt"), "SPARK-1\n\nSPARK-3\n").unwrap();

        let loaded = backend.load("SPARK").unwrap().unwrap();
        assert_eq!(loaded.state.cursor, 0);
        assert_eq!(loaded.state.processed_count, 2);
        assert!(loaded.processed.contains("SPARK-3"));
    }

    #[test]
    fn test_corrupt_record_is_an_error() {
        let (_dir, backend) = create_test_backend();
        fs::write(backend.dir().join("SPARK_state.toml"), "cursor = \"nope").unwrap();

        let err = backend.load("SPARK").unwrap_err();
        assert!(matches!(err, StorageError::Corrupt { .. }));
    }

    #[test]
    fn test_clear_removes_both_files() {
        let (_dir, backend) = create_test_backend();
        let state = PartitionState::new("SPARK");
        backend
            .persist_commit(&state, &keys(&["SPARK-1"]), "SPARK-1")
            .unwrap();

        backend.clear("SPARK").unwrap();
        assert!(backend.load("SPARK").unwrap().is_none());

        // Clearing twice is fine
        backend.clear("SPARK").unwrap();
    }

    #[test]
    fn test_list_partitions() {
        let (_dir, backend) = create_test_backend();
        backend.persist_cursor(&PartitionState::new("SPARK")).unwrap();
        backend
            .persist_commit(&PartitionState::new("HADOOP"), &keys(&["HADOOP-1"]), "HADOOP-1")
            .unwrap();
        fs::write(backend.dir().join("notes.txt"), "ignored").unwrap();

        assert_eq!(backend.list_partitions().unwrap(), vec!["HADOOP", "SPARK"]);
    }

    #[test]
    fn test_invalid_partition_rejected() {
        let (_dir, backend) = create_test_backend();
        assert!(matches!(
            backend.load("../escape"),
            Err(StorageError::InvalidPartition(_))
        ));
    }

    #[test]
    fn test_no_temp_files_left_behind() {
        let (_dir, backend) = create_test_backend();
        let state = PartitionState::new("SPARK");
        backend
            .persist_commit(&state, &keys(&["SPARK-1"]), "SPARK-1")
            .unwrap();

        let leftovers: Vec<_> = fs::read_dir(backend.dir())
            .unwrap()
            .filter_map(|e| e.ok())
            .filter(|e| e.file_name().to_string_lossy().ends_with(".tmp"))
            .collect();
        assert!(leftovers.is_empty());
    }
}
