//! SQLite state backend
//!
//! This module provides a SQLite-based implementation of the StateBackend trait.
//! A commit inserts the item key and upserts the partition record in one
//! transaction.

use crate::state::PartitionState;
use crate::storage::schema::initialize_schema;
use crate::storage::traits::{
    validate_partition_key, StateBackend, StorageError, StorageResult, StoredPartition,
};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use std::collections::HashSet;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};

/// File name of the database inside the state directory
pub const DATABASE_FILE: &str = "state.db";

/// SQLite state backend
pub struct SqliteBackend {
    conn: Mutex<Connection>,
}

impl SqliteBackend {
    /// Opens or creates the state database
    ///
    /// # Arguments
    ///
    /// * `path` - Path to the SQLite database file
    ///
    /// # Returns
    ///
    /// * `Ok(SqliteBackend)` - Successfully opened/created database
    /// * `Err(StorageError)` - Failed to open database
    pub fn new(path: &Path) -> StorageResult<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let conn = Connection::open(path)?;

        // Configure SQLite for better performance
        conn.execute_batch(
            "
            PRAGMA journal_mode = WAL;
            PRAGMA synchronous = NORMAL;
            PRAGMA temp_store = MEMORY;
        ",
        )?;

        initialize_schema(&conn)?;
        tracing::debug!("Opened state database {}", path.display());

        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Creates an in-memory database (for testing)
    #[cfg(test)]
    pub fn new_in_memory() -> StorageResult<Self> {
        let conn = Connection::open_in_memory()?;
        initialize_schema(&conn)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

fn upsert_state(conn: &Connection, state: &PartitionState) -> rusqlite::Result<()> {
    conn.execute(
        "INSERT INTO partition_state
             (partition, cursor, last_item_key, processed_count, last_update_time)
         VALUES (?1, ?2, ?3, ?4, ?5)
         ON CONFLICT(partition) DO UPDATE SET
             cursor = excluded.cursor,
             last_item_key = excluded.last_item_key,
             processed_count = excluded.processed_count,
             last_update_time = excluded.last_update_time",
        params![
            state.partition,
            to_sql_int(state.cursor),
            state.last_item_key,
            to_sql_int(state.processed_count),
            state.last_update_time.to_rfc3339(),
        ],
    )?;
    Ok(())
}

fn to_sql_int(value: u64) -> i64 {
    i64::try_from(value).unwrap_or(i64::MAX)
}

fn parse_timestamp(value: &str) -> StorageResult<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(value)
        .map(|t| t.with_timezone(&Utc))
        .map_err(|e| StorageError::Deserialize(format!("invalid timestamp {:?}: {}", value, e)))
}

impl StateBackend for SqliteBackend {
    fn name(&self) -> &'static str {
        "sqlite"
    }

    fn load(&self, partition: &str) -> StorageResult<Option<StoredPartition>> {
        validate_partition_key(partition)?;
        let conn = self.conn();

        let row = conn
            .query_row(
                "SELECT cursor, last_item_key, processed_count, last_update_time
                 FROM partition_state WHERE partition = ?1",
                params![partition],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, i64>(2)?,
                        row.get::<_, String>(3)?,
                    ))
                },
            )
            .optional()?;

        let mut stmt = conn.prepare("SELECT item_key FROM processed_items WHERE partition = ?1")?;
        let processed = stmt
            .query_map(params![partition], |row| row.get::<_, String>(0))?
            .collect::<Result<HashSet<_>, _>>()?;

        let state = match row {
            Some((cursor, last_item_key, processed_count, updated)) => {
                if cursor < 0 || processed_count < 0 {
                    return Err(StorageError::Corrupt {
                        partition: partition.to_string(),
                        message: "negative cursor or count".to_string(),
                    });
                }
                PartitionState {
                    partition: partition.to_string(),
                    cursor: cursor as u64,
                    last_item_key,
                    processed_count: processed_count as u64,
                    last_update_time: parse_timestamp(&updated)?,
                }
            }
            None if processed.is_empty() => return Ok(None),
            None => PartitionState::new(partition),
        };

        let mut stored = StoredPartition { state, processed };
        stored.reconcile();
        Ok(Some(stored))
    }

    fn persist_commit(
        &self,
        state: &PartitionState,
        _processed: &HashSet<String>,
        item_key: &str,
    ) -> StorageResult<()> {
        validate_partition_key(&state.partition)?;
        let mut conn = self.conn();
        let tx = conn.transaction()?;

        tx.execute(
            "INSERT OR IGNORE INTO processed_items (partition, item_key, processed_at)
             VALUES (?1, ?2, ?3)",
            params![state.partition, item_key, state.last_update_time.to_rfc3339()],
        )?;
        upsert_state(&tx, state)?;

        tx.commit()?;
        Ok(())
    }

    fn persist_cursor(&self, state: &PartitionState) -> StorageResult<()> {
        validate_partition_key(&state.partition)?;
        upsert_state(&self.conn(), state)?;
        Ok(())
    }

    fn clear(&self, partition: &str) -> StorageResult<()> {
        validate_partition_key(partition)?;
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        tx.execute(
            "DELETE FROM processed_items WHERE partition = ?1",
            params![partition],
        )?;
        tx.execute(
            "DELETE FROM partition_state WHERE partition = ?1",
            params![partition],
        )?;
        tx.commit()?;
        Ok(())
    }

    fn list_partitions(&self) -> StorageResult<Vec<String>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT partition FROM partition_state
             UNION
             SELECT DISTINCT partition FROM processed_items
             ORDER BY partition",
        )?;
        let partitions = stmt
            .query_map([], |row| row.get::<_, String>(0))?
            .collect::<Result<Vec<_>, _>>()?;
        Ok(partitions)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn keys(items: &[&str]) -> HashSet<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_missing_partition_loads_as_none() {
        let backend = SqliteBackend::new_in_memory().unwrap();
        assert!(backend.load("SPARK").unwrap().is_none());
    }

    #[test]
    fn test_commit_roundtrip() {
        let backend = SqliteBackend::new_in_memory().unwrap();

        let mut state = PartitionState::new("SPARK");
        state.advance(50);
        state.record_commit("SPARK-1");
        backend
            .persist_commit(&state, &keys(&["SPARK-1"]), "SPARK-1")
            .unwrap();
        state.record_commit("SPARK-2");
        backend
            .persist_commit(&state, &keys(&["SPARK-1", "SPARK-2"]), "SPARK-2")
            .unwrap();

        let loaded = backend.load("SPARK").unwrap().unwrap();
        assert_eq!(loaded.state.cursor, 50);
        assert_eq!(loaded.state.processed_count, 2);
        assert_eq!(loaded.state.last_item_key, "SPARK-2");
        assert_eq!(loaded.processed, keys(&["SPARK-1", "SPARK-2"]));
    }

    #[test]
    fn test_persist_cursor_and_clear() {
        let backend = SqliteBackend::new_in_memory().unwrap();
        let mut state = PartitionState::new("HADOOP");
        state.advance(100);
        backend.persist_cursor(&state).unwrap();
        assert_eq!(backend.load("HADOOP").unwrap().unwrap().state.cursor, 100);

        backend.clear("HADOOP").unwrap();
        assert!(backend.load("HADOOP").unwrap().is_none());
    }

    #[test]
    fn test_list_partitions() {
        let backend = SqliteBackend::new_in_memory().unwrap();
        backend.persist_cursor(&PartitionState::new("SPARK")).unwrap();
        backend.persist_cursor(&PartitionState::new("HADOOP")).unwrap();
        assert_eq!(backend.list_partitions().unwrap(), vec!["HADOOP", "SPARK"]);
    }

    #[test]
    fn test_state_survives_reopen() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("crawl_state").join(DATABASE_FILE);

        {
            let backend = SqliteBackend::new(&path).unwrap();
            let mut state = PartitionState::new("SPARK");
            state.record_commit("SPARK-7");
            backend
                .persist_commit(&state, &keys(&["SPARK-7"]), "SPARK-7")
                .unwrap();
        }

        let backend = SqliteBackend::new(&path).unwrap();
        let loaded = backend.load("SPARK").unwrap().unwrap();
        assert!(loaded.processed.contains("SPARK-7"));
        assert_eq!(loaded.state.processed_count, 1);
    }
}
