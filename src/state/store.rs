//! Concurrency-safe, resumable progress store
//!
//! Every partition is loaded lazily on first access and then guarded by its own
//! reader/writer lock. Membership checks and cursor reads take the read side;
//! commits, cursor advances and resets take the write side and persist through
//! the [`StateBackend`] before releasing it. A commit to one partition never
//! waits on another.

use crate::state::PartitionState;
use crate::storage::{
    validate_item_key, validate_partition_key, StateBackend, StorageError, StorageResult,
    StoredPartition,
};
use std::collections::{HashMap, HashSet};
use std::sync::{Arc, Mutex, MutexGuard};
use tokio::sync::{OnceCell, RwLock};

/// In-memory half of a partition: the record and its processed-set
#[derive(Debug)]
struct Partition {
    state: PartitionState,
    processed: HashSet<String>,
}

impl Partition {
    fn fresh(partition: &str) -> Self {
        Self {
            state: PartitionState::new(partition),
            processed: HashSet::new(),
        }
    }
}

impl From<StoredPartition> for Partition {
    fn from(stored: StoredPartition) -> Self {
        Self {
            state: stored.state,
            processed: stored.processed,
        }
    }
}

type PartitionCell = Arc<OnceCell<RwLock<Partition>>>;

/// Per-partition processed-sets and resume cursors
pub struct StateStore {
    backend: Arc<dyn StateBackend>,
    partitions: Mutex<HashMap<String, PartitionCell>>,
}

impl StateStore {
    pub fn new(backend: Arc<dyn StateBackend>) -> Self {
        Self {
            backend,
            partitions: Mutex::new(HashMap::new()),
        }
    }

    pub fn backend(&self) -> &Arc<dyn StateBackend> {
        &self.backend
    }

    /// Returns true if `item_key` has been committed for `partition`
    pub async fn is_processed(&self, partition: &str, item_key: &str) -> StorageResult<bool> {
        validate_item_key(item_key)?;
        let cell = self.cell(partition)?;
        let lock = self.loaded(&cell, partition).await?;
        let guard = lock.read().await;
        Ok(guard.processed.contains(item_key))
    }

    /// Marks `item_key` as processed, exactly once
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - This call added the key and the change is durable
    /// * `Ok(false)` - The key was already committed; nothing changed
    /// * `Err(StorageError)` - Persisting failed; in-memory state is unchanged
    ///   and the commit may be retried
    /// * `Err(StorageError::InvalidItemKey)` - The key is empty, has surrounding
    ///   whitespace or contains a line break
    pub async fn try_commit(&self, partition: &str, item_key: &str) -> StorageResult<bool> {
        validate_item_key(item_key)?;
        let cell = self.cell(partition)?;
        let lock = self.loaded(&cell, partition).await?;
        let mut guard = lock.write().await;

        if guard.processed.contains(item_key) {
            tracing::debug!(partition, item = item_key, "Already committed");
            return Ok(false);
        }

        let previous = guard.state.clone();
        guard.processed.insert(item_key.to_string());
        guard.state.record_commit(item_key);

        if let Err(e) = self
            .backend
            .persist_commit(&guard.state, &guard.processed, item_key)
        {
            guard.processed.remove(item_key);
            guard.state = previous;
            tracing::error!(partition, item = item_key, "Failed to persist commit: {}", e);
            return Err(e);
        }

        Ok(true)
    }

    /// Current resume cursor for `partition` (0 when fresh)
    pub async fn get_cursor(&self, partition: &str) -> StorageResult<u64> {
        let cell = self.cell(partition)?;
        let lock = self.loaded(&cell, partition).await?;
        let cursor = lock.read().await.state.cursor;
        Ok(cursor)
    }

    /// Moves the cursor forward to `cursor`
    ///
    /// A value not greater than the stored cursor is a no-op, so a stale caller
    /// can never move progress backwards.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - The cursor moved and was persisted
    /// * `Ok(false)` - `cursor` was not ahead of the stored value
    /// * `Err(StorageError)` - Persisting failed; the cursor is unchanged
    pub async fn advance_cursor(&self, partition: &str, cursor: u64) -> StorageResult<bool> {
        let cell = self.cell(partition)?;
        let lock = self.loaded(&cell, partition).await?;
        let mut guard = lock.write().await;

        let previous = guard.state.clone();
        if !guard.state.advance(cursor) {
            return Ok(false);
        }

        if let Err(e) = self.backend.persist_cursor(&guard.state) {
            guard.state = previous;
            tracing::error!(partition, "Failed to persist cursor {}: {}", cursor, e);
            return Err(e);
        }

        tracing::debug!(partition, "Cursor advanced to {}", cursor);
        Ok(true)
    }

    /// Clears the cursor, counters and processed-set of `partition`, in memory and on disk
    ///
    /// Runs under the partition's write lock, so no reader sees a half-cleared
    /// partition. If clearing the persisted state fails, memory is left as it was.
    pub async fn reset(&self, partition: &str) -> StorageResult<()> {
        let cell = self.cell(partition)?;
        let lock = self.loaded(&cell, partition).await?;
        let mut guard = lock.write().await;

        self.backend.clear(partition)?;
        let cleared = guard.processed.len();
        *guard = Partition::fresh(partition);

        tracing::info!(partition, "Reset partition state ({} processed keys cleared)", cleared);
        Ok(())
    }

    /// Snapshot of the partition record
    pub async fn state(&self, partition: &str) -> StorageResult<PartitionState> {
        let cell = self.cell(partition)?;
        let lock = self.loaded(&cell, partition).await?;
        let state = lock.read().await.state.clone();
        Ok(state)
    }

    /// Number of committed items in `partition`
    pub async fn processed_count(&self, partition: &str) -> StorageResult<u64> {
        Ok(self.state(partition).await?.processed_count)
    }

    /// Records of every partition that is persisted or loaded, sorted by key
    pub async fn summaries(&self) -> StorageResult<Vec<PartitionState>> {
        let mut names = self.backend.list_partitions()?;
        names.extend(self.lock_partitions().keys().cloned());
        names.sort();
        names.dedup();

        let mut summaries = Vec::with_capacity(names.len());
        for name in names {
            summaries.push(self.state(&name).await?);
        }
        Ok(summaries)
    }

    fn cell(&self, partition: &str) -> StorageResult<PartitionCell> {
        validate_partition_key(partition)?;
        let mut partitions = self.lock_partitions();
        let cell = partitions.entry(partition.to_string()).or_default();
        Ok(Arc::clone(cell))
    }

    async fn loaded<'a>(
        &self,
        cell: &'a PartitionCell,
        partition: &str,
    ) -> StorageResult<&'a RwLock<Partition>> {
        cell.get_or_try_init(|| async {
            let partition_data = match self.backend.load(partition)? {
                Some(stored) => {
                    tracing::info!(
                        partition,
                        "Loaded state: cursor {}, {} processed",
                        stored.state.cursor,
                        stored.state.processed_count
                    );
                    Partition::from(stored)
                }
                None => {
                    tracing::debug!(partition, "No saved state, starting fresh");
                    Partition::fresh(partition)
                }
            };
            Ok::<_, StorageError>(RwLock::new(partition_data))
        })
        .await
    }

    fn lock_partitions(&self) -> MutexGuard<'_, HashMap<String, PartitionCell>> {
        self.partitions
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}
