//! JSONL record writer
//!
//! Each partition gets its own file, `<partition-lowercase>_<yyyymmdd_HHMMSS>.jsonl`,
//! opened lazily on the first record and appended to. Every task of a record
//! becomes one line, and the file is flushed after each record.

use crate::output::traits::{OutputError, OutputResult, RecordWriter, TransformedRecord};
use chrono::Utc;
use std::collections::HashMap;
use std::fs::{self, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};

/// File extension of output files
pub const JSONL_EXTENSION: &str = "jsonl";

struct OpenFiles {
    files: HashMap<String, BufWriter<File>>,
    closed: bool,
}

/// Appends records as JSON lines, one file per partition
pub struct JsonlWriter {
    dir: PathBuf,
    inner: Mutex<OpenFiles>,
}

impl JsonlWriter {
    /// Creates a writer rooted at `dir`, creating the directory if needed
    ///
    /// # Arguments
    ///
    /// * `dir` - Output directory
    ///
    /// # Returns
    ///
    /// * `Ok(JsonlWriter)` - The directory exists
    /// * `Err(OutputError)` - The directory could not be created
    pub fn new(dir: impl Into<PathBuf>) -> OutputResult<Self> {
        let dir = dir.into();
        if !dir.exists() {
            fs::create_dir_all(&dir)?;
            tracing::info!("Created output directory: {}", dir.display());
        }

        Ok(Self {
            dir,
            inner: Mutex::new(OpenFiles {
                files: HashMap::new(),
                closed: false,
            }),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Path a new output file for `partition` would get right now
    pub fn output_path(&self, partition: &str) -> PathBuf {
        let timestamp = Utc::now().format("%Y%m%d_%H%M%S");
        self.dir.join(format!(
            "{}_{}.{}",
            partition.to_lowercase(),
            timestamp,
            JSONL_EXTENSION
        ))
    }

    fn lock(&self) -> MutexGuard<'_, OpenFiles> {
        self.inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }
}

impl RecordWriter for JsonlWriter {
    fn write(&self, partition: &str, record: &TransformedRecord) -> OutputResult<()> {
        // Serialize before taking the lock
        let mut lines = Vec::new();
        for task in &record.tasks {
            serde_json::to_writer(&mut lines, task)?;
            lines.push(b'\n');
        }

        let mut inner = self.lock();
        if inner.closed {
            return Err(OutputError::Closed);
        }

        if !inner.files.contains_key(partition) {
            let path = self.output_path(partition);
            let file = OpenOptions::new().create(true).append(true).open(&path)?;
            tracing::info!("Writing {} records to {}", partition, path.display());
            inner
                .files
                .insert(partition.to_string(), BufWriter::new(file));
        }

        if let Some(file) = inner.files.get_mut(partition) {
            file.write_all(&lines)?;
            file.flush()?;
        }

        tracing::debug!(
            partition,
            item = %record.item_key,
            "Wrote {} tasks",
            record.tasks.len()
        );
        Ok(())
    }

    fn flush(&self) -> OutputResult<()> {
        let mut inner = self.lock();
        for (partition, file) in inner.files.iter_mut() {
            if let Err(e) = file.flush() {
                tracing::warn!("Error flushing output for {}: {}", partition, e);
                return Err(e.into());
            }
        }
        Ok(())
    }

    fn close(&self) -> OutputResult<()> {
        let mut inner = self.lock();
        if inner.closed {
            return Ok(());
        }
        inner.closed = true;

        let mut first_error = None;
        for (partition, mut file) in inner.files.drain() {
            if let Err(e) = file.flush() {
                tracing::warn!("Error closing output for {}: {}", partition, e);
                first_error.get_or_insert(e);
            }
        }

        tracing::info!("Closed all output writers");
        match first_error {
            Some(e) => Err(e.into()),
            None => Ok(()),
        }
    }
}
