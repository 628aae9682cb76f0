//! Status reporting for persisted progress and output files

use crate::output::jsonl::JSONL_EXTENSION;
use crate::state::PartitionState;
use std::fs;
use std::io::{self, BufRead, BufReader};
use std::path::{Path, PathBuf};

/// Size of one output file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OutputFileStats {
    pub path: PathBuf,
    pub lines: u64,
    pub bytes: u64,
}

/// Collects line and byte counts for every `.jsonl` file in `dir`, sorted by name
///
/// A missing directory yields an empty list.
pub fn output_file_stats(dir: &Path) -> io::Result<Vec<OutputFileStats>> {
    let entries = match fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e),
    };

    let mut stats = Vec::new();
    for entry in entries {
        let path = entry?.path();
        if path.extension().and_then(|e| e.to_str()) != Some(JSONL_EXTENSION) {
            continue;
        }

        let bytes = fs::metadata(&path)?.len();
        let mut lines = 0;
        for line in BufReader::new(fs::File::open(&path)?).lines() {
            line?;
            lines += 1;
        }

        stats.push(OutputFileStats { path, lines, bytes });
    }

    stats.sort_by(|a, b| a.path.cmp(&b.path));
    Ok(stats)
}

/// Prints per-partition progress and output file statistics
///
/// # Arguments
///
/// * `summaries` - Records of every known partition
/// * `output_dir` - Directory holding the `.jsonl` output
pub fn print_status(summaries: &[PartitionState], output_dir: &Path) {
    println!("=== Crawl Status ===\n");

    if summaries.is_empty() {
        println!("No saved crawl state.");
    } else {
        println!("Partitions:");
        for state in summaries {
            println!("  {}", state);
        }
        let total: u64 = summaries.iter().map(|s| s.processed_count).sum();
        println!("  Total processed: {}", total);
    }
    println!();

    match output_file_stats(output_dir) {
        Ok(files) if files.is_empty() => println!("No output files found."),
        Ok(files) => {
            println!("Output Files:");
            for file in &files {
                let name = file
                    .path
                    .file_name()
                    .map(|n| n.to_string_lossy().to_string())
                    .unwrap_or_default();
                println!("  {} | Lines: {} | Size: {} bytes", name, file.lines, file.bytes);
            }
        }
        Err(e) => {
            tracing::warn!("Error reading output statistics: {}", e);
        }
    }
}
