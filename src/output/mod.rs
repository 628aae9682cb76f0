//! Output module for writing crawl results
//!
//! This module handles:
//! - The `RecordWriter` interface workers write through
//! - Shaping scraped issues into training tasks
//! - Appending records to per-partition JSONL files
//! - Reporting saved progress and output file statistics

mod jsonl;
pub mod status;
pub mod transform;
mod traits;

pub use jsonl::{JsonlWriter, JSONL_EXTENSION};
pub use status::{output_file_stats, print_status, OutputFileStats};
pub use transform::to_record;
pub use traits::{OutputError, OutputResult, RecordWriter, TransformedRecord};
