//! State module for tracking crawl progress
//!
//! This module provides the resumable, per-partition progress record.
//!
//! # Components
//!
//! - `PartitionState`: cursor, commit counters and timestamps for one partition
//! - `StateStore`: lazily loaded partitions behind per-partition reader/writer
//!   locks, with idempotent commits and a monotonic cursor

mod partition_state;
mod store;

// Re-export main types
pub use partition_state::PartitionState;
pub use store::StateStore;
