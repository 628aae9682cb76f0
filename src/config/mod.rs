//! Configuration module for Crawl-Ledger
//!
//! This module handles loading, parsing, and validating TOML configuration files.
//!
//! # Example
//!
//! ```no_run
//! use crawl_ledger::config::load_config;
//! use std::path::Path;
//!
//! let config = load_config(Path::new("config.toml")).unwrap();
//! println!("Crawler will run {} workers", config.crawler.worker_count);
//! ```

mod parser;
mod types;
mod validation;

// Re-export types
pub use types::{
    Config, CrawlerConfig, OutputConfig, RateLimitConfig, SourceConfig, StateConfig,
};

// Re-export parser functions
pub use parser::{
    compute_config_hash, content_hash, load_config, load_config_with_hash, parse_config,
};
