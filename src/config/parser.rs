//! Reading crawl configuration files
//!
//! A configuration file is read once; the same text is parsed, validated and
//! fingerprinted, so the logged hash always matches the settings in use.

use crate::config::types::Config;
use crate::config::validation::validate;
use crate::ConfigError;
use sha2::{Digest, Sha256};
use std::path::Path;

/// Parses and validates configuration text
///
/// Fails with [`ConfigError::Parse`] on malformed TOML or missing required
/// tables, and with [`ConfigError::Validation`] when a value is out of range.
pub fn parse_config(content: &str) -> Result<Config, ConfigError> {
    let config: Config = toml::from_str(content)?;
    validate(&config)?;
    tracing::debug!(
        "Parsed configuration for {} partitions against {}",
        config.partitions.len(),
        config.source.base_url
    );
    Ok(config)
}

/// Hex SHA-256 of configuration text
pub fn content_hash(content: &str) -> String {
    hex::encode(Sha256::digest(content.as_bytes()))
}

/// Loads a crawl configuration from a TOML file
///
/// # Example
///
/// ```no_run
/// use std::path::Path;
/// use crawl_ledger::config::load_config;
///
/// let config = load_config(Path::new("crawl.toml")).unwrap();
/// println!("Partitions: {:?}", config.partitions);
/// ```
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    load_config_with_hash(path).map(|(config, _)| config)
}

/// Fingerprint of a configuration file, as logged at crawl start
pub fn compute_config_hash(path: &Path) -> Result<String, ConfigError> {
    Ok(content_hash(&std::fs::read_to_string(path)?))
}

/// Loads a configuration together with the fingerprint of the exact text parsed
pub fn load_config_with_hash(path: &Path) -> Result<(Config, String), ConfigError> {
    let content = std::fs::read_to_string(path)?;
    let config = parse_config(&content)?;
    let hash = content_hash(&content);
    tracing::debug!("Read {} ({} bytes, hash {})", path.display(), content.len(), hash);
    Ok((config, hash))
}
