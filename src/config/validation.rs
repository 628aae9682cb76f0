use crate::config::types::{Config, CrawlerConfig, RateLimitConfig, SourceConfig};
use crate::storage::validate_partition_key;
use crate::ConfigError;
use std::collections::HashSet;
use url::Url;

/// Validates the entire configuration
pub fn validate(config: &Config) -> Result<(), ConfigError> {
    validate_partitions(&config.partitions)?;
    validate_crawler_config(&config.crawler)?;
    validate_rate_limit_config(&config.rate_limit)?;
    validate_source_config(&config.source)?;
    Ok(())
}

/// Partition keys must be non-empty, unique, and safe to use in file names
fn validate_partitions(partitions: &[String]) -> Result<(), ConfigError> {
    if partitions.is_empty() {
        return Err(ConfigError::Validation(
            "at least one partition must be configured".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for partition in partitions {
        validate_partition_key(partition).map_err(|_| {
            ConfigError::Validation(format!(
                "partition '{}' may only contain letters, digits, '-' and '_'",
                partition
            ))
        })?;

        if !seen.insert(partition.as_str()) {
            return Err(ConfigError::Validation(format!(
                "partition '{}' is listed more than once",
                partition
            )));
        }
    }

    Ok(())
}

/// Validates crawler configuration
fn validate_crawler_config(config: &CrawlerConfig) -> Result<(), ConfigError> {
    if config.worker_count < 1 || config.worker_count > 64 {
        return Err(ConfigError::Validation(format!(
            "worker_count must be between 1 and 64, got {}",
            config.worker_count
        )));
    }

    if config.queue_capacity < 1 {
        return Err(ConfigError::Validation(
            "queue_capacity must be >= 1".to_string(),
        ));
    }

    if config.poll_timeout_ms < 1 || config.monitor_interval_ms < 1 {
        return Err(ConfigError::Validation(
            "poll_timeout_ms and monitor_interval_ms must be >= 1".to_string(),
        ));
    }

    if config.max_listing_failures < 1 {
        return Err(ConfigError::Validation(
            "max_listing_failures must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates rate limit configuration
fn validate_rate_limit_config(config: &RateLimitConfig) -> Result<(), ConfigError> {
    if config.max_interval_ms < config.min_interval_ms {
        return Err(ConfigError::Validation(format!(
            "max_interval_ms ({}) must be >= min_interval_ms ({})",
            config.max_interval_ms, config.min_interval_ms
        )));
    }

    if config.sweep_interval_secs < 1 {
        return Err(ConfigError::Validation(
            "sweep_interval_secs must be >= 1".to_string(),
        ));
    }

    Ok(())
}

/// Validates source configuration
fn validate_source_config(config: &SourceConfig) -> Result<(), ConfigError> {
    let url = Url::parse(&config.base_url)
        .map_err(|e| ConfigError::InvalidUrl(format!("Invalid base_url: {}", e)))?;

    if url.scheme() != "http" && url.scheme() != "https" {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' must use http or https",
            config.base_url
        )));
    }

    if url.host_str().is_none() {
        return Err(ConfigError::InvalidUrl(format!(
            "base_url '{}' has no host",
            config.base_url
        )));
    }

    if config.page_size < 1 {
        return Err(ConfigError::Validation("page_size must be >= 1".to_string()));
    }

    if config.max_retries < 1 {
        return Err(ConfigError::Validation("max_retries must be >= 1".to_string()));
    }

    if config.user_agent.trim().is_empty() {
        return Err(ConfigError::Validation(
            "user_agent cannot be empty".to_string(),
        ));
    }

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn create_test_source() -> SourceConfig {
        SourceConfig {
            base_url: "https://issues.apache.org/jira".to_string(),
            page_size: 50,
            max_retries: 3,
            request_timeout_secs: 30,
            user_agent: "test/1.0".to_string(),
        }
    }

    fn partitions(names: &[&str]) -> Vec<String> {
        names.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_validate_partitions() {
        assert!(validate_partitions(&partitions(&["SPARK", "HADOOP", "my_proj-2"])).is_ok());

        assert!(validate_partitions(&[]).is_err());
        assert!(validate_partitions(&partitions(&[""])).is_err());
        assert!(validate_partitions(&partitions(&["../etc"])).is_err());
        assert!(validate_partitions(&partitions(&["A B"])).is_err());
        assert!(validate_partitions(&partitions(&["SPARK", "SPARK"])).is_err());
    }

    #[test]
    fn test_validate_crawler_config() {
        assert!(validate_crawler_config(&CrawlerConfig::default()).is_ok());

        let no_workers = CrawlerConfig {
            worker_count: 0,
            ..Default::default()
        };
        assert!(validate_crawler_config(&no_workers).is_err());

        let no_capacity = CrawlerConfig {
            queue_capacity: 0,
            ..Default::default()
        };
        assert!(validate_crawler_config(&no_capacity).is_err());
    }

    #[test]
    fn test_validate_rate_limit_config() {
        assert!(validate_rate_limit_config(&RateLimitConfig::default()).is_ok());

        let inverted = RateLimitConfig {
            min_interval_ms: 5000,
            max_interval_ms: 1000,
            ..Default::default()
        };
        assert!(validate_rate_limit_config(&inverted).is_err());
    }

    #[test]
    fn test_validate_source_config() {
        assert!(validate_source_config(&create_test_source()).is_ok());

        let ftp = SourceConfig {
            base_url: "ftp://issues.apache.org".to_string(),
            ..create_test_source()
        };
        assert!(matches!(
            validate_source_config(&ftp),
            Err(ConfigError::InvalidUrl(_))
        ));

        let garbage = SourceConfig {
            base_url: "not a url".to_string(),
            ..create_test_source()
        };
        assert!(validate_source_config(&garbage).is_err());

        let zero_page = SourceConfig {
            page_size: 0,
            ..create_test_source()
        };
        assert!(matches!(
            validate_source_config(&zero_page),
            Err(ConfigError::Validation(_))
        ));
    }
}
