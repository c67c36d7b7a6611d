//! Tunables for every component in this crate, gathered in one place so a
//! front-end can override them from a config file or CLI flags without
//! threading a dozen separate parameters through constructors.

use std::time::Duration;

/// Engine-wide configuration, with sensible defaults for every tunable.
#[derive(Debug, Clone, PartialEq)]
pub struct Config {
    /// File-size ceiling for safe document parsing.
    pub max_yaml_size: u64,
    /// Parse wall-clock bound.
    pub yaml_timeout: Duration,
    /// Hostnames the URL validator and installer are allowed to fetch from.
    pub allowed_domains: Vec<String>,
    /// URL size ceiling.
    pub max_url_length: usize,
    /// Per-request HTTP timeout.
    pub download_timeout: Duration,
    /// Download retries before failure.
    pub max_retries: u32,
    /// Dependency DFS depth bound.
    pub dependency_max_depth: usize,
    /// In-memory cache item cap.
    pub lru_max_items: usize,
    /// In-memory cache byte cap.
    pub lru_max_memory: u64,
    /// Disk-cache default lifetime.
    pub persistent_cache_ttl: Duration,
    /// Minimum fuzzy score accepted by default.
    pub fuzzy_score_cutoff_default: u32,
    /// Minimum fuzzy score when the query looks noisy.
    pub fuzzy_score_cutoff_noisy: u32,
}

impl Default for Config {
    fn default() -> Self {
        Config {
            max_yaml_size: 1024 * 1024,
            yaml_timeout: Duration::from_secs(5),
            allowed_domains: vec!["raw.githubusercontent.com".to_owned()],
            max_url_length: 2048,
            download_timeout: Duration::from_secs(30),
            max_retries: 3,
            dependency_max_depth: 5,
            lru_max_items: 50,
            lru_max_memory: 10 * 1024 * 1024,
            persistent_cache_ttl: Duration::from_secs(24 * 60 * 60),
            fuzzy_score_cutoff_default: 35,
            fuzzy_score_cutoff_noisy: 60,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_the_documented_table() {
        let c = Config::default();
        assert_eq!(c.max_yaml_size, 1024 * 1024);
        assert_eq!(c.yaml_timeout, Duration::from_secs(5));
        assert_eq!(c.allowed_domains, vec!["raw.githubusercontent.com"]);
        assert_eq!(c.max_url_length, 2048);
        assert_eq!(c.download_timeout, Duration::from_secs(30));
        assert_eq!(c.max_retries, 3);
        assert_eq!(c.dependency_max_depth, 5);
        assert_eq!(c.lru_max_items, 50);
        assert_eq!(c.lru_max_memory, 10 * 1024 * 1024);
        assert_eq!(c.persistent_cache_ttl, Duration::from_secs(86_400));
        assert_eq!(c.fuzzy_score_cutoff_default, 35);
        assert_eq!(c.fuzzy_score_cutoff_noisy, 60);
    }
}
