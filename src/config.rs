// Configuration module for lsifq
// Reads from environment variables with sensible defaults

use std::env;
use std::sync::OnceLock;

/// Global configuration instance
static CONFIG: OnceLock<Config> = OnceLock::new();

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Base URL of the bundle manager service (LSIFQ_BUNDLE_MANAGER_URL)
    pub bundle_manager_url: String,

    /// Database connection pool size (LSIFQ_POOL_SIZE)
    pub pool_size: u32,

    /// Database connection pool minimum idle connections (LSIFQ_POOL_MIN_IDLE)
    pub pool_min_idle: u32,

    /// Per-call bundle manager timeout in seconds (LSIFQ_BUNDLE_TIMEOUT_SECS)
    pub bundle_timeout_secs: u32,

    /// Whole-request deadline in seconds (LSIFQ_REQUEST_TIMEOUT_SECS)
    pub request_timeout_secs: u32,

    /// Candidate-dump batch size for remote reference phases (LSIFQ_REMOTE_DUMP_LIMIT)
    pub remote_dump_limit: usize,

    /// Default page size for reference queries without an explicit limit (LSIFQ_DEFAULT_PAGE_LIMIT)
    pub default_page_limit: usize,

    /// Concurrent bundle Exists probes per request (LSIFQ_EXISTS_CONCURRENCY)
    pub exists_concurrency: usize,

    /// Default page size for upload listings (LSIFQ_UPLOAD_PAGE_SIZE)
    pub upload_page_size: usize,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            bundle_manager_url: "http://localhost:3187".to_string(),
            pool_size: 10,
            pool_min_idle: 2,
            bundle_timeout_secs: 10,
            request_timeout_secs: 30,
            remote_dump_limit: 20,
            default_page_limit: 100,
            exists_concurrency: 8,
            upload_page_size: 50,
        }
    }
}

macro_rules! read_env {
    ($config:expr, $field:ident, $var:literal) => {
        if let Ok(val) = env::var($var) {
            if let Ok(parsed) = val.parse() {
                $config.$field = parsed;
            } else {
                eprintln!(
                    "lsifq: Warning: Invalid {} value: {}, using default: {}",
                    $var, val, $config.$field
                );
            }
        }
    };
}

impl Config {
    /// Load configuration from environment variables
    fn from_env() -> Self {
        let mut config = Config::default();

        if let Ok(val) = env::var("LSIFQ_BUNDLE_MANAGER_URL") {
            if val.trim().is_empty() {
                eprintln!(
                    "lsifq: Warning: Empty LSIFQ_BUNDLE_MANAGER_URL, using default: {}",
                    config.bundle_manager_url
                );
            } else {
                config.bundle_manager_url = val.trim_end_matches('/').to_string();
            }
        }

        read_env!(config, pool_size, "LSIFQ_POOL_SIZE");
        read_env!(config, pool_min_idle, "LSIFQ_POOL_MIN_IDLE");
        read_env!(config, bundle_timeout_secs, "LSIFQ_BUNDLE_TIMEOUT_SECS");
        read_env!(config, request_timeout_secs, "LSIFQ_REQUEST_TIMEOUT_SECS");
        read_env!(config, remote_dump_limit, "LSIFQ_REMOTE_DUMP_LIMIT");
        read_env!(config, default_page_limit, "LSIFQ_DEFAULT_PAGE_LIMIT");
        read_env!(config, exists_concurrency, "LSIFQ_EXISTS_CONCURRENCY");
        read_env!(config, upload_page_size, "LSIFQ_UPLOAD_PAGE_SIZE");

        config
    }

    /// Get the global configuration instance
    pub fn get() -> &'static Config {
        CONFIG.get_or_init(Config::from_env)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.bundle_manager_url, "http://localhost:3187");
        assert_eq!(config.pool_size, 10);
        assert_eq!(config.pool_min_idle, 2);
        assert_eq!(config.remote_dump_limit, 20);
        assert_eq!(config.default_page_limit, 100);
        assert_eq!(config.exists_concurrency, 8);
        assert_eq!(config.upload_page_size, 50);
    }
}
