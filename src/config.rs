//! Client configuration

use std::env;

/// Default endpoint of a local etcd member
pub const DEFAULT_ENDPOINT: &str = "http://127.0.0.1:2379";

/// Configuration options for the etcd client
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ClientConfig {
    /// Cluster member URL, scheme and authority only (default: http://127.0.0.1:2379)
    pub endpoint: String,
    /// Request timeout in milliseconds, not applied to watch long polls (default: 30000)
    pub timeout_ms: u64,
    /// Maximum redirects followed per request (default: 3)
    pub max_redirects: usize,
}

impl Default for ClientConfig {
    fn default() -> Self {
        Self {
            endpoint: DEFAULT_ENDPOINT.to_string(),
            timeout_ms: 30000,
            max_redirects: 3,
        }
    }
}

impl ClientConfig {
    /// Configuration for `endpoint` with default limits
    pub fn new(endpoint: &str) -> Self {
        Self {
            endpoint: endpoint.to_string(),
            ..Default::default()
        }
    }

    /// Read `ETCD_ENDPOINT`, `ETCD_TIMEOUT_MS` and `ETCD_MAX_REDIRECTS`.
    /// Unset or unparsable values keep their defaults.
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let endpoint = env::var("ETCD_ENDPOINT").unwrap_or(defaults.endpoint);
        let timeout_ms = env::var("ETCD_TIMEOUT_MS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.timeout_ms);
        let max_redirects = env::var("ETCD_MAX_REDIRECTS")
            .ok()
            .and_then(|s| s.trim().parse().ok())
            .unwrap_or(defaults.max_redirects);

        ClientConfig {
            endpoint,
            timeout_ms,
            max_redirects,
        }
    }
}
