//! Configuration schema definitions.
//!
//! This module defines the complete configuration structure for the proxy.
//! All types derive Serde traits for deserialization from config files, and
//! `ServerConfig` is also the JSON payload each worker receives at spawn.

use serde::{Deserialize, Serialize};
use url::Url;

/// Root configuration for the proxy.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ProxyConfig {
    /// Listener, worker pool, upstreams and rules.
    pub server: ServerConfig,

    /// Logging settings.
    #[serde(default)]
    pub observability: ObservabilityConfig,
}

/// Server configuration shared read-only by the front and every worker.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct ServerConfig {
    /// Public listening port.
    pub listen: u16,

    /// Number of worker processes (default: host CPU count).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub workers: Option<usize>,

    /// Upstream servers, identified by `id`.
    #[serde(default)]
    pub upstreams: Vec<UpstreamConfig>,

    /// Routing rules, evaluated in declaration order.
    #[serde(default)]
    pub rules: Vec<RuleConfig>,
}

impl ServerConfig {
    /// Configured worker count, falling back to the number of CPUs.
    pub fn worker_count(&self) -> usize {
        self.workers.unwrap_or_else(cpu_count)
    }

    /// Look up an upstream by id.
    pub fn upstream(&self, id: &str) -> Option<&UpstreamConfig> {
        self.upstreams.iter().find(|u| u.id == id)
    }
}

/// A named backend server.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct UpstreamConfig {
    /// Unique upstream identifier.
    pub id: String,

    /// Absolute base URL (e.g., "http://127.0.0.1:3000").
    pub url: Url,
}

/// Path-pattern-to-upstream-list binding.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
pub struct RuleConfig {
    /// Path matched exactly or as a prefix.
    pub path: String,

    /// Upstream ids to rotate through.
    pub upstreams: Vec<String>,
}

/// Observability configuration.
#[derive(Debug, Clone, Deserialize, Serialize, PartialEq)]
#[serde(default)]
pub struct ObservabilityConfig {
    /// Log level (trace, debug, info, warn, error).
    pub log_level: String,
}

impl Default for ObservabilityConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
        }
    }
}

fn cpu_count() -> usize {
    std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1)
}
