//! Server configuration.
//!
//! Configuration can be loaded from:
//! - Environment variables (CRIER_*)
//! - TOML configuration file

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::Path;

/// Server configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Host to bind to.
    #[serde(default = "default_host")]
    pub host: String,

    /// Port to listen on.
    #[serde(default = "default_port")]
    pub port: u16,

    /// Public host name rendered into admin-facing examples (`/curl`).
    #[serde(default = "default_public_host")]
    pub public_host: String,

    /// Persistence configuration.
    #[serde(default)]
    pub store: StoreConfig,

    /// Delivery collaborator configuration.
    #[serde(default)]
    pub delivery: DeliveryConfig,

    /// Fan-out configuration.
    #[serde(default)]
    pub fanout: FanoutConfig,

    /// Metrics configuration.
    #[serde(default)]
    pub metrics: MetricsConfig,
}

/// Persistence configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoreConfig {
    /// SQLite database URL.
    #[serde(default = "default_store_url")]
    pub url: String,
}

/// Delivery collaborator configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DeliveryConfig {
    /// Base URL of the per-recipient delivery service.
    #[serde(default = "default_delivery_url")]
    pub base_url: String,

    /// Per-request timeout in milliseconds.
    #[serde(default = "default_delivery_timeout")]
    pub timeout_ms: u64,
}

/// Fan-out configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FanoutConfig {
    /// Size of the process-wide delivery worker pool.
    #[serde(default = "default_fanout_workers")]
    pub workers: usize,

    /// Recipients per forwarded batch.
    #[serde(default = "default_batch_size")]
    pub batch_size: usize,

    /// Delay between consecutive catch-up messages, in milliseconds.
    #[serde(default = "default_catchup_pacing")]
    pub catchup_pacing_ms: u64,

    /// Sibling node base URLs. Empty means direct per-recipient dispatch.
    #[serde(default)]
    pub nodes: Vec<String>,
}

/// Metrics configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MetricsConfig {
    /// Enable metrics export.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Metrics port.
    #[serde(default = "default_metrics_port")]
    pub port: u16,
}

// Default value functions
fn default_host() -> String {
    std::env::var("CRIER_HOST").unwrap_or_else(|_| "127.0.0.1".to_string())
}

fn default_port() -> u16 {
    std::env::var("CRIER_PORT")
        .ok()
        .and_then(|p| p.parse().ok())
        .unwrap_or(8080)
}

fn default_public_host() -> String {
    std::env::var("CRIER_PUBLIC_HOST").unwrap_or_else(|_| "localhost:8080".to_string())
}

fn default_store_url() -> String {
    "sqlite://crier.db".to_string()
}

fn default_delivery_url() -> String {
    "http://127.0.0.1:8700".to_string()
}

fn default_delivery_timeout() -> u64 {
    10_000
}

fn default_fanout_workers() -> usize {
    20
}

fn default_batch_size() -> usize {
    50
}

fn default_catchup_pacing() -> u64 {
    500
}

fn default_true() -> bool {
    true
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Config {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            public_host: default_public_host(),
            store: StoreConfig::default(),
            delivery: DeliveryConfig::default(),
            fanout: FanoutConfig::default(),
            metrics: MetricsConfig::default(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            url: default_store_url(),
        }
    }
}

impl Default for DeliveryConfig {
    fn default() -> Self {
        Self {
            base_url: default_delivery_url(),
            timeout_ms: default_delivery_timeout(),
        }
    }
}

impl Default for FanoutConfig {
    fn default() -> Self {
        Self {
            workers: default_fanout_workers(),
            batch_size: default_batch_size(),
            catchup_pacing_ms: default_catchup_pacing(),
            nodes: Vec::new(),
        }
    }
}

impl Default for MetricsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            port: default_metrics_port(),
        }
    }
}

impl Config {
    /// Load configuration from file or defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed.
    pub fn load() -> Result<Self> {
        let config_paths = [
            "crier.toml",
            "/etc/crier/crier.toml",
            "~/.config/crier/crier.toml",
        ];

        for path in &config_paths {
            let expanded = shellexpand::tilde(path);
            if Path::new(expanded.as_ref()).exists() {
                return Self::from_file(expanded.as_ref());
            }
        }

        // Fall back to defaults with environment overrides
        Ok(Self::default())
    }

    /// Load configuration from a specific file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path)
            .with_context(|| format!("Failed to read config file: {}", path.display()))?;

        let config: Config = toml::from_str(&contents)
            .with_context(|| format!("Failed to parse config file: {}", path.display()))?;

        Ok(config)
    }

    /// Get the socket address to bind to.
    #[must_use]
    pub fn bind_addr(&self) -> SocketAddr {
        format!("{}:{}", self.host, self.port)
            .parse()
            .expect("Invalid host:port")
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.port, 8080);
        assert_eq!(config.fanout.workers, 20);
        assert!(config.fanout.nodes.is_empty());
        assert_eq!(config.store.url, "sqlite://crier.db");
    }

    #[test]
    fn test_config_bind_addr() {
        let config = Config::default();
        let addr = config.bind_addr();
        assert_eq!(addr.port(), 8080);
    }

    #[test]
    fn test_config_from_toml() {
        let toml_str = r#"
            host = "0.0.0.0"
            port = 9000

            [fanout]
            workers = 64
            nodes = ["http://node-a:9000", "http://node-b:9000"]

            [store]
            url = "sqlite:///var/lib/crier/crier.db"
        "#;

        let config: Config = toml::from_str(toml_str).unwrap();
        assert_eq!(config.host, "0.0.0.0");
        assert_eq!(config.port, 9000);
        assert_eq!(config.fanout.workers, 64);
        assert_eq!(config.fanout.nodes.len(), 2);
        assert_eq!(config.store.url, "sqlite:///var/lib/crier/crier.db");
    }
}
