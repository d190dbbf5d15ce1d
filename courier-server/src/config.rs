//! Configuration loading for courier-server.
//!
//! Configuration is loaded from a TOML file (default: `courier.toml`).
//! Every section is optional; missing fields fall back to their defaults.

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// Root configuration for courier-server.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    /// Server configuration.
    #[serde(default)]
    pub server: ServerConfig,
    /// Admission and connection limits.
    #[serde(default)]
    pub limits: LimitsConfig,
    /// Static routing directory.
    #[serde(default)]
    pub routing: RoutingConfig,
}

/// Server configuration.
#[derive(Debug, Clone, Deserialize)]
pub struct ServerConfig {
    /// Interface to bind (default: 0.0.0.0).
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// TCP port (default: 2048). Overridden by `--port`.
    #[serde(default = "default_port")]
    pub port: u16,
    /// Location advertised in this node's address (e.g. `mail.example.org:2048`).
    pub location: Option<String>,
    /// Alias advertised in this node's address.
    pub alias: Option<String>,
    /// Hex-encoded identity file, generated on first start if missing.
    #[serde(default = "default_key_path")]
    pub key_path: PathBuf,
}

/// Admission and connection limits.
#[derive(Debug, Clone, Deserialize)]
pub struct LimitsConfig {
    /// Connections accepted per source IP per minute (default: 120).
    #[serde(default = "default_connections_per_ip")]
    pub connections_per_ip: u32,
    /// Connections accepted per second across all peers (default: 500).
    #[serde(default = "default_global_connections_per_second")]
    pub global_connections_per_second: u32,
    /// Connections served at the same time (default: 1024).
    #[serde(default = "default_max_concurrent_connections")]
    pub max_concurrent_connections: usize,
    /// Deadline for reading the request envelope (default: 30).
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,
    /// Deadline for writing each response envelope (default: 30).
    #[serde(default = "default_write_timeout_secs")]
    pub write_timeout_secs: u64,
    /// Largest envelope accepted, in bytes (default: 1MB).
    #[serde(default = "default_max_envelope_size")]
    pub max_envelope_size: usize,
    /// How often idle rate-limiter entries are evicted (default: 300).
    #[serde(default = "default_shrink_interval_secs")]
    pub shrink_interval_secs: u64,
}

impl LimitsConfig {
    /// Read deadline as a [`Duration`].
    pub fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.read_timeout_secs)
    }

    /// Write deadline as a [`Duration`].
    pub fn write_timeout(&self) -> Duration {
        Duration::from_secs(self.write_timeout_secs)
    }
}

/// Static routing directory.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RoutingConfig {
    /// Known peers.
    #[serde(default)]
    pub routes: Vec<RouteConfig>,
}

/// One known peer in the static directory.
#[derive(Debug, Clone, Deserialize)]
pub struct RouteConfig {
    /// Alias the peer is known by.
    pub alias: Option<String>,
    /// Hex-encoded Ed25519 public key.
    pub signing_key: String,
    /// Hex-encoded X25519 public key.
    pub encryption_key: String,
    /// Network location of the peer.
    pub location: String,
}

// Default value functions
fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    2048
}

fn default_key_path() -> PathBuf {
    PathBuf::from("courier.key")
}

fn default_connections_per_ip() -> u32 {
    120
}

fn default_global_connections_per_second() -> u32 {
    500
}

fn default_max_concurrent_connections() -> usize {
    1024
}

fn default_read_timeout_secs() -> u64 {
    30
}

fn default_write_timeout_secs() -> u64 {
    30
}

fn default_max_envelope_size() -> usize {
    1024 * 1024 // 1MB
}

fn default_shrink_interval_secs() -> u64 {
    300
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            port: default_port(),
            location: None,
            alias: None,
            key_path: default_key_path(),
        }
    }
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            connections_per_ip: default_connections_per_ip(),
            global_connections_per_second: default_global_connections_per_second(),
            max_concurrent_connections: default_max_concurrent_connections(),
            read_timeout_secs: default_read_timeout_secs(),
            write_timeout_secs: default_write_timeout_secs(),
            max_envelope_size: default_max_envelope_size(),
            shrink_interval_secs: default_shrink_interval_secs(),
        }
    }
}

impl Config {
    /// Load configuration from a TOML file.
    ///
    /// # Errors
    ///
    /// Returns an error if the file cannot be read or parsed.
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadError {
            path: path.to_path_buf(),
            source: e,
        })?;

        toml::from_str(&content).map_err(|e| ConfigError::ParseError {
            path: path.to_path_buf(),
            source: e,
        })
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// Failed to read configuration file.
    #[error("failed to read config file {path}: {source}")]
    ReadError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying I/O error.
        source: std::io::Error,
    },
    /// Failed to parse configuration file.
    #[error("failed to parse config file {path}: {source}")]
    ParseError {
        /// Path to the configuration file.
        path: PathBuf,
        /// Underlying TOML parse error.
        source: toml::de::Error,
    },
    /// A value is out of range.
    #[error("invalid value for {field}: {reason}")]
    Invalid {
        /// Offending field.
        field: &'static str,
        /// What is wrong with it.
        reason: String,
    },
}
