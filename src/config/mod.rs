//! Cluster configuration
//!
//! A JSON file with one required field, `data_dir`. Every section below it
//! falls back to defaults, and a missing file means all defaults rooted at
//! `./data`.
//!
//! ```json
//! {
//!   "data_dir": "/var/lib/fragdb",
//!   "pool": { "max_connections": 10 },
//!   "replication": { "probe_timeout_ms": 500 },
//!   "recovery": { "resolve_interval_ms": 5000, "scheduler_enabled": true },
//!   "http": { "port": 3001 },
//!   "default_isolation": "READ_COMMITTED"
//! }
//! ```

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::http_server::HttpServerConfig;
use crate::replication::ReplicationConfig;
use crate::transaction::IsolationLevel;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ConfigError {
    #[error("failed to read config {path}: {reason}")]
    Read { path: String, reason: String },

    #[error("invalid config JSON: {0}")]
    Parse(String),

    #[error("invalid config: {0}")]
    Invalid(String),
}

impl ConfigError {
    pub fn invalid(reason: impl Into<String>) -> Self {
        Self::Invalid(reason.into())
    }

    pub fn code(&self) -> &'static str {
        match self {
            Self::Read { .. } => "FRAG_CONFIG_READ",
            Self::Parse(_) => "FRAG_CONFIG_PARSE",
            Self::Invalid(_) => "FRAG_CONFIG_INVALID",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolConfig {
    /// Connections per node (default: 10)
    #[serde(default = "default_max_connections")]
    pub max_connections: usize,
}

fn default_max_connections() -> usize {
    10
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: default_max_connections(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecoveryConfig {
    /// Period of the background resolver (default: 5000 ms)
    #[serde(default = "default_resolve_interval_ms")]
    pub resolve_interval_ms: u64,

    /// Whether `serve` starts the background resolver (default: true)
    #[serde(default = "default_scheduler_enabled")]
    pub scheduler_enabled: bool,
}

fn default_resolve_interval_ms() -> u64 {
    5000
}

fn default_scheduler_enabled() -> bool {
    true
}

impl Default for RecoveryConfig {
    fn default() -> Self {
        Self {
            resolve_interval_ms: default_resolve_interval_ms(),
            scheduler_enabled: default_scheduler_enabled(),
        }
    }
}

impl RecoveryConfig {
    pub fn resolve_interval(&self) -> Duration {
        Duration::from_millis(self.resolve_interval_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ClusterConfig {
    /// Root of the durable recovery logs (required)
    pub data_dir: PathBuf,

    #[serde(default)]
    pub pool: PoolConfig,

    #[serde(default)]
    pub replication: ReplicationConfig,

    #[serde(default)]
    pub recovery: RecoveryConfig,

    #[serde(default)]
    pub http: HttpServerConfig,

    /// Isolation for requests that do not name one (default: READ_COMMITTED)
    #[serde(default = "default_request_isolation")]
    pub default_isolation: IsolationLevel,
}

fn default_request_isolation() -> IsolationLevel {
    IsolationLevel::ReadCommitted
}

impl ClusterConfig {
    /// Defaults everywhere, rooted at `data_dir`.
    pub fn for_data_dir(data_dir: impl Into<PathBuf>) -> Self {
        Self {
            data_dir: data_dir.into(),
            pool: PoolConfig::default(),
            replication: ReplicationConfig::default(),
            recovery: RecoveryConfig::default(),
            http: HttpServerConfig::default(),
            default_isolation: default_request_isolation(),
        }
    }

    /// Load and validate a config file.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = fs::read_to_string(path).map_err(|e| ConfigError::Read {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let config: ClusterConfig =
            serde_json::from_str(&content).map_err(|e| ConfigError::Parse(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Like `load`, but a missing file yields the defaults.
    pub fn load_or_default(path: Option<&Path>) -> Result<Self, ConfigError> {
        match path {
            Some(path) if path.exists() => Self::load(path),
            _ => Ok(Self::for_data_dir("data")),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(ConfigError::invalid("data_dir must not be empty"));
        }
        if self.pool.max_connections == 0 {
            return Err(ConfigError::invalid("pool.max_connections must be positive"));
        }
        if self.recovery.resolve_interval_ms == 0 {
            return Err(ConfigError::invalid("recovery.resolve_interval_ms must be positive"));
        }
        self.http.validate()?;
        self.replication.validate()
    }
}
