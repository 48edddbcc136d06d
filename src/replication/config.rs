//! Replication configuration
//!
//! Probe timeout, retry policy and the isolation level replication applies
//! run at. Read from the `replication` section of the cluster config; every
//! field has a default.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::config::ConfigError;
use crate::transaction::IsolationLevel;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationConfig {
    /// Upper bound on one liveness probe (default: 500 ms)
    #[serde(default = "default_probe_timeout_ms")]
    pub probe_timeout_ms: u64,

    /// Upper bound on waiting for a pooled connection (default: 1000 ms)
    #[serde(default = "default_connect_timeout_ms")]
    pub connect_timeout_ms: u64,

    /// Extra probe attempts after the first failure (default: 0)
    #[serde(default)]
    pub probe_retries: u32,

    /// Pause between probe attempts (default: 100 ms)
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Isolation level of the transaction that applies a write on the
    /// target (default: READ_COMMITTED)
    #[serde(default = "default_apply_isolation")]
    pub apply_isolation: IsolationLevel,
}

fn default_probe_timeout_ms() -> u64 {
    500
}

fn default_connect_timeout_ms() -> u64 {
    1000
}

fn default_retry_backoff_ms() -> u64 {
    100
}

fn default_apply_isolation() -> IsolationLevel {
    IsolationLevel::ReadCommitted
}

impl Default for ReplicationConfig {
    fn default() -> Self {
        Self {
            probe_timeout_ms: default_probe_timeout_ms(),
            connect_timeout_ms: default_connect_timeout_ms(),
            probe_retries: 0,
            retry_backoff_ms: default_retry_backoff_ms(),
            apply_isolation: default_apply_isolation(),
        }
    }
}

impl ReplicationConfig {
    pub fn probe_timeout(&self) -> Duration {
        Duration::from_millis(self.probe_timeout_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.probe_timeout_ms == 0 {
            return Err(ConfigError::invalid("replication.probe_timeout_ms must be positive"));
        }
        if self.connect_timeout_ms == 0 {
            return Err(ConfigError::invalid("replication.connect_timeout_ms must be positive"));
        }
        Ok(())
    }
}
