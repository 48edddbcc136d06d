//! Startup failures
//!
//! Anything that stops a cluster from opening. These never reach a request
//! handler; the CLI reports them and exits.

use thiserror::Error;

use crate::config::ConfigError;
use crate::recovery_log::RecoveryLogError;

#[derive(Debug, Error)]
pub enum BootError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("recovery log unusable: {0}")]
    RecoveryLog(#[from] RecoveryLogError),
}

impl BootError {
    pub fn code(&self) -> &'static str {
        match self {
            Self::Config(e) => e.code(),
            Self::RecoveryLog(e) => e.code().code(),
        }
    }
}

pub type BootResult<T> = Result<T, BootError>;
