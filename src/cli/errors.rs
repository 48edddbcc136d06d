//! CLI-specific error types
//!
//! Every CLI error ends the process with a non-zero exit code.

use std::fmt;
use std::io;

use crate::cluster::BootError;
use crate::errors::FragError;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliErrorCode {
    /// Configuration file error
    ConfigError,
    /// I/O error (stdout, runtime, listener)
    IoError,
    /// Cluster could not be opened
    BootFailed,
    /// A cluster operation failed
    OperationFailed,
}

impl CliErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            Self::ConfigError => "FRAG_CLI_CONFIG_ERROR",
            Self::IoError => "FRAG_CLI_IO_ERROR",
            Self::BootFailed => "FRAG_CLI_BOOT_FAILED",
            Self::OperationFailed => "FRAG_CLI_OPERATION_FAILED",
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    code: CliErrorCode,
    message: String,
}

impl CliError {
    pub fn new(code: CliErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    pub fn config_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::ConfigError, msg)
    }

    pub fn io_error(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::IoError, msg)
    }

    pub fn boot_failed(msg: impl Into<String>) -> Self {
        Self::new(CliErrorCode::BootFailed, msg)
    }

    pub fn code(&self) -> &CliErrorCode {
        &self.code
    }

    pub fn message(&self) -> &str {
        &self.message
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.code.code(), self.message)
    }
}

impl std::error::Error for CliError {}

impl From<io::Error> for CliError {
    fn from(e: io::Error) -> Self {
        Self::io_error(e.to_string())
    }
}

impl From<serde_json::Error> for CliError {
    fn from(e: serde_json::Error) -> Self {
        Self::io_error(format!("JSON error: {}", e))
    }
}

impl From<BootError> for CliError {
    fn from(e: BootError) -> Self {
        match e {
            BootError::Config(e) => Self::config_error(e.to_string()),
            other => Self::boot_failed(format!("{} ({})", other, other.code())),
        }
    }
}

impl From<FragError> for CliError {
    fn from(e: FragError) -> Self {
        Self::new(
            CliErrorCode::OperationFailed,
            format!("{} ({})", e, e.code()),
        )
    }
}

pub type CliResult<T> = Result<T, CliError>;
