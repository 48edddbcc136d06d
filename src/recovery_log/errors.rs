//! Recovery log error types
//!
//! Error codes:
//! - FRAG_LOG_APPEND_FAILED (ERROR)
//! - FRAG_LOG_FSYNC_FAILED (FATAL)
//! - FRAG_LOG_CORRUPTION (FATAL)

use std::fmt;
use std::io;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Severity {
    /// The operation fails, the process continues
    Error,
    /// The log can no longer be trusted
    Fatal,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Severity::Error => write!(f, "ERROR"),
            Severity::Fatal => write!(f, "FATAL"),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryLogErrorCode {
    AppendFailed,
    FsyncFailed,
    Corruption,
}

impl RecoveryLogErrorCode {
    pub fn code(&self) -> &'static str {
        match self {
            RecoveryLogErrorCode::AppendFailed => "FRAG_LOG_APPEND_FAILED",
            RecoveryLogErrorCode::FsyncFailed => "FRAG_LOG_FSYNC_FAILED",
            RecoveryLogErrorCode::Corruption => "FRAG_LOG_CORRUPTION",
        }
    }

    pub fn severity(&self) -> Severity {
        match self {
            RecoveryLogErrorCode::AppendFailed => Severity::Error,
            RecoveryLogErrorCode::FsyncFailed | RecoveryLogErrorCode::Corruption => {
                Severity::Fatal
            }
        }
    }
}

impl fmt::Display for RecoveryLogErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

#[derive(Debug)]
pub struct RecoveryLogError {
    code: RecoveryLogErrorCode,
    message: String,
    details: Option<String>,
    source: Option<io::Error>,
}

impl RecoveryLogError {
    pub fn append_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: RecoveryLogErrorCode::AppendFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    /// Append failure with no underlying I/O error, e.g. an image that
    /// could not be encoded.
    pub fn rejected(message: impl Into<String>, details: impl Into<String>) -> Self {
        Self {
            code: RecoveryLogErrorCode::AppendFailed,
            message: message.into(),
            details: Some(details.into()),
            source: None,
        }
    }

    pub fn fsync_failed(message: impl Into<String>, source: io::Error) -> Self {
        Self {
            code: RecoveryLogErrorCode::FsyncFailed,
            message: message.into(),
            details: None,
            source: Some(source),
        }
    }

    pub fn corruption(message: impl Into<String>) -> Self {
        Self {
            code: RecoveryLogErrorCode::Corruption,
            message: message.into(),
            details: None,
            source: None,
        }
    }

    pub fn corruption_at_offset(offset: u64, reason: impl Into<String>) -> Self {
        Self {
            code: RecoveryLogErrorCode::Corruption,
            message: reason.into(),
            details: Some(format!("byte_offset: {}", offset)),
            source: None,
        }
    }

    pub fn corruption_at_log_id(log_id: u64, reason: impl Into<String>) -> Self {
        Self {
            code: RecoveryLogErrorCode::Corruption,
            message: reason.into(),
            details: Some(format!("log_id: {}", log_id)),
            source: None,
        }
    }

    pub fn code(&self) -> RecoveryLogErrorCode {
        self.code
    }

    pub fn severity(&self) -> Severity {
        self.code.severity()
    }

    pub fn message(&self) -> &str {
        &self.message
    }

    pub fn details(&self) -> Option<&str> {
        self.details.as_deref()
    }

    pub fn is_fatal(&self) -> bool {
        self.severity() == Severity::Fatal
    }
}

impl fmt::Display for RecoveryLogError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}: {}", self.severity(), self.code, self.message)?;
        if let Some(ref details) = self.details {
            write!(f, " ({})", details)?;
        }
        if let Some(ref source) = self.source {
            write!(f, " (caused by: {})", source)?;
        }
        Ok(())
    }
}

impl std::error::Error for RecoveryLogError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        self.source
            .as_ref()
            .map(|e| e as &(dyn std::error::Error + 'static))
    }
}

pub type RecoveryLogResult<T> = Result<T, RecoveryLogError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_codes_and_severity() {
        let err = RecoveryLogError::append_failed("write", io::Error::new(io::ErrorKind::Other, "disk"));
        assert_eq!(err.code().code(), "FRAG_LOG_APPEND_FAILED");
        assert!(!err.is_fatal());

        let err = RecoveryLogError::corruption("bad crc");
        assert!(err.is_fatal());
    }

    #[test]
    fn test_display_carries_context() {
        let err = RecoveryLogError::corruption_at_offset(42, "checksum mismatch");
        let text = err.to_string();
        assert!(text.starts_with("[FATAL] FRAG_LOG_CORRUPTION"));
        assert!(text.contains("byte_offset: 42"));
        assert_eq!(err.details(), Some("byte_offset: 42"));
    }

    #[test]
    fn test_source_chain() {
        use std::error::Error;
        let err = RecoveryLogError::fsync_failed("sync", io::Error::new(io::ErrorKind::Other, "eio"));
        assert!(err.source().is_some());
        assert!(err.to_string().contains("caused by: eio"));
    }
}
