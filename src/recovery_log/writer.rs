//! Append-only recovery log writer
//!
//! Every append is followed by fsync. An entry is acknowledged (its log id
//! handed back) only after its frame is durable. Status transitions are
//! appended as their own records; nothing is rewritten in place.

use std::fs::{self, File, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use super::errors::{RecoveryLogError, RecoveryLogResult};
use super::record::LogRecord;

pub(crate) struct LogWriter {
    path: PathBuf,
    file: File,
    /// Next entry id to assign. Starts at 1 and is never reused.
    next_log_id: u64,
}

impl LogWriter {
    /// Opens (creating if needed) the log at `path`. The caller supplies
    /// the next id, found by replaying the existing file.
    pub fn open(path: &Path, next_log_id: u64) -> RecoveryLogResult<Self> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).map_err(|e| {
                RecoveryLogError::append_failed(
                    format!("failed to create recovery log directory: {}", dir.display()),
                    e,
                )
            })?;
        }

        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .map_err(|e| {
                RecoveryLogError::append_failed(
                    format!("failed to open recovery log: {}", path.display()),
                    e,
                )
            })?;

        Ok(Self {
            path: path.to_path_buf(),
            file,
            next_log_id,
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub fn next_log_id(&self) -> u64 {
        self.next_log_id
    }

    /// Writes one framed record and fsyncs it.
    pub fn write(&mut self, record: &LogRecord) -> RecoveryLogResult<()> {
        let frame = record.serialize().map_err(|e| {
            RecoveryLogError::rejected("failed to encode recovery log record", e.to_string())
        })?;

        self.file.write_all(&frame).map_err(|e| {
            RecoveryLogError::append_failed(
                format!("failed to write log record {}", record.log_id()),
                e,
            )
        })?;

        self.file.sync_all().map_err(|e| {
            RecoveryLogError::fsync_failed(
                format!("fsync failed after log record {}", record.log_id()),
                e,
            )
        })?;

        if let LogRecord::Append(entry) = record {
            self.next_log_id = self.next_log_id.max(entry.log_id + 1);
        }
        Ok(())
    }
}
