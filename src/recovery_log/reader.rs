//! Recovery log reader
//!
//! Reads a log front to back. Any damage fails the read outright: a bad
//! checksum, a truncated frame, an APPEND whose id is not exactly one past
//! the previous APPEND, or a STATUS record for an id never appended.
//! Nothing is skipped or repaired.

use std::fs::File;
use std::io::{self, BufReader, Read};
use std::path::Path;

use super::errors::{RecoveryLogError, RecoveryLogResult};
use super::record::{LogRecord, FRAME_OVERHEAD};
use crate::node::NodeId;

pub(crate) struct LogReader {
    pool: NodeId,
    reader: BufReader<File>,
    offset: u64,
    file_size: u64,
    last_append: u64,
}

impl LogReader {
    /// Opens the log at `path`, or returns `None` when it does not exist.
    pub fn open(path: &Path, pool: NodeId) -> RecoveryLogResult<Option<Self>> {
        let file = match File::open(path) {
            Ok(file) => file,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(RecoveryLogError::corruption(format!(
                    "failed to open recovery log {}: {}",
                    path.display(),
                    e
                )))
            }
        };
        let file_size = file
            .metadata()
            .map_err(|e| RecoveryLogError::corruption(format!("failed to stat recovery log: {}", e)))?
            .len();

        Ok(Some(Self {
            pool,
            reader: BufReader::new(file),
            offset: 0,
            file_size,
            last_append: 0,
        }))
    }

    /// Highest entry id read so far.
    pub fn last_log_id(&self) -> u64 {
        self.last_append
    }

    /// Next record, `Ok(None)` at a clean end of file.
    pub fn read_next(&mut self) -> RecoveryLogResult<Option<LogRecord>> {
        if self.offset >= self.file_size {
            return Ok(None);
        }
        let remaining = self.file_size - self.offset;
        let min = (FRAME_OVERHEAD + 1) as u64;
        if remaining < min {
            return Err(RecoveryLogError::corruption_at_offset(
                self.offset,
                format!("truncated record: {} bytes remaining", remaining),
            ));
        }

        let mut len_buf = [0u8; 4];
        self.reader.read_exact(&mut len_buf).map_err(|e| {
            RecoveryLogError::corruption_at_offset(self.offset, format!("failed to read length: {}", e))
        })?;
        let frame_len = u32::from_le_bytes(len_buf) as u64;
        if frame_len < min || frame_len > remaining {
            return Err(RecoveryLogError::corruption_at_offset(
                self.offset,
                format!("invalid record length {} ({} bytes remaining)", frame_len, remaining),
            ));
        }

        let mut frame = vec![0u8; frame_len as usize];
        frame[..4].copy_from_slice(&len_buf);
        self.reader.read_exact(&mut frame[4..]).map_err(|e| {
            RecoveryLogError::corruption_at_offset(self.offset, format!("failed to read record: {}", e))
        })?;

        let record = LogRecord::deserialize(&frame, self.pool)
            .map_err(|e| RecoveryLogError::corruption_at_offset(self.offset, e.to_string()))?;

        match &record {
            LogRecord::Append(entry) if entry.log_id != self.last_append + 1 => {
                return Err(RecoveryLogError::corruption_at_log_id(
                    entry.log_id,
                    format!(
                        "non-sequential log id: expected {}, got {}",
                        self.last_append + 1,
                        entry.log_id
                    ),
                ));
            }
            LogRecord::Append(entry) => self.last_append = entry.log_id,
            LogRecord::Status { log_id, .. } if *log_id == 0 || *log_id > self.last_append => {
                return Err(RecoveryLogError::corruption_at_log_id(
                    *log_id,
                    "status change for an entry that was never appended",
                ));
            }
            LogRecord::Status { .. } => {}
        }

        self.offset += frame_len;
        Ok(Some(record))
    }

    /// Reads every remaining record.
    pub fn read_all(&mut self) -> RecoveryLogResult<Vec<LogRecord>> {
        let mut records = Vec::new();
        while let Some(record) = self.read_next()? {
            records.push(record);
        }
        Ok(records)
    }
}
