//! On-disk framing of recovery log records
//!
//! Every record is framed as:
//! - Record Length (u32 LE), the whole frame including this field
//! - Kind (u8): APPEND or STATUS
//! - Log Id (u64 LE)
//! - Payload (variable)
//! - Checksum (u32 LE) over everything before it
//!
//! APPEND payload:
//! - key (i64 LE)
//! - op type (u8), must agree with the encoded image
//! - local status (u8)
//! - replication status (u8)
//! - created at, unix millis (i64 LE)
//! - image length (u32 LE) + encoded image
//!
//! STATUS payload:
//! - replication status (u8)

use std::io::{self, Cursor, Read};

use chrono::{DateTime, TimeZone, Utc};

use super::checksum::{compute_checksum, verify_checksum};
use super::entry::{LocalStatus, RecoveryLogEntry, ReplicationStatus};
use crate::model::{OpType, RecordImage};
use crate::node::NodeId;

/// Frame overhead: length + kind + log id + checksum.
pub(crate) const FRAME_OVERHEAD: usize = 4 + 1 + 8 + 4;

const KIND_APPEND: u8 = 0;
const KIND_STATUS: u8 = 1;

#[derive(Debug, Clone, PartialEq, Eq)]
pub(crate) enum LogRecord {
    /// A new entry
    Append(RecoveryLogEntry),
    /// A replication-status transition of an existing entry
    Status {
        log_id: u64,
        status: ReplicationStatus,
    },
}

fn invalid(msg: impl Into<String>) -> io::Error {
    io::Error::new(io::ErrorKind::InvalidData, msg.into())
}

impl LogRecord {
    pub fn log_id(&self) -> u64 {
        match self {
            LogRecord::Append(entry) => entry.log_id,
            LogRecord::Status { log_id, .. } => *log_id,
        }
    }

    /// Serializes the framed record.
    pub fn serialize(&self) -> io::Result<Vec<u8>> {
        let mut body = Vec::with_capacity(64);
        match self {
            LogRecord::Append(entry) => {
                let image = entry.image.encode().map_err(|e| invalid(e.to_string()))?;
                body.push(KIND_APPEND);
                body.extend_from_slice(&entry.log_id.to_le_bytes());
                body.extend_from_slice(&entry.key.to_le_bytes());
                body.push(entry.op_type().as_u8());
                body.push(entry.local_status.as_u8());
                body.push(entry.replication_status.as_u8());
                body.extend_from_slice(&entry.created_at.timestamp_millis().to_le_bytes());
                body.extend_from_slice(&(image.len() as u32).to_le_bytes());
                body.extend_from_slice(&image);
            }
            LogRecord::Status { log_id, status } => {
                body.push(KIND_STATUS);
                body.extend_from_slice(&log_id.to_le_bytes());
                body.push(status.as_u8());
            }
        }

        let frame_len = (4 + body.len() + 4) as u32;
        let mut frame = Vec::with_capacity(frame_len as usize);
        frame.extend_from_slice(&frame_len.to_le_bytes());
        frame.extend_from_slice(&body);
        let checksum = compute_checksum(&frame);
        frame.extend_from_slice(&checksum.to_le_bytes());
        Ok(frame)
    }

    /// Parses one complete frame, verifying its checksum. `pool` is the
    /// log the frame was read from; it is not stored on disk.
    pub fn deserialize(frame: &[u8], pool: NodeId) -> io::Result<Self> {
        if frame.len() < FRAME_OVERHEAD + 1 {
            return Err(io::Error::new(io::ErrorKind::UnexpectedEof, "record too short"));
        }
        let declared = u32::from_le_bytes([frame[0], frame[1], frame[2], frame[3]]) as usize;
        if declared != frame.len() {
            return Err(invalid(format!(
                "length mismatch: header says {}, frame is {}",
                declared,
                frame.len()
            )));
        }

        let checksum_at = frame.len() - 4;
        let stored = u32::from_le_bytes([
            frame[checksum_at],
            frame[checksum_at + 1],
            frame[checksum_at + 2],
            frame[checksum_at + 3],
        ]);
        if !verify_checksum(&frame[..checksum_at], stored) {
            return Err(invalid(format!(
                "checksum mismatch: stored {:08x}, computed {:08x}",
                stored,
                compute_checksum(&frame[..checksum_at])
            )));
        }

        let mut cursor = Cursor::new(&frame[4..checksum_at]);
        let kind = read_u8(&mut cursor)?;
        let log_id = read_u64(&mut cursor)?;

        let record = match kind {
            KIND_APPEND => {
                let key = read_u64(&mut cursor)? as i64;
                let op = OpType::from_u8(read_u8(&mut cursor)?)
                    .ok_or_else(|| invalid("invalid op type"))?;
                let local_status = LocalStatus::from_u8(read_u8(&mut cursor)?)
                    .ok_or_else(|| invalid("invalid local status"))?;
                let replication_status = ReplicationStatus::from_u8(read_u8(&mut cursor)?)
                    .ok_or_else(|| invalid("invalid replication status"))?;
                let millis = read_u64(&mut cursor)? as i64;
                let created_at: DateTime<Utc> = Utc
                    .timestamp_millis_opt(millis)
                    .single()
                    .ok_or_else(|| invalid("invalid timestamp"))?;
                let image_len = read_u32(&mut cursor)? as usize;
                let mut image_bytes = vec![0u8; image_len];
                cursor.read_exact(&mut image_bytes)?;
                let image =
                    RecordImage::decode(&image_bytes).map_err(|e| invalid(e.to_string()))?;
                if image.op_type() != op {
                    return Err(invalid("op type disagrees with image"));
                }
                LogRecord::Append(RecoveryLogEntry {
                    log_id,
                    pool,
                    key,
                    image,
                    local_status,
                    replication_status,
                    created_at,
                })
            }
            KIND_STATUS => {
                let status = ReplicationStatus::from_u8(read_u8(&mut cursor)?)
                    .ok_or_else(|| invalid("invalid replication status"))?;
                LogRecord::Status { log_id, status }
            }
            other => return Err(invalid(format!("invalid record kind: {}", other))),
        };

        if cursor.position() as usize != cursor.get_ref().len() {
            return Err(invalid("trailing bytes in record payload"));
        }
        Ok(record)
    }
}

fn read_u8(cursor: &mut Cursor<&[u8]>) -> io::Result<u8> {
    let mut buf = [0u8; 1];
    cursor.read_exact(&mut buf)?;
    Ok(buf[0])
}

fn read_u32(cursor: &mut Cursor<&[u8]>) -> io::Result<u32> {
    let mut buf = [0u8; 4];
    cursor.read_exact(&mut buf)?;
    Ok(u32::from_le_bytes(buf))
}

fn read_u64(cursor: &mut Cursor<&[u8]>) -> io::Result<u64> {
    let mut buf = [0u8; 8];
    cursor.read_exact(&mut buf)?;
    Ok(u64::from_le_bytes(buf))
}
