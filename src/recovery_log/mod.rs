//! Durable recovery log
//!
//! Every write whose replication could not be confirmed is recorded here,
//! on the node where it originated, and replayed later by
//! `resolve_pending_logs`. See `log` for the checkpoint rule.
//!
//! # On-disk format
//!
//! One append-only file per node. Records are length-prefixed, carry a
//! CRC32, and are fsynced before the operation that produced them is
//! acknowledged. Status changes are appended as separate records. A
//! damaged file fails `open`; nothing is skipped.

mod checksum;
mod entry;
mod errors;
mod log;
mod reader;
mod record;
mod writer;

pub use entry::{LocalStatus, RecoveryLogEntry, ReplicationStatus};
pub use errors::{RecoveryLogError, RecoveryLogErrorCode, RecoveryLogResult, Severity};
pub use log::{RecoveryLog, ResolveFailure, ResolveReport};
