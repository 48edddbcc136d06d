//! Recovery log durability
//!
//! - appended entries and status changes survive reopen
//! - entry ids keep increasing across restarts
//! - any damage to a log file fails the open instead of being skipped

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::Path;
use std::sync::Arc;

use tempfile::TempDir;

use fragdb::cluster::{BootError, Cluster};
use fragdb::config::ClusterConfig;
use fragdb::model::{Record, RecordImage};
use fragdb::node::{NodeId, NodeRegistry};
use fragdb::observability::MetricsRegistry;
use fragdb::recovery_log::{RecoveryLog, RecoveryLogErrorCode, ReplicationStatus};

// =============================================================================
// Helpers
// =============================================================================

fn open_log(dir: &Path) -> Result<RecoveryLog, fragdb::recovery_log::RecoveryLogError> {
    RecoveryLog::open(
        dir,
        Arc::new(NodeRegistry::new(4)),
        Arc::new(MetricsRegistry::new()),
    )
}

fn update(before: &str, after: &str) -> RecordImage {
    RecordImage::Update {
        before: Some(Record::titled(before)),
        after: Record::titled(after),
    }
}

fn write_two_entries(dir: &Path) {
    let log = open_log(dir).expect("log opens");
    log.log_operation(NodeId::Node2, 2, &update("a", "b")).unwrap();
    log.log_operation(NodeId::Node2, 4, &update("c", "d")).unwrap();
}

// =============================================================================
// Persistence
// =============================================================================

#[test]
fn test_entries_and_images_survive_reopen() {
    let temp = TempDir::new().expect("tempdir");
    write_two_entries(temp.path());

    let log = open_log(temp.path()).expect("log reopens");
    let entries = log.entries(NodeId::Node2);
    assert_eq!(entries.len(), 2);
    assert_eq!(entries[0].key, 2);
    assert_eq!(entries[0].before().and_then(|r| r.primary_title.as_deref()), Some("a"));
    assert_eq!(entries[1].after().and_then(|r| r.primary_title.as_deref()), Some("d"));
    assert!(entries.iter().all(|e| e.replication_status == ReplicationStatus::Pending));
    assert!(log.entries(NodeId::Node1).is_empty());
}

#[test]
fn test_status_changes_survive_reopen() {
    let temp = TempDir::new().expect("tempdir");
    write_two_entries(temp.path());
    {
        let log = open_log(temp.path()).unwrap();
        log.update_replication_status(NodeId::Node2, 1, ReplicationStatus::Done)
            .unwrap();
    }

    let log = open_log(temp.path()).unwrap();
    assert_eq!(
        log.entry(NodeId::Node2, 1).unwrap().replication_status,
        ReplicationStatus::Done
    );
    assert_eq!(log.checkpoint(NodeId::Node2), 1);
    assert_eq!(log.get_pending_logs(NodeId::Node2).len(), 1);
}

#[test]
fn test_ids_continue_after_restart() {
    let temp = TempDir::new().expect("tempdir");
    write_two_entries(temp.path());

    let log = open_log(temp.path()).unwrap();
    let id = log
        .log_operation(NodeId::Node2, 6, &update("e", "f"))
        .unwrap();
    assert_eq!(id, 3);
}

// =============================================================================
// Damage
// =============================================================================

#[test]
fn test_flipped_byte_fails_open() {
    let temp = TempDir::new().expect("tempdir");
    write_two_entries(temp.path());

    let path = RecoveryLog::path_for(temp.path(), NodeId::Node2);
    let mut bytes = fs::read(&path).unwrap();
    let last = bytes.len() - 3;
    bytes[last] ^= 0xFF;
    fs::write(&path, bytes).unwrap();

    let err = open_log(temp.path()).err().expect("corrupt log must not open");
    assert_eq!(err.code(), RecoveryLogErrorCode::Corruption);
    assert!(err.is_fatal());
}

#[test]
fn test_truncated_tail_fails_open() {
    let temp = TempDir::new().expect("tempdir");
    write_two_entries(temp.path());

    let path = RecoveryLog::path_for(temp.path(), NodeId::Node2);
    let len = fs::metadata(&path).unwrap().len();
    let file = OpenOptions::new().write(true).open(&path).unwrap();
    file.set_len(len - 5).unwrap();

    let err = open_log(temp.path()).err().expect("truncated log must not open");
    assert_eq!(err.code(), RecoveryLogErrorCode::Corruption);
}

#[test]
fn test_trailing_garbage_fails_open() {
    let temp = TempDir::new().expect("tempdir");
    write_two_entries(temp.path());

    let path = RecoveryLog::path_for(temp.path(), NodeId::Node2);
    let mut file = OpenOptions::new().append(true).open(&path).unwrap();
    file.write_all(&[0xAB; 64]).unwrap();

    assert!(open_log(temp.path()).is_err());
}

#[test]
fn test_cluster_refuses_to_boot_on_corrupt_log() {
    let temp = TempDir::new().expect("tempdir");
    write_two_entries(temp.path());

    let path = RecoveryLog::path_for(temp.path(), NodeId::Node2);
    fs::write(&path, b"not a recovery log at all").unwrap();

    let err = Cluster::open(ClusterConfig::for_data_dir(temp.path()))
        .err()
        .expect("boot must fail");
    assert!(matches!(err, BootError::RecoveryLog(_)));
}
