//! Isolation level behavior
//!
//! What a transaction on one node observes while another transaction on
//! the same node writes, at each of the four levels.

use std::sync::Arc;
use std::time::Duration;

use fragdb::engine::EngineError;
use fragdb::errors::FragError;
use fragdb::model::Record;
use fragdb::node::{NodeId, NodeRegistry};
use fragdb::observability::MetricsRegistry;
use fragdb::transaction::{IsolationLevel, TransactionContext};

fn context() -> TransactionContext {
    TransactionContext::new(
        Arc::new(NodeRegistry::new(8)),
        Duration::from_millis(200),
        Arc::new(MetricsRegistry::new()),
    )
}

async fn seed(ctx: &TransactionContext, key: i64, title: &str) {
    let mut tx = ctx.begin(NodeId::Node1, IsolationLevel::ReadCommitted).await.unwrap();
    tx.upsert(key, &Record::titled(title)).await.unwrap();
    tx.commit().await.unwrap();
}

fn title(record: Option<Record>) -> Option<String> {
    record.and_then(|r| r.primary_title)
}

#[tokio::test]
async fn test_read_uncommitted_sees_dirty_write() {
    let ctx = context();
    seed(&ctx, 1, "old").await;

    let mut writer = ctx.begin(NodeId::Node1, IsolationLevel::ReadCommitted).await.unwrap();
    writer.write(1, &Record::titled("dirty")).await.unwrap();

    let mut reader = ctx.begin(NodeId::Node1, IsolationLevel::ReadUncommitted).await.unwrap();
    assert_eq!(title(reader.read(1).await.unwrap()).as_deref(), Some("dirty"));

    writer.rollback().await;
    assert_eq!(title(reader.read(1).await.unwrap()).as_deref(), Some("old"));
}

#[tokio::test]
async fn test_read_committed_sees_new_commits() {
    let ctx = context();
    seed(&ctx, 1, "old").await;

    let mut reader = ctx.begin(NodeId::Node1, IsolationLevel::ReadCommitted).await.unwrap();
    assert_eq!(title(reader.read(1).await.unwrap()).as_deref(), Some("old"));

    let mut writer = ctx.begin(NodeId::Node1, IsolationLevel::ReadCommitted).await.unwrap();
    writer.write(1, &Record::titled("new")).await.unwrap();
    assert_eq!(title(reader.read(1).await.unwrap()).as_deref(), Some("old"));
    writer.commit().await.unwrap();

    assert_eq!(title(reader.read(1).await.unwrap()).as_deref(), Some("new"));
    reader.commit().await.unwrap();
}

#[tokio::test]
async fn test_repeatable_read_keeps_its_snapshot() {
    let ctx = context();
    seed(&ctx, 1, "old").await;

    let mut reader = ctx.begin(NodeId::Node1, IsolationLevel::RepeatableRead).await.unwrap();
    assert_eq!(title(reader.read(1).await.unwrap()).as_deref(), Some("old"));
    seed(&ctx, 1, "new").await;
    seed(&ctx, 2, "inserted").await;

    assert_eq!(title(reader.read(1).await.unwrap()).as_deref(), Some("old"));
    assert_eq!(reader.read(2).await.unwrap(), None);
    reader.commit().await.unwrap();
}

#[tokio::test]
async fn test_serializable_rejects_stale_read() {
    let ctx = context();
    seed(&ctx, 1, "old").await;

    let mut tx = ctx.begin(NodeId::Node1, IsolationLevel::Serializable).await.unwrap();
    tx.read(1).await.unwrap();
    seed(&ctx, 1, "concurrent").await;
    tx.upsert(3, &Record::titled("derived")).await.unwrap();

    let err = tx.commit().await.unwrap_err();
    assert!(matches!(
        err,
        FragError::Engine(EngineError::SerializationFailure { key: 1 })
    ));

    let mut check = ctx.begin(NodeId::Node1, IsolationLevel::ReadCommitted).await.unwrap();
    assert_eq!(check.read(3).await.unwrap(), None);
}

#[tokio::test]
async fn test_second_writer_gets_write_conflict() {
    let ctx = context();
    seed(&ctx, 1, "old").await;

    let mut first = ctx.begin(NodeId::Node1, IsolationLevel::ReadCommitted).await.unwrap();
    first.write(1, &Record::titled("a")).await.unwrap();

    let mut second = ctx.begin(NodeId::Node1, IsolationLevel::ReadCommitted).await.unwrap();
    let err = second.write(1, &Record::titled("b")).await.unwrap_err();
    assert!(matches!(err, FragError::Engine(EngineError::WriteConflict { key: 1, .. })));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_round_trip_preserves_fields() {
    let ctx = context();
    let record = Record {
        title_type: Some("short".to_string()),
        primary_title: Some("Carmencita".to_string()),
        original_title: None,
        is_adult: true,
        start_year: Some(1894),
        end_year: None,
        runtime_minutes: Some(1),
        genres: Some("Documentary,Short".to_string()),
    };

    let mut tx = ctx.begin(NodeId::Node3, IsolationLevel::Serializable).await.unwrap();
    tx.insert(7, &record).await.unwrap();
    tx.commit().await.unwrap();

    let mut tx = ctx.begin(NodeId::Node3, IsolationLevel::RepeatableRead).await.unwrap();
    assert_eq!(tx.read(7).await.unwrap(), Some(record));
}

#[tokio::test]
async fn test_begin_on_revoked_node_is_unreachable() {
    let ctx = context();
    ctx.registry().revoke_access(NodeId::Node2);
    let err = ctx
        .begin(NodeId::Node2, IsolationLevel::ReadCommitted)
        .await
        .unwrap_err();
    assert_eq!(err.code(), "FRAG_NODE_UNREACHABLE");
}
