//! Tests for state module

use super::*;
use crate::checkpoint::CheckpointState;
use crate::config::PartitioningConfig;
use crate::error::Error;
use crate::query::AnsiQueryGenerator;
use crate::stream::{Field, Stream};
use crate::types::FieldType;
use pretty_assertions::assert_eq;
use serde_json::json;
use std::sync::Arc;

fn key() -> Vec<Field> {
    vec![Field::new("id", FieldType::Integer)]
}

fn at(id: i64) -> CheckpointState {
    CheckpointState::snapshot(&key(), vec![json!(id)])
}

fn stream_state() -> StreamState {
    let shared = Arc::new(SharedState::new(
        PartitioningConfig::default(),
        Arc::new(AnsiQueryGenerator::new()),
    ));
    StreamState::new(Stream::new("users", None, key()), shared)
}

// ============================================================================
// StreamState Tests
// ============================================================================

#[test]
fn test_cursor_upper_bound_write_once() {
    let state = stream_state();
    assert_eq!(state.cursor_upper_bound(), None);

    state.set_cursor_upper_bound(json!("2024-01-01")).unwrap();
    assert_eq!(state.cursor_upper_bound(), Some(&json!("2024-01-01")));

    let err = state.set_cursor_upper_bound(json!("2025-01-01")).unwrap_err();
    assert!(matches!(err, Error::State { .. }));
    assert_eq!(state.cursor_upper_bound(), Some(&json!("2024-01-01")));
}

#[test]
fn test_fetch_size_write_once() {
    let state = stream_state();
    assert_eq!(state.fetch_size(), None);
    state.set_fetch_size(500).unwrap();
    assert!(state.set_fetch_size(600).is_err());
    assert_eq!(state.fetch_size(), Some(500));
}

#[test]
fn test_shared_state_default_estimators() {
    let state = stream_state();
    let row = json!({ "id": 1 }).as_object().cloned().unwrap();
    assert_eq!(state.shared().row_byte_size_estimator.estimate(&row), 35);
}

// ============================================================================
// CheckpointTracker Tests
// ============================================================================

#[test]
fn test_tracker_nothing_reported() {
    let tracker = CheckpointTracker::new(3);
    assert_eq!(tracker.stream_checkpoint(), None);
    assert!(!tracker.is_complete());
}

#[test]
fn test_tracker_in_order_completion() {
    let mut tracker = CheckpointTracker::new(3);
    tracker.report_complete(0, at(10)).unwrap();
    assert_eq!(tracker.stream_checkpoint(), Some(at(10)));
    tracker.report_complete(1, at(20)).unwrap();
    tracker.report_complete(2, CheckpointState::SnapshotCompleted).unwrap();
    assert_eq!(
        tracker.stream_checkpoint(),
        Some(CheckpointState::SnapshotCompleted)
    );
    assert!(tracker.is_complete());
}

#[test]
fn test_tracker_out_of_order_completion_waits_for_prefix() {
    let mut tracker = CheckpointTracker::new(3);
    tracker.report_complete(2, CheckpointState::SnapshotCompleted).unwrap();
    tracker.report_complete(1, at(20)).unwrap();
    assert_eq!(tracker.stream_checkpoint(), None);

    tracker.report_progress(0, at(4)).unwrap();
    assert_eq!(tracker.stream_checkpoint(), Some(at(4)));

    tracker.report_complete(0, at(10)).unwrap();
    assert_eq!(
        tracker.stream_checkpoint(),
        Some(CheckpointState::SnapshotCompleted)
    );
}

#[test]
fn test_tracker_extends_prefix_with_progress() {
    let mut tracker = CheckpointTracker::new(3);
    tracker.report_complete(0, at(10)).unwrap();
    tracker.report_progress(1, at(15)).unwrap();
    tracker.report_complete(2, CheckpointState::SnapshotCompleted).unwrap();
    assert_eq!(tracker.stream_checkpoint(), Some(at(15)));
}

#[test]
fn test_tracker_failure_holds_checkpoint() {
    let mut tracker = CheckpointTracker::new(3);
    tracker.report_complete(0, at(10)).unwrap();
    tracker.report_progress(1, at(12)).unwrap();
    tracker.report_failed(1).unwrap();
    tracker.report_complete(2, CheckpointState::SnapshotCompleted).unwrap();

    assert_eq!(tracker.stream_checkpoint(), Some(at(12)));
    assert!(tracker.has_failures());
    assert!(!tracker.is_complete());
}

#[test]
fn test_tracker_failure_without_progress() {
    let mut tracker = CheckpointTracker::new(2);
    tracker.report_complete(0, at(10)).unwrap();
    tracker.report_failed(1).unwrap();
    assert_eq!(tracker.stream_checkpoint(), Some(at(10)));
}

#[test]
fn test_tracker_rejects_bad_reports() {
    let mut tracker = CheckpointTracker::new(1);
    assert!(tracker.report_progress(5, at(1)).is_err());
    tracker.report_complete(0, at(1)).unwrap();
    assert!(tracker.report_complete(0, at(2)).is_err());
    assert!(tracker.report_progress(0, at(3)).is_err());
}

// ============================================================================
// StateManager Tests
// ============================================================================

#[tokio::test]
async fn test_state_manager_get_set() {
    let manager = StateManager::in_memory();
    assert!(manager.get("public.users").await.is_none());

    manager.set("public.users", at(7)).await;
    assert_eq!(manager.get("public.users").await, Some(at(7)));

    manager.clear_stream("public.users").await;
    assert!(manager.get("public.users").await.is_none());
}

#[tokio::test]
async fn test_state_manager_json_round_trip() {
    let manager = StateManager::in_memory();
    manager.set("public.users", at(7)).await;
    manager
        .set("public.orders", CheckpointState::SnapshotCompleted)
        .await;

    let json = manager.to_json().await.unwrap();
    let value: serde_json::Value = serde_json::from_str(&json).unwrap();
    assert_eq!(
        value,
        json!({
            "streams": {
                "public.orders": { "state_type": "snapshot_completed" },
                "public.users": {
                    "state_type": "primary_key",
                    "pk_name": ["id"],
                    "pk_val": [7]
                }
            }
        })
    );

    let restored = StateManager::from_json(&json).unwrap();
    assert_eq!(restored.snapshot().await, manager.snapshot().await);
}

#[tokio::test]
async fn test_state_manager_empty_json() {
    let manager = StateManager::from_json("{}").unwrap();
    assert_eq!(manager.snapshot().await, State::new());
    manager.clear().await;
    assert_eq!(manager.to_json().await.unwrap(), r#"{"streams":{}}"#);
}

#[test]
fn test_state_manager_invalid_json() {
    let err = StateManager::from_json("not json").unwrap_err();
    assert!(matches!(err, Error::State { .. }));
}

#[tokio::test]
async fn test_state_manager_from_file() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("state.json");
    std::fs::write(
        &path,
        r#"{"streams":{"users":{"state_type":"snapshot_completed"}}}"#,
    )
    .unwrap();

    let manager = StateManager::from_file(&path).unwrap();
    assert_eq!(
        manager.get("users").await,
        Some(CheckpointState::SnapshotCompleted)
    );
    assert!(StateManager::from_file(dir.path().join("missing.json")).is_err());
}
