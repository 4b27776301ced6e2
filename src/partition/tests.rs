//! Tests for partition module

use super::*;
use crate::checkpoint::CheckpointState;
use crate::config::PartitioningConfig;
use crate::query::{AnsiQueryGenerator, FromNode, SelectNode, WhereClauseNode};
use crate::state::{SharedState, StreamState};
use crate::stream::{Field, Stream};
use crate::types::{FieldType, JsonObject, JsonValue, ReplicationMethod, SyncMode};
use pretty_assertions::assert_eq;
use proptest::prelude::*;
use serde_json::json;
use std::cmp::Ordering;
use std::sync::Arc;

// ============================================================================
// Helpers
// ============================================================================

fn a() -> Field {
    Field::new("a", FieldType::Integer)
}

fn b() -> Field {
    Field::new("b", FieldType::Integer)
}

fn events() -> Stream {
    Stream::new(
        "events",
        Some("main".to_string()),
        vec![
            a(),
            b(),
            Field::new("payload", FieldType::String),
            Field::new("ts", FieldType::Integer),
        ],
    )
}

fn state_for(stream: Stream) -> Arc<StreamState> {
    let shared = Arc::new(SharedState::new(
        PartitioningConfig::default(),
        Arc::new(AnsiQueryGenerator::new()),
    ));
    Arc::new(StreamState::new(stream, shared))
}

fn full_refresh() -> Arc<StreamState> {
    state_for(events().with_primary_key(&["a", "b"]))
}

fn with_cursor() -> Arc<StreamState> {
    state_for(events().with_primary_key(&["a", "b"]).with_cursor("ts"))
}

fn row(values: JsonValue) -> JsonObject {
    values.as_object().cloned().unwrap_or_default()
}

/// Evaluate a where tree against a row of integer columns
fn eval(node: &WhereClauseNode, row: &JsonObject) -> bool {
    let cmp = |f: &Field, v: &JsonValue| {
        row.get(&f.id)
            .and_then(JsonValue::as_i64)
            .cmp(&v.as_i64())
    };
    match node {
        WhereClauseNode::And(children) => children.iter().all(|c| eval(c, row)),
        WhereClauseNode::Or(children) => children.iter().any(|c| eval(c, row)),
        WhereClauseNode::Equal(f, v) => cmp(f, v) == Ordering::Equal,
        WhereClauseNode::Greater(f, v) => cmp(f, v) == Ordering::Greater,
        WhereClauseNode::GreaterOrEqual(f, v) => cmp(f, v) != Ordering::Less,
        WhereClauseNode::Lesser(f, v) => cmp(f, v) == Ordering::Less,
        WhereClauseNode::LesserOrEqual(f, v) => cmp(f, v) != Ordering::Greater,
    }
}

fn matches(predicate: Option<&WhereClauseNode>, row: &JsonObject) -> bool {
    predicate.map_or(true, |p| eval(p, row))
}

fn grid() -> Vec<JsonObject> {
    let mut rows = Vec::new();
    for x in 0..6 {
        for y in 0..6 {
            rows.push(row(json!({ "a": x, "b": y })));
        }
    }
    rows
}

// ============================================================================
// Predicate Tests
// ============================================================================

#[test]
fn test_no_columns_no_predicate() {
    assert_eq!(bound_predicate(&[], Some(&[json!(1)]), None, false), None);
}

#[test]
fn test_unbounded_no_predicate() {
    assert_eq!(bound_predicate(&[a(), b()], None, None, false), None);
}

#[test]
fn test_single_column_collapses() {
    assert_eq!(
        bound_predicate(&[a()], Some(&[json!(3)]), None, false),
        Some(WhereClauseNode::Greater(a(), json!(3)))
    );
    assert_eq!(
        bound_predicate(&[a()], None, Some(&[json!(7)]), false),
        Some(WhereClauseNode::LesserOrEqual(a(), json!(7)))
    );
    assert_eq!(
        bound_predicate(&[a()], Some(&[json!(3)]), None, true),
        Some(WhereClauseNode::GreaterOrEqual(a(), json!(3)))
    );
}

#[test]
fn test_composite_lower_bound_shape() {
    let predicate = bound_predicate(&[a(), b()], Some(&[json!(1), json!(2)]), None, false);
    assert_eq!(
        predicate,
        Some(WhereClauseNode::Or(vec![
            WhereClauseNode::Greater(a(), json!(1)),
            WhereClauseNode::And(vec![
                WhereClauseNode::Equal(a(), json!(1)),
                WhereClauseNode::Greater(b(), json!(2)),
            ]),
        ]))
    );
}

#[test]
fn test_composite_upper_bound_shape() {
    let predicate = bound_predicate(&[a(), b()], None, Some(&[json!(4), json!(0)]), false);
    assert_eq!(
        predicate,
        Some(WhereClauseNode::Or(vec![
            WhereClauseNode::Lesser(a(), json!(4)),
            WhereClauseNode::And(vec![
                WhereClauseNode::Equal(a(), json!(4)),
                WhereClauseNode::LesserOrEqual(b(), json!(0)),
            ]),
        ]))
    );
}

#[test]
fn test_short_bound_constrains_leading_columns() {
    let predicate = bound_predicate(&[a(), b()], Some(&[json!(2)]), None, false);
    assert_eq!(predicate, Some(WhereClauseNode::Greater(a(), json!(2))));
}

#[test]
fn test_ties_on_leading_column() {
    let predicate =
        bound_predicate(&[a(), b()], Some(&[json!(1), json!(5)]), Some(&[json!(2), json!(1)]), false);
    let selected: Vec<(i64, i64)> = grid()
        .iter()
        .filter(|r| matches(predicate.as_ref(), r))
        .map(|r| (r["a"].as_i64().unwrap(), r["b"].as_i64().unwrap()))
        .collect();
    assert_eq!(selected, vec![(2, 0), (2, 1)]);
}

proptest! {
    #[test]
    fn prop_predicate_selects_lexicographic_range(
        lower in proptest::option::of((0i64..5, 0i64..5)),
        upper in proptest::option::of((0i64..5, 0i64..5)),
        inclusive in any::<bool>(),
        x in 0i64..5,
        y in 0i64..5,
    ) {
        let lower_tuple = lower.map(|(l1, l2)| vec![json!(l1), json!(l2)]);
        let upper_tuple = upper.map(|(u1, u2)| vec![json!(u1), json!(u2)]);
        let predicate = bound_predicate(
            &[a(), b()],
            lower_tuple.as_deref(),
            upper_tuple.as_deref(),
            inclusive,
        );

        let r = (x, y);
        let above = match lower {
            None => true,
            Some(l) if inclusive => r >= l,
            Some(l) => r > l,
        };
        let below = upper.map_or(true, |u| r <= u);

        let candidate = row(json!({ "a": x, "b": y }));
        prop_assert_eq!(matches(predicate.as_ref(), &candidate), above && below);
    }
}

// ============================================================================
// Split Tests
// ============================================================================

#[test]
fn test_split_ranges_are_adjacent_and_cover() {
    let factory = PartitionFactory::new();
    let partition = factory.create(full_refresh(), None).unwrap().unwrap();
    let key = full_refresh().stream().primary_key.clone();
    let boundaries = vec![
        CheckpointState::snapshot(&key, vec![json!(1), json!(3)]),
        CheckpointState::snapshot(&key, vec![json!(3), json!(0)]),
        CheckpointState::snapshot(&key, vec![json!(4), json!(5)]),
    ];

    let parts = factory.split(partition, &boundaries);
    assert_eq!(parts.len(), 4);

    for r in grid() {
        let hits = parts
            .iter()
            .filter(|p| matches(p.key_range().unwrap().predicate().as_ref(), &r))
            .count();
        assert_eq!(hits, 1, "row {r:?} matched {hits} partitions");
    }
}

#[test]
fn test_split_pairs_bounds() {
    let factory = PartitionFactory::new();
    let partition = factory.create(full_refresh(), None).unwrap().unwrap();
    let key = full_refresh().stream().primary_key.clone();
    let boundaries = vec![CheckpointState::snapshot(&key, vec![json!(2), json!(2)])];

    let parts = factory.split(partition, &boundaries);
    assert_eq!(parts[0].lower_bound(), None);
    assert_eq!(parts[0].upper_bound(), Some(vec![json!(2), json!(2)]));
    assert_eq!(parts[1].lower_bound(), Some(vec![json!(2), json!(2)]));
    assert_eq!(parts[1].upper_bound(), None);
    assert!(parts.iter().all(|p| matches!(p, Partition::RfrSnapshot(_))));
}

#[test]
fn test_split_without_boundaries_is_identity() {
    let factory = PartitionFactory::new();
    let partition = factory.create(full_refresh(), None).unwrap().unwrap();
    let parts = factory.split(partition, &[]);
    assert_eq!(parts.len(), 1);
    assert_eq!(parts[0].lower_bound(), None);
}

#[test]
fn test_split_non_splittable_is_identity() {
    let factory = PartitionFactory::new();
    let partition = factory.create(state_for(events()), None).unwrap().unwrap();
    assert!(matches!(partition, Partition::NonResumableSnapshot(_)));
    let boundaries = vec![CheckpointState::SnapshotCompleted];
    assert_eq!(factory.split(partition, &boundaries).len(), 1);
}

#[test]
fn test_split_snapshot_with_cursor_carries_cursor_bound() {
    let factory = PartitionFactory::new();
    let state = with_cursor();
    state.set_cursor_upper_bound(json!(99)).unwrap();
    let partition = factory.create(Arc::clone(&state), None).unwrap().unwrap();
    assert!(matches!(partition, Partition::SnapshotWithCursor(_)));

    let key = state.stream().primary_key.clone();
    let cursor = state.stream().cursor.clone().unwrap();
    let boundaries = vec![CheckpointState::snapshot_with_cursor(
        &key,
        vec![json!(3), json!(3)],
        &cursor,
        state.stream(),
    )];
    let parts = factory.split(partition, &boundaries);
    assert_eq!(parts.len(), 2);
    for part in &parts {
        match part {
            Partition::SplittableSnapshotWithCursor(p) => {
                assert_eq!(p.explicit_cursor_upper_bound, Some(json!(99)));
            }
            other => panic!("Expected splittable snapshot with cursor, got {other:?}"),
        }
    }

    assert_eq!(
        parts[0].complete_state(),
        CheckpointState::snapshot_with_cursor(&key, vec![json!(3), json!(3)], &cursor, state.stream())
    );
    assert_eq!(
        parts[1].complete_state(),
        CheckpointState::cursor(&cursor, json!(99), state.stream())
    );
}

#[test]
fn test_split_cursor_incremental() {
    let factory = PartitionFactory::new();
    let state = with_cursor();
    state.set_cursor_upper_bound(json!(100)).unwrap();
    let cursor = state.stream().cursor.clone().unwrap();
    let partition = Partition::CursorIncremental(CursorIncremental {
        stream_state: Arc::clone(&state),
        cursor: cursor.clone(),
        cursor_lower_bound: json!(10),
        lower_bound_included: true,
        explicit_cursor_upper_bound: None,
    });

    let boundaries = vec![
        CheckpointState::cursor(&cursor, json!(40), state.stream()),
        CheckpointState::cursor(&cursor, json!(70), state.stream()),
    ];
    let parts = factory.split(partition, &boundaries);
    let shapes: Vec<(JsonValue, bool, JsonValue)> = parts
        .iter()
        .map(|p| match p {
            Partition::CursorIncremental(c) => (
                c.cursor_lower_bound.clone(),
                c.lower_bound_included,
                p.cursor_upper_bound(),
            ),
            other => panic!("Expected cursor incremental, got {other:?}"),
        })
        .collect();
    assert_eq!(
        shapes,
        vec![
            (json!(10), true, json!(40)),
            (json!(40), false, json!(70)),
            (json!(70), false, json!(100)),
        ]
    );
}

// ============================================================================
// Checkpoint Tests
// ============================================================================

#[test]
fn test_complete_states() {
    let factory = PartitionFactory::new();

    let plain = factory.create(state_for(events()), None).unwrap().unwrap();
    assert_eq!(plain.complete_state(), CheckpointState::SnapshotCompleted);
    assert_eq!(plain.incomplete_state(&row(json!({ "a": 1 }))), None);

    let rfr = factory.create(full_refresh(), None).unwrap().unwrap();
    assert_eq!(rfr.complete_state(), CheckpointState::SnapshotCompleted);

    let log = state_for(
        events()
            .with_primary_key(&["a", "b"])
            .with_sync_mode(SyncMode::Incremental)
            .with_replication_method(ReplicationMethod::LogReplication),
    );
    let initial = factory.create(Arc::clone(&log), None).unwrap().unwrap();
    assert!(matches!(initial, Partition::InitialSnapshot(_)));
    assert_eq!(
        initial.complete_state(),
        CheckpointState::initial_snapshot_completed(log.stream())
    );
}

#[test]
fn test_ranged_completion_uses_full_upper_tuple() {
    let state = full_refresh();
    let key = state.stream().primary_key.clone();
    let partition = Partition::RfrSnapshot(RfrSnapshot {
        stream_state: state,
        primary_key: key.clone(),
        lower_bound: None,
        upper_bound: Some(vec![json!(5), json!("z")]),
    });
    assert_eq!(
        partition.complete_state(),
        CheckpointState::snapshot(&key, vec![json!(5), json!("z")])
    );
}

#[test]
fn test_incomplete_state_missing_values_are_null() {
    let partition = PartitionFactory::new()
        .create(full_refresh(), None)
        .unwrap()
        .unwrap();
    let state = partition.incomplete_state(&row(json!({ "a": 7 }))).unwrap();
    assert_eq!(state.bound(), Some(vec![json!(7), JsonValue::Null]));
}

#[test]
fn test_cursor_partition_without_upper_bound_completes_at_null() {
    let state = state_for(events().with_cursor("ts"));
    let partition = PartitionFactory::new()
        .create(Arc::clone(&state), None)
        .unwrap()
        .unwrap();
    assert!(matches!(partition, Partition::NonResumableSnapshotWithCursor(_)));
    assert_eq!(partition.cursor_upper_bound(), JsonValue::Null);
}

// ============================================================================
// Factory Tests
// ============================================================================

#[test]
fn test_resume_round_trip() {
    let state = state_for(
        Stream::new(
            "events",
            Some("main".to_string()),
            vec![a(), Field::new("region", FieldType::String)],
        )
        .with_primary_key(&["a", "region"]),
    );
    let key = state.stream().primary_key.clone();
    let checkpoint = CheckpointState::snapshot(&key, vec![json!(42), json!("a")]);
    let json = serde_json::to_string(&checkpoint).unwrap();
    let restored: CheckpointState = serde_json::from_str(&json).unwrap();

    let partition = PartitionFactory::new()
        .create(state, Some(restored))
        .unwrap()
        .unwrap();

    assert!(partition.is_splittable());
    assert_eq!(partition.lower_bound(), Some(vec![json!(42), json!("a")]));
    assert!(!partition.lower_bound_included());
    assert_eq!(partition.upper_bound(), None);
    assert_eq!(
        partition.key_range().unwrap().predicate(),
        Some(WhereClauseNode::Or(vec![
            WhereClauseNode::Greater(key[0].clone(), json!(42)),
            WhereClauseNode::And(vec![
                WhereClauseNode::Equal(key[0].clone(), json!(42)),
                WhereClauseNode::Greater(key[1].clone(), json!("a")),
            ]),
        ]))
    );
}

#[test]
fn test_completed_snapshot_has_nothing_left() {
    let partition = PartitionFactory::new()
        .create(full_refresh(), Some(CheckpointState::SnapshotCompleted))
        .unwrap();
    assert!(partition.is_none());
}

#[test]
fn test_resume_cursor_checkpoint() {
    let state = with_cursor();
    let cursor = state.stream().cursor.clone().unwrap();
    let checkpoint = CheckpointState::cursor(&cursor, json!(50), state.stream());
    let partition = PartitionFactory::new()
        .create(state, Some(checkpoint))
        .unwrap()
        .unwrap();
    match &partition {
        Partition::CursorIncremental(p) => {
            assert_eq!(p.cursor_lower_bound, json!(50));
            assert!(!p.lower_bound_included);
        }
        other => panic!("Expected cursor incremental, got {other:?}"),
    }
}

#[test]
fn test_null_cursor_checkpoint_cold_starts() {
    let state = with_cursor();
    let cursor = state.stream().cursor.clone().unwrap();
    let checkpoint = CheckpointState::cursor(&cursor, JsonValue::Null, state.stream());
    let partition = PartitionFactory::new()
        .create(state, Some(checkpoint))
        .unwrap()
        .unwrap();
    match &partition {
        Partition::SnapshotWithCursor(p) => assert_eq!(p.lower_bound, None),
        other => panic!("Expected snapshot with cursor, got {other:?}"),
    }
}

#[test]
fn test_mismatched_checkpoint_is_discarded() {
    let state = full_refresh();
    let stream = state.stream().clone();
    let cursor = Field::new("ts", FieldType::Integer);
    let checkpoint = CheckpointState::cursor(&cursor, json!(5), &stream);
    let partition = PartitionFactory::new()
        .create(state, Some(checkpoint))
        .unwrap()
        .unwrap();
    assert!(matches!(partition, Partition::RfrSnapshot(_)));
    assert_eq!(partition.lower_bound(), None);
}

#[test]
fn test_checkpoint_over_other_key_is_discarded() {
    let state = full_refresh();
    let checkpoint = CheckpointState::PrimaryKey {
        pk_name: vec!["payload".to_string()],
        pk_val: vec![json!("x")],
    };
    let partition = PartitionFactory::new()
        .create(state, Some(checkpoint))
        .unwrap()
        .unwrap();
    assert_eq!(partition.lower_bound(), None);
}

#[test]
fn test_incremental_without_cursor_fails() {
    let state = state_for(
        events()
            .with_primary_key(&["a"])
            .with_sync_mode(SyncMode::Incremental),
    );
    assert!(PartitionFactory::new().create(state, None).is_err());
}

#[test]
fn test_resume_after_moves_lower_bound() {
    let partition = PartitionFactory::new()
        .create(full_refresh(), None)
        .unwrap()
        .unwrap();
    let next = partition
        .resume_after(&row(json!({ "a": 2, "b": 4, "payload": "x" })))
        .unwrap();
    assert_eq!(next.lower_bound(), Some(vec![json!(2), json!(4)]));
    assert_eq!(next.upper_bound(), None);
    assert!(!next.lower_bound_included());
}

// ============================================================================
// Query Shape Tests
// ============================================================================

#[test]
fn test_resumable_query_spec() {
    let state = full_refresh();
    let partition = Partition::RfrSnapshot(RfrSnapshot {
        stream_state: Arc::clone(&state),
        primary_key: state.stream().primary_key.clone(),
        lower_bound: Some(vec![json!(1), json!(1)]),
        upper_bound: None,
    });
    let spec = partition.resumable_query_spec(500).unwrap();
    assert_eq!(spec.limit, Some(500));
    assert_eq!(spec.order_by, vec![a(), b()]);
    assert!(spec.where_clause.is_some());

    let query = partition.query(spec);
    assert_eq!(
        query.sql,
        "SELECT \"a\", \"b\", \"payload\", \"ts\" FROM \"main\".\"events\" \
         WHERE (\"a\" > ? OR (\"a\" = ? AND \"b\" > ?)) ORDER BY \"a\", \"b\" LIMIT 500"
    );
    assert_eq!(query.bindings.len(), 3);
}

#[test]
fn test_sampling_query_spec() {
    let partition = PartitionFactory::new()
        .create(full_refresh(), None)
        .unwrap()
        .unwrap();
    let spec = partition.sampling_query_spec(8, 64);
    assert!(matches!(
        spec.from,
        FromNode::Sample {
            sample_rate_inv_pow2: 8,
            sample_size: 64,
            ..
        }
    ));
    assert_eq!(spec.limit, Some(64));
    assert_eq!(spec.order_by, vec![a(), b()]);

    let plain = PartitionFactory::new()
        .create(state_for(events()), None)
        .unwrap()
        .unwrap();
    let spec = plain.sampling_query_spec(16, 64);
    assert!(matches!(spec.from, FromNode::Table { .. }));
    assert!(spec.order_by.is_empty());
    assert_eq!(spec.limit, Some(64));
}

#[test]
fn test_cursor_upper_bound_query_spec() {
    let partition = PartitionFactory::new()
        .create(with_cursor(), None)
        .unwrap()
        .unwrap();
    let spec = partition.cursor_upper_bound_query_spec().unwrap();
    assert_eq!(spec.select, SelectNode::MaxValue(Field::new("ts", FieldType::Integer)));
    assert!(PartitionFactory::new()
        .create(full_refresh(), None)
        .unwrap()
        .unwrap()
        .cursor_upper_bound_query_spec()
        .is_none());
}
