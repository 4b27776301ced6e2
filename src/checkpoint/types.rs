//! Checkpoint state types
//!
//! These types are the durable, cross-run wire format. Field names are
//! part of that format and must not change.

use crate::stream::{Field, Stream};
use crate::types::{JsonObject, JsonValue};
use serde::{Deserialize, Serialize};

/// Extraction strategy a checkpoint was produced by
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    /// Full refresh snapshot
    Snapshot,
    /// Snapshot followed by cursor-based incremental reads
    CursorIncremental,
    /// Initial snapshot preceding log-based replication
    LogReplication,
}

/// How far a stream (or one of its partitions) has been read
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "state_type", rename_all = "snake_case")]
pub enum CheckpointState {
    /// Full refresh snapshot fully read
    SnapshotCompleted,

    /// Full refresh snapshot read up to and including `pk_val`
    PrimaryKey {
        pk_name: Vec<String>,
        pk_val: Vec<JsonValue>,
    },

    /// Incremental stream read up to and including `cursor`
    CursorBased {
        stream_name: String,
        #[serde(default)]
        stream_namespace: Option<String>,
        cursor_field: String,
        cursor: JsonValue,
        #[serde(default = "default_cursor_record_count")]
        cursor_record_count: u64,
    },

    /// Snapshot preceding a cursor-based incremental sync, read up to
    /// `pk_val`; the incremental phase starts once the snapshot finishes
    SnapshotWithCursor {
        stream_name: String,
        #[serde(default)]
        stream_namespace: Option<String>,
        pk_name: Vec<String>,
        pk_val: Vec<JsonValue>,
        cursor_field: String,
    },

    /// Initial snapshot of a log-replicated stream read up to `pk_val`
    InitialSnapshot {
        pk_name: Vec<String>,
        pk_val: Vec<JsonValue>,
    },

    /// Initial snapshot of a log-replicated stream fully read
    InitialSnapshotCompleted {
        stream_name: String,
        #[serde(default)]
        stream_namespace: Option<String>,
    },
}

fn default_cursor_record_count() -> u64 {
    1
}

impl CheckpointState {
    /// Snapshot checkpoint at a key tuple
    pub fn snapshot(primary_key: &[Field], values: Vec<JsonValue>) -> Self {
        Self::PrimaryKey {
            pk_name: names(primary_key),
            pk_val: values,
        }
    }

    /// Cursor checkpoint at a cursor value
    pub fn cursor(cursor: &Field, value: JsonValue, stream: &Stream) -> Self {
        Self::CursorBased {
            stream_name: stream.name.clone(),
            stream_namespace: stream.namespace.clone(),
            cursor_field: cursor.id.clone(),
            cursor: value,
            cursor_record_count: default_cursor_record_count(),
        }
    }

    /// Snapshot-with-pending-cursor checkpoint at a key tuple
    pub fn snapshot_with_cursor(
        primary_key: &[Field],
        values: Vec<JsonValue>,
        cursor: &Field,
        stream: &Stream,
    ) -> Self {
        Self::SnapshotWithCursor {
            stream_name: stream.name.clone(),
            stream_namespace: stream.namespace.clone(),
            pk_name: names(primary_key),
            pk_val: values,
            cursor_field: cursor.id.clone(),
        }
    }

    /// Log-replication initial snapshot checkpoint at a key tuple
    pub fn initial_snapshot(primary_key: &[Field], values: Vec<JsonValue>) -> Self {
        Self::InitialSnapshot {
            pk_name: names(primary_key),
            pk_val: values,
        }
    }

    /// Log-replication initial snapshot completed
    pub fn initial_snapshot_completed(stream: &Stream) -> Self {
        Self::InitialSnapshotCompleted {
            stream_name: stream.name.clone(),
            stream_namespace: stream.namespace.clone(),
        }
    }

    /// Values of `columns` in `row`, `null` where a column is missing
    pub fn values_of(columns: &[Field], row: &JsonObject) -> Vec<JsonValue> {
        columns
            .iter()
            .map(|c| row.get(&c.id).cloned().unwrap_or(JsonValue::Null))
            .collect()
    }

    /// Strategy this checkpoint belongs to
    pub fn strategy(&self) -> Strategy {
        match self {
            Self::SnapshotCompleted | Self::PrimaryKey { .. } => Strategy::Snapshot,
            Self::CursorBased { .. } | Self::SnapshotWithCursor { .. } => {
                Strategy::CursorIncremental
            }
            Self::InitialSnapshot { .. } | Self::InitialSnapshotCompleted { .. } => {
                Strategy::LogReplication
            }
        }
    }

    /// Whether this checkpoint marks the end of a read rather than a
    /// position inside one.
    ///
    /// A cursor checkpoint is complete: the stream is caught up to it.
    pub fn is_complete(&self) -> bool {
        matches!(
            self,
            Self::SnapshotCompleted
                | Self::InitialSnapshotCompleted { .. }
                | Self::CursorBased { .. }
        )
    }

    /// The bound tuple this checkpoint points at, if any.
    ///
    /// Key tuples for snapshot shapes, the one-element cursor tuple for
    /// cursor checkpoints, and `None` for completion markers.
    pub fn bound(&self) -> Option<Vec<JsonValue>> {
        match self {
            Self::PrimaryKey { pk_val, .. }
            | Self::SnapshotWithCursor { pk_val, .. }
            | Self::InitialSnapshot { pk_val, .. } => Some(pk_val.clone()),
            Self::CursorBased { cursor, .. } => Some(vec![cursor.clone()]),
            Self::SnapshotCompleted | Self::InitialSnapshotCompleted { .. } => None,
        }
    }

    /// Key column names recorded in the checkpoint
    pub fn key_names(&self) -> Vec<String> {
        match self {
            Self::PrimaryKey { pk_name, .. }
            | Self::SnapshotWithCursor { pk_name, .. }
            | Self::InitialSnapshot { pk_name, .. } => pk_name.clone(),
            Self::CursorBased { cursor_field, .. } => vec![cursor_field.clone()],
            Self::SnapshotCompleted | Self::InitialSnapshotCompleted { .. } => Vec::new(),
        }
    }

    /// Serialize to a JSON value
    pub fn to_value(&self) -> JsonValue {
        serde_json::to_value(self).unwrap_or(JsonValue::Null)
    }
}

fn names(fields: &[Field]) -> Vec<String> {
    fields.iter().map(|f| f.id.clone()).collect()
}
