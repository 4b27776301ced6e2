//! Partition variants
//!
//! A partition is one independently readable chunk of a stream. The
//! variant decides how it is queried, whether it can be split further, and
//! which checkpoint it leaves behind.

use super::predicate::{table, KeyRange};
use crate::checkpoint::CheckpointState;
use crate::query::{SelectNode, SelectQuery, SelectQuerySpec};
use crate::state::StreamState;
use crate::stream::{Field, Stream};
use crate::types::{JsonObject, JsonValue};
use std::sync::Arc;

/// Whole-table snapshot with no usable key
#[derive(Debug, Clone)]
pub struct NonResumableSnapshot {
    pub stream_state: Arc<StreamState>,
}

/// Whole-table snapshot with no usable key, preceding cursor reads
#[derive(Debug, Clone)]
pub struct NonResumableSnapshotWithCursor {
    pub stream_state: Arc<StreamState>,
    pub cursor: Field,
}

/// Full refresh snapshot over a primary key range
#[derive(Debug, Clone)]
pub struct RfrSnapshot {
    pub stream_state: Arc<StreamState>,
    pub primary_key: Vec<Field>,
    pub lower_bound: Option<Vec<JsonValue>>,
    pub upper_bound: Option<Vec<JsonValue>>,
}

/// Initial snapshot of a log-replicated stream over a primary key range
#[derive(Debug, Clone)]
pub struct InitialSnapshot {
    pub stream_state: Arc<StreamState>,
    pub primary_key: Vec<Field>,
    pub lower_bound: Option<Vec<JsonValue>>,
    pub upper_bound: Option<Vec<JsonValue>>,
}

/// Snapshot preceding cursor reads, from a primary key to the end
#[derive(Debug, Clone)]
pub struct SnapshotWithCursor {
    pub stream_state: Arc<StreamState>,
    pub primary_key: Vec<Field>,
    pub lower_bound: Option<Vec<JsonValue>>,
    pub cursor: Field,
    pub explicit_cursor_upper_bound: Option<JsonValue>,
}

/// Snapshot preceding cursor reads over a primary key range; what a
/// [`SnapshotWithCursor`] splits into
#[derive(Debug, Clone)]
pub struct SplittableSnapshotWithCursor {
    pub stream_state: Arc<StreamState>,
    pub primary_key: Vec<Field>,
    pub lower_bound: Option<Vec<JsonValue>>,
    pub upper_bound: Option<Vec<JsonValue>>,
    pub cursor: Field,
    pub explicit_cursor_upper_bound: Option<JsonValue>,
}

/// Rows whose cursor lies between a lower bound and the cursor upper bound
#[derive(Debug, Clone)]
pub struct CursorIncremental {
    pub stream_state: Arc<StreamState>,
    pub cursor: Field,
    pub cursor_lower_bound: JsonValue,
    pub lower_bound_included: bool,
    pub explicit_cursor_upper_bound: Option<JsonValue>,
}

/// One independently readable chunk of a stream
#[derive(Debug, Clone)]
pub enum Partition {
    NonResumableSnapshot(NonResumableSnapshot),
    NonResumableSnapshotWithCursor(NonResumableSnapshotWithCursor),
    RfrSnapshot(RfrSnapshot),
    InitialSnapshot(InitialSnapshot),
    SnapshotWithCursor(SnapshotWithCursor),
    SplittableSnapshotWithCursor(SplittableSnapshotWithCursor),
    CursorIncremental(CursorIncremental),
}

impl Partition {
    /// Per-stream state this partition reads against
    pub fn stream_state(&self) -> &Arc<StreamState> {
        match self {
            Self::NonResumableSnapshot(p) => &p.stream_state,
            Self::NonResumableSnapshotWithCursor(p) => &p.stream_state,
            Self::RfrSnapshot(p) => &p.stream_state,
            Self::InitialSnapshot(p) => &p.stream_state,
            Self::SnapshotWithCursor(p) => &p.stream_state,
            Self::SplittableSnapshotWithCursor(p) => &p.stream_state,
            Self::CursorIncremental(p) => &p.stream_state,
        }
    }

    /// The stream
    pub fn stream(&self) -> &Stream {
        self.stream_state().stream()
    }

    /// Short variant name, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::NonResumableSnapshot(_) => "non_resumable_snapshot",
            Self::NonResumableSnapshotWithCursor(_) => "non_resumable_snapshot_with_cursor",
            Self::RfrSnapshot(_) => "rfr_snapshot",
            Self::InitialSnapshot(_) => "initial_snapshot",
            Self::SnapshotWithCursor(_) => "snapshot_with_cursor",
            Self::SplittableSnapshotWithCursor(_) => "splittable_snapshot_with_cursor",
            Self::CursorIncremental(_) => "cursor_incremental",
        }
    }

    /// Whether the partition has checkpoint columns to split and resume on
    pub fn is_splittable(&self) -> bool {
        !matches!(
            self,
            Self::NonResumableSnapshot(_) | Self::NonResumableSnapshotWithCursor(_)
        )
    }

    /// Whether the checkpoint columns are the primary key, so every row
    /// has a distinct position
    pub fn is_keyed_by_primary_key(&self) -> bool {
        matches!(
            self,
            Self::RfrSnapshot(_)
                | Self::InitialSnapshot(_)
                | Self::SnapshotWithCursor(_)
                | Self::SplittableSnapshotWithCursor(_)
        )
    }

    /// Cursor column, for partitions that end in cursor reads
    pub fn cursor(&self) -> Option<&Field> {
        match self {
            Self::NonResumableSnapshotWithCursor(p) => Some(&p.cursor),
            Self::SnapshotWithCursor(p) => Some(&p.cursor),
            Self::SplittableSnapshotWithCursor(p) => Some(&p.cursor),
            Self::CursorIncremental(p) => Some(&p.cursor),
            Self::NonResumableSnapshot(_) | Self::RfrSnapshot(_) | Self::InitialSnapshot(_) => {
                None
            }
        }
    }

    /// Cursor value the incremental phase reads up to: the explicit bound
    /// carried by a split partition, else the stream's resolved bound,
    /// else `null`
    pub fn cursor_upper_bound(&self) -> JsonValue {
        let explicit = match self {
            Self::SnapshotWithCursor(p) => p.explicit_cursor_upper_bound.as_ref(),
            Self::SplittableSnapshotWithCursor(p) => p.explicit_cursor_upper_bound.as_ref(),
            Self::CursorIncremental(p) => p.explicit_cursor_upper_bound.as_ref(),
            _ => None,
        };
        explicit
            .or_else(|| self.stream_state().cursor_upper_bound())
            .cloned()
            .unwrap_or(JsonValue::Null)
    }

    /// Ordered columns the partition's range is expressed over
    pub fn checkpoint_columns(&self) -> Vec<Field> {
        match self {
            Self::NonResumableSnapshot(_) | Self::NonResumableSnapshotWithCursor(_) => Vec::new(),
            Self::RfrSnapshot(p) => p.primary_key.clone(),
            Self::InitialSnapshot(p) => p.primary_key.clone(),
            Self::SnapshotWithCursor(p) => p.primary_key.clone(),
            Self::SplittableSnapshotWithCursor(p) => p.primary_key.clone(),
            Self::CursorIncremental(p) => vec![p.cursor.clone()],
        }
    }

    /// Lower bound tuple, if bounded below
    pub fn lower_bound(&self) -> Option<Vec<JsonValue>> {
        match self {
            Self::NonResumableSnapshot(_) | Self::NonResumableSnapshotWithCursor(_) => None,
            Self::RfrSnapshot(p) => p.lower_bound.clone(),
            Self::InitialSnapshot(p) => p.lower_bound.clone(),
            Self::SnapshotWithCursor(p) => p.lower_bound.clone(),
            Self::SplittableSnapshotWithCursor(p) => p.lower_bound.clone(),
            Self::CursorIncremental(p) => Some(vec![p.cursor_lower_bound.clone()]),
        }
    }

    /// Upper bound tuple, if bounded above
    pub fn upper_bound(&self) -> Option<Vec<JsonValue>> {
        match self {
            Self::NonResumableSnapshot(_)
            | Self::NonResumableSnapshotWithCursor(_)
            | Self::SnapshotWithCursor(_) => None,
            Self::RfrSnapshot(p) => p.upper_bound.clone(),
            Self::InitialSnapshot(p) => p.upper_bound.clone(),
            Self::SplittableSnapshotWithCursor(p) => p.upper_bound.clone(),
            Self::CursorIncremental(_) => Some(vec![self.cursor_upper_bound()]),
        }
    }

    /// Whether rows equal to the lower bound are part of the range
    pub fn lower_bound_included(&self) -> bool {
        match self {
            Self::CursorIncremental(p) => p.lower_bound_included,
            _ => false,
        }
    }

    /// Range of a splittable partition
    pub fn key_range(&self) -> Option<KeyRange> {
        if !self.is_splittable() {
            return None;
        }
        Some(KeyRange {
            columns: self.checkpoint_columns(),
            lower: self.lower_bound(),
            upper: self.upper_bound(),
            lower_inclusive: self.lower_bound_included(),
        })
    }

    // ========================================================================
    // Query shapes
    // ========================================================================

    /// Every row of the partition in one query
    pub fn non_resumable_query_spec(&self) -> SelectQuerySpec {
        match self.key_range() {
            Some(range) => range.non_resumable_query_spec(self.stream()),
            None => SelectQuerySpec::new(
                SelectNode::Columns(self.stream().fields.clone()),
                table(self.stream()),
            ),
        }
    }

    /// The next `limit` rows in checkpoint order; `None` when the partition
    /// has no checkpoint columns
    pub fn resumable_query_spec(&self, limit: u64) -> Option<SelectQuerySpec> {
        self.key_range()
            .map(|range| range.resumable_query_spec(self.stream(), limit))
    }

    /// Sampling query at rate `1/2^sample_rate_inv_pow2`.
    ///
    /// Without checkpoint columns there is nothing to order on, so the
    /// first `sample_size` rows of the table stand in for a sample.
    pub fn sampling_query_spec(&self, sample_rate_inv_pow2: u32, sample_size: u64) -> SelectQuerySpec {
        match self.key_range() {
            Some(range) => {
                range.sampling_query_spec(self.stream(), sample_rate_inv_pow2, sample_size)
            }
            None => SelectQuerySpec::new(
                SelectNode::Columns(self.stream().fields.clone()),
                table(self.stream()),
            )
            .with_limit(sample_size),
        }
    }

    /// `SELECT MAX(cursor)` over the table, for cursor partitions
    pub fn cursor_upper_bound_query_spec(&self) -> Option<SelectQuerySpec> {
        self.cursor().map(|cursor| {
            SelectQuerySpec::new(SelectNode::MaxValue(cursor.clone()), table(self.stream()))
        })
    }

    /// Optimize a spec and generate its query
    pub fn query(&self, spec: SelectQuerySpec) -> SelectQuery {
        self.stream_state().generate(spec)
    }

    // ========================================================================
    // Checkpoints
    // ========================================================================

    /// Checkpoint once every row of the partition has been read.
    ///
    /// Ranged partitions complete at their planned upper bound rather than
    /// at the last row actually read.
    pub fn complete_state(&self) -> CheckpointState {
        let stream = self.stream();
        match self {
            Self::NonResumableSnapshot(_) => CheckpointState::SnapshotCompleted,
            Self::NonResumableSnapshotWithCursor(p) => {
                CheckpointState::cursor(&p.cursor, self.cursor_upper_bound(), stream)
            }
            Self::RfrSnapshot(p) => match &p.upper_bound {
                None => CheckpointState::SnapshotCompleted,
                Some(upper) => CheckpointState::snapshot(&p.primary_key, upper.clone()),
            },
            Self::InitialSnapshot(p) => match &p.upper_bound {
                None => CheckpointState::initial_snapshot_completed(stream),
                Some(upper) => CheckpointState::initial_snapshot(&p.primary_key, upper.clone()),
            },
            Self::SnapshotWithCursor(p) => {
                CheckpointState::cursor(&p.cursor, self.cursor_upper_bound(), stream)
            }
            Self::SplittableSnapshotWithCursor(p) => match &p.upper_bound {
                None => CheckpointState::cursor(&p.cursor, self.cursor_upper_bound(), stream),
                Some(upper) => CheckpointState::snapshot_with_cursor(
                    &p.primary_key,
                    upper.clone(),
                    &p.cursor,
                    stream,
                ),
            },
            Self::CursorIncremental(p) => {
                CheckpointState::cursor(&p.cursor, self.cursor_upper_bound(), stream)
            }
        }
    }

    /// Checkpoint as if `last_row` were the last row read; `None` for
    /// partitions that cannot resume mid-way
    pub fn incomplete_state(&self, last_row: &JsonObject) -> Option<CheckpointState> {
        let stream = self.stream();
        match self {
            Self::NonResumableSnapshot(_) | Self::NonResumableSnapshotWithCursor(_) => None,
            Self::RfrSnapshot(p) => Some(CheckpointState::snapshot(
                &p.primary_key,
                CheckpointState::values_of(&p.primary_key, last_row),
            )),
            Self::InitialSnapshot(p) => Some(CheckpointState::initial_snapshot(
                &p.primary_key,
                CheckpointState::values_of(&p.primary_key, last_row),
            )),
            Self::SnapshotWithCursor(SnapshotWithCursor {
                primary_key, cursor, ..
            })
            | Self::SplittableSnapshotWithCursor(SplittableSnapshotWithCursor {
                primary_key,
                cursor,
                ..
            }) => Some(CheckpointState::snapshot_with_cursor(
                primary_key,
                CheckpointState::values_of(primary_key, last_row),
                cursor,
                stream,
            )),
            Self::CursorIncremental(p) => Some(CheckpointState::cursor(
                &p.cursor,
                last_row.get(&p.cursor.id).cloned().unwrap_or(JsonValue::Null),
                stream,
            )),
        }
    }

    /// The rest of this partition after `last_row`: same variant and upper
    /// bound, lower bound moved to the row's key, exclusive.
    ///
    /// Only partitions keyed by primary key can resume this way; a cursor
    /// may repeat across rows.
    pub fn resume_after(&self, last_row: &JsonObject) -> Option<Partition> {
        let lower = |key: &[Field]| Some(CheckpointState::values_of(key, last_row));
        match self {
            Self::RfrSnapshot(p) => Some(Self::RfrSnapshot(RfrSnapshot {
                lower_bound: lower(&p.primary_key),
                ..p.clone()
            })),
            Self::InitialSnapshot(p) => Some(Self::InitialSnapshot(InitialSnapshot {
                lower_bound: lower(&p.primary_key),
                ..p.clone()
            })),
            Self::SnapshotWithCursor(p) => Some(Self::SnapshotWithCursor(SnapshotWithCursor {
                lower_bound: lower(&p.primary_key),
                ..p.clone()
            })),
            Self::SplittableSnapshotWithCursor(p) => Some(Self::SplittableSnapshotWithCursor(
                SplittableSnapshotWithCursor {
                    lower_bound: lower(&p.primary_key),
                    ..p.clone()
                },
            )),
            Self::NonResumableSnapshot(_)
            | Self::NonResumableSnapshotWithCursor(_)
            | Self::CursorIncremental(_) => None,
        }
    }
}
