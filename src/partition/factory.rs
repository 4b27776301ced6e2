//! Building and splitting partitions

use super::types::{
    CursorIncremental, InitialSnapshot, NonResumableSnapshot, NonResumableSnapshotWithCursor,
    Partition, RfrSnapshot, SnapshotWithCursor, SplittableSnapshotWithCursor,
};
use crate::checkpoint::{CheckpointState, Strategy};
use crate::error::{Error, Result};
use crate::state::StreamState;
use crate::stream::Field;
use crate::types::{JsonValue, ReplicationMethod, SyncMode};
use std::sync::Arc;
use tracing::{info, warn};

/// Creates the partition a stream starts from, and splits partitions
#[derive(Debug, Clone, Copy, Default)]
pub struct PartitionFactory;

impl PartitionFactory {
    /// Create a factory
    pub fn new() -> Self {
        Self
    }

    /// The partition covering everything left to read of a stream, given
    /// its last checkpoint; `None` when nothing is left.
    ///
    /// A checkpoint written under a different strategy, or over different
    /// key columns, is discarded and the stream starts over.
    pub fn create(
        &self,
        stream_state: Arc<StreamState>,
        checkpoint: Option<CheckpointState>,
    ) -> Result<Option<Partition>> {
        let stream = stream_state.stream();
        let label = stream.label();
        let strategy = strategy_of(&stream_state)?;

        let Some(checkpoint) = checkpoint else {
            return Self::cold_start(stream_state, strategy).map(Some);
        };

        if checkpoint.strategy() != strategy {
            warn!(
                "Discarding checkpoint for stream '{}': it was written by a {:?} sync, stream is configured for {:?}",
                label,
                checkpoint.strategy(),
                strategy
            );
            return Self::cold_start(stream_state, strategy).map(Some);
        }

        let expected_keys = match &checkpoint {
            CheckpointState::CursorBased { .. } => stream
                .cursor
                .iter()
                .map(|f| f.id.clone())
                .collect::<Vec<_>>(),
            _ => stream.primary_key_names(),
        };
        let keys = checkpoint.key_names();
        if !keys.is_empty() && keys != expected_keys {
            warn!(
                "Discarding checkpoint for stream '{}': it is keyed on {:?}, stream is keyed on {:?}",
                label, keys, expected_keys
            );
            return Self::cold_start(stream_state, strategy).map(Some);
        }

        info!("Resuming stream '{}' from {:?}", label, checkpoint);
        let partition = match checkpoint {
            CheckpointState::SnapshotCompleted
            | CheckpointState::InitialSnapshotCompleted { .. } => None,
            CheckpointState::PrimaryKey { pk_val, .. } => {
                let primary_key = stream.primary_key.clone();
                Some(Partition::RfrSnapshot(RfrSnapshot {
                    stream_state,
                    primary_key,
                    lower_bound: Some(pk_val),
                    upper_bound: None,
                }))
            }
            CheckpointState::InitialSnapshot { pk_val, .. } => {
                let primary_key = stream.primary_key.clone();
                Some(Partition::InitialSnapshot(InitialSnapshot {
                    stream_state,
                    primary_key,
                    lower_bound: Some(pk_val),
                    upper_bound: None,
                }))
            }
            CheckpointState::SnapshotWithCursor { pk_val, .. } => {
                let primary_key = stream.primary_key.clone();
                let cursor = required_cursor(&stream_state)?;
                Some(Partition::SnapshotWithCursor(SnapshotWithCursor {
                    stream_state,
                    primary_key,
                    lower_bound: Some(pk_val),
                    cursor,
                    explicit_cursor_upper_bound: None,
                }))
            }
            CheckpointState::CursorBased { cursor, .. } if cursor.is_null() => {
                info!(
                    "Checkpoint for stream '{}' has no cursor value, starting over",
                    label
                );
                Some(Self::cold_start(stream_state, strategy)?)
            }
            CheckpointState::CursorBased { cursor: value, .. } => {
                let cursor = required_cursor(&stream_state)?;
                Some(Partition::CursorIncremental(CursorIncremental {
                    stream_state,
                    cursor,
                    cursor_lower_bound: value,
                    lower_bound_included: false,
                    explicit_cursor_upper_bound: None,
                }))
            }
        };
        Ok(partition)
    }

    fn cold_start(stream_state: Arc<StreamState>, strategy: Strategy) -> Result<Partition> {
        let primary_key = stream_state.stream().primary_key.clone();
        let partition = match strategy {
            Strategy::Snapshot if primary_key.is_empty() => {
                Partition::NonResumableSnapshot(NonResumableSnapshot { stream_state })
            }
            Strategy::Snapshot => Partition::RfrSnapshot(RfrSnapshot {
                stream_state,
                primary_key,
                lower_bound: None,
                upper_bound: None,
            }),
            Strategy::CursorIncremental => {
                let cursor = required_cursor(&stream_state)?;
                if primary_key.is_empty() {
                    Partition::NonResumableSnapshotWithCursor(NonResumableSnapshotWithCursor {
                        stream_state,
                        cursor,
                    })
                } else {
                    Partition::SnapshotWithCursor(SnapshotWithCursor {
                        stream_state,
                        primary_key,
                        lower_bound: None,
                        cursor,
                        explicit_cursor_upper_bound: None,
                    })
                }
            }
            Strategy::LogReplication => Partition::InitialSnapshot(InitialSnapshot {
                stream_state,
                primary_key,
                lower_bound: None,
                upper_bound: None,
            }),
        };
        Ok(partition)
    }

    /// Split a partition at the bounds carried by `boundaries`.
    ///
    /// Boundaries must be in checkpoint column order. The pieces cover
    /// `(lower, b1], (b1, b2], ..., (bn, upper]`. Partitions that cannot be
    /// split, and an empty boundary list, give back the partition as is.
    pub fn split(&self, partition: Partition, boundaries: &[CheckpointState]) -> Vec<Partition> {
        if !partition.is_splittable() || boundaries.is_empty() {
            return vec![partition];
        }

        let bounds: Vec<Vec<JsonValue>> = boundaries
            .iter()
            .filter_map(CheckpointState::bound)
            .collect();
        if bounds.is_empty() {
            return vec![partition];
        }

        let mut lowers: Vec<Option<Vec<JsonValue>>> = vec![partition.lower_bound()];
        lowers.extend(bounds.iter().cloned().map(Some));
        let mut uppers: Vec<Option<Vec<JsonValue>>> = bounds.into_iter().map(Some).collect();
        uppers.push(partition.upper_bound());
        let ranges = lowers.into_iter().zip(uppers);

        match &partition {
            Partition::RfrSnapshot(p) => ranges
                .map(|(lower_bound, upper_bound)| {
                    Partition::RfrSnapshot(RfrSnapshot {
                        lower_bound,
                        upper_bound,
                        ..p.clone()
                    })
                })
                .collect(),
            Partition::InitialSnapshot(p) => ranges
                .map(|(lower_bound, upper_bound)| {
                    Partition::InitialSnapshot(InitialSnapshot {
                        lower_bound,
                        upper_bound,
                        ..p.clone()
                    })
                })
                .collect(),
            Partition::SnapshotWithCursor(SnapshotWithCursor {
                stream_state,
                primary_key,
                cursor,
                ..
            })
            | Partition::SplittableSnapshotWithCursor(SplittableSnapshotWithCursor {
                stream_state,
                primary_key,
                cursor,
                ..
            }) => {
                let cursor_upper_bound = Some(partition.cursor_upper_bound());
                ranges
                    .map(|(lower_bound, upper_bound)| {
                        Partition::SplittableSnapshotWithCursor(SplittableSnapshotWithCursor {
                            stream_state: Arc::clone(stream_state),
                            primary_key: primary_key.clone(),
                            lower_bound,
                            upper_bound,
                            cursor: cursor.clone(),
                            explicit_cursor_upper_bound: cursor_upper_bound.clone(),
                        })
                    })
                    .collect()
            }
            Partition::CursorIncremental(p) => ranges
                .enumerate()
                .map(|(idx, (lower, upper))| {
                    Partition::CursorIncremental(CursorIncremental {
                        stream_state: Arc::clone(&p.stream_state),
                        cursor: p.cursor.clone(),
                        cursor_lower_bound: first_value(lower),
                        lower_bound_included: idx == 0 && p.lower_bound_included,
                        explicit_cursor_upper_bound: Some(first_value(upper)),
                    })
                })
                .collect(),
            Partition::NonResumableSnapshot(_) | Partition::NonResumableSnapshotWithCursor(_) => {
                vec![partition.clone()]
            }
        }
    }
}

/// Extraction strategy a stream's configuration calls for
fn strategy_of(stream_state: &StreamState) -> Result<Strategy> {
    let stream = stream_state.stream();
    match (stream.sync_mode, stream.replication_method) {
        (SyncMode::FullRefresh, _) => Ok(Strategy::Snapshot),
        (SyncMode::Incremental, ReplicationMethod::Standard) => Ok(Strategy::CursorIncremental),
        (SyncMode::Incremental, ReplicationMethod::LogReplication) => {
            if stream.primary_key.is_empty() {
                return Err(Error::partition(
                    stream.label(),
                    "log replication requires a primary key",
                ));
            }
            Ok(Strategy::LogReplication)
        }
    }
}

fn required_cursor(stream_state: &StreamState) -> Result<Field> {
    let stream = stream_state.stream();
    stream.cursor.clone().ok_or_else(|| {
        Error::partition(
            stream.label(),
            "incremental sync requires a cursor field",
        )
    })
}

fn first_value(bound: Option<Vec<JsonValue>>) -> JsonValue {
    bound
        .and_then(|values| values.into_iter().next())
        .unwrap_or(JsonValue::Null)
}
