//! Partition readers
//!
//! A reader turns one planned partition into rows and checkpoints, sent to
//! the coordinator as [`ReaderEvent`]s. Three kinds exist:
//! - `CheckpointOnly` - nothing to read, only a completion checkpoint
//! - `NonResumable` - one query, one checkpoint once every row is read
//! - `Resumable` - batches in key order, a checkpoint after each batch

use crate::checkpoint::CheckpointState;
use crate::error::{Error, Result};
use crate::partition::Partition;
use crate::source::SelectQuerier;
use crate::types::JsonObject;
use futures::TryStreamExt;
use std::sync::Arc;
use tokio::sync::mpsc;

/// What a reader reports to the coordinator
#[derive(Debug, Clone, PartialEq)]
pub enum ReaderEvent {
    /// Rows read, in read order
    Records { index: usize, rows: Vec<JsonObject> },
    /// Everything up to `state` has been sent; `complete` once the reader
    /// is done
    Checkpoint {
        index: usize,
        state: CheckpointState,
        complete: bool,
    },
}

/// A unit of concurrent work produced by planning
#[derive(Debug, Clone)]
pub enum PartitionReader {
    /// Emit a completion checkpoint without reading anything
    CheckpointOnly(CheckpointState),
    /// Read the whole partition in one query
    NonResumable(Partition),
    /// Read the partition in key-ordered batches
    Resumable(Partition),
}

impl From<Partition> for PartitionReader {
    fn from(partition: Partition) -> Self {
        Self::NonResumable(partition)
    }
}

impl PartitionReader {
    /// Reader that completes `partition` without reading it
    pub fn checkpoint_only(partition: &Partition) -> Self {
        Self::CheckpointOnly(partition.complete_state())
    }

    /// Reader kind, for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::CheckpointOnly(_) => "checkpoint_only",
            Self::NonResumable(_) => "non_resumable",
            Self::Resumable(_) => "resumable",
        }
    }

    /// The partition to read, if there is one
    pub fn partition(&self) -> Option<&Partition> {
        match self {
            Self::CheckpointOnly(_) => None,
            Self::NonResumable(p) | Self::Resumable(p) => Some(p),
        }
    }

    /// Read everything, reporting to `events` as reader number `index`
    pub async fn run(
        self,
        index: usize,
        querier: Arc<dyn SelectQuerier>,
        events: mpsc::Sender<ReaderEvent>,
    ) -> Result<()> {
        match self {
            Self::CheckpointOnly(state) => send_checkpoint(&events, index, state, true).await,
            Self::NonResumable(partition) => {
                read_non_resumable(index, &partition, querier.as_ref(), &events).await
            }
            Self::Resumable(partition) => {
                read_resumable(index, partition, querier.as_ref(), &events).await
            }
        }
    }
}

async fn read_non_resumable(
    index: usize,
    partition: &Partition,
    querier: &dyn SelectQuerier,
    events: &mpsc::Sender<ReaderEvent>,
) -> Result<()> {
    let fetch_size = fetch_size(partition);
    let query = partition.query(partition.non_resumable_query_spec());
    tracing::debug!("Reader {} executing query: {}", index, query.sql);

    let mut rows = querier.select(query, Some(fetch_size)).await?;
    let mut batch = Vec::with_capacity(fetch_size);
    let mut total = 0usize;
    while let Some(row) = rows.try_next().await? {
        batch.push(row);
        if batch.len() >= fetch_size {
            total += batch.len();
            send_records(events, index, std::mem::take(&mut batch)).await?;
        }
    }
    if !batch.is_empty() {
        total += batch.len();
        send_records(events, index, batch).await?;
    }

    tracing::debug!("Reader {} read {} rows", index, total);
    send_checkpoint(events, index, partition.complete_state(), true).await
}

async fn read_resumable(
    index: usize,
    partition: Partition,
    querier: &dyn SelectQuerier,
    events: &mpsc::Sender<ReaderEvent>,
) -> Result<()> {
    let fetch_size = fetch_size(&partition);
    let batch_size = partition
        .stream_state()
        .shared()
        .config
        .resumable_batch_size
        .max(1);
    let complete_state = partition.complete_state();

    let mut current = partition;
    loop {
        let spec = current.resumable_query_spec(batch_size as u64).ok_or_else(|| {
            Error::reader(index, format!("{} partition cannot be read in batches", current.kind()))
        })?;
        let query = current.query(spec);
        tracing::debug!("Reader {} executing batch query: {}", index, query.sql);

        let rows: Vec<JsonObject> = querier
            .select(query, Some(fetch_size))
            .await?
            .try_collect()
            .await?;
        let count = rows.len();
        let Some(last) = rows.last().cloned() else {
            break;
        };
        send_records(events, index, rows).await?;

        if count < batch_size {
            break;
        }

        let state = current.incomplete_state(&last).ok_or_else(|| {
            Error::reader(index, format!("{} partition has no checkpoint", current.kind()))
        })?;
        send_checkpoint(events, index, state, false).await?;

        current = current.resume_after(&last).ok_or_else(|| {
            Error::reader(index, format!("{} partition cannot resume", current.kind()))
        })?;
    }

    send_checkpoint(events, index, complete_state, true).await
}

fn fetch_size(partition: &Partition) -> usize {
    let stream_state = partition.stream_state();
    stream_state
        .fetch_size()
        .unwrap_or(stream_state.shared().config.fetch.default_fetch_size)
        .max(1)
}

async fn send_records(
    events: &mpsc::Sender<ReaderEvent>,
    index: usize,
    rows: Vec<JsonObject>,
) -> Result<()> {
    events
        .send(ReaderEvent::Records { index, rows })
        .await
        .map_err(|_| Error::reader(index, "coordinator stopped listening"))
}

async fn send_checkpoint(
    events: &mpsc::Sender<ReaderEvent>,
    index: usize,
    state: CheckpointState,
    complete: bool,
) -> Result<()> {
    events
        .send(ReaderEvent::Checkpoint {
            index,
            state,
            complete,
        })
        .await
        .map_err(|_| Error::reader(index, "coordinator stopped listening"))
}
