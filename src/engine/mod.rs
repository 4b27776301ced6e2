//! Execution engine module
//!
//! Plans each stream, fans its partition readers out over a bounded pool,
//! and turns what they report into records and stream checkpoints.
//!
//! # Overview
//!
//! The engine module provides:
//! - `SyncEngine` - Orchestrates stream syncs with state management
//! - Message types for output (Record, State, Log)
//! - `SyncStats` - Counters for a sync

mod types;

pub use types::{LogLevel, Message, SyncStats};

use crate::creator::PartitionsCreator;
use crate::error::{Error, Result};
use crate::partition::PartitionFactory;
use crate::reader::{PartitionReader, ReaderEvent};
use crate::source::{SelectQuerier, TableSizeEstimator};
use crate::state::{CheckpointTracker, SharedState, StateManager, StreamState};
use crate::stream::Stream;
use std::sync::Arc;
use std::time::Instant;
use tokio::sync::{mpsc, Semaphore};
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};

/// Sync engine for orchestrating data extraction
pub struct SyncEngine {
    /// Runs reader and planning queries
    querier: Arc<dyn SelectQuerier>,
    /// Sizes tables for splitting
    table_size_estimator: Arc<dyn TableSizeEstimator>,
    /// Config, estimators and query generator shared by every stream
    shared: Arc<SharedState>,
    /// State manager
    state: StateManager,
    factory: PartitionFactory,
    /// Statistics
    stats: SyncStats,
}

impl SyncEngine {
    /// Create a new sync engine
    pub fn new(
        querier: Arc<dyn SelectQuerier>,
        table_size_estimator: Arc<dyn TableSizeEstimator>,
        shared: Arc<SharedState>,
        state: StateManager,
    ) -> Self {
        Self {
            querier,
            table_size_estimator,
            shared,
            state,
            factory: PartitionFactory::new(),
            stats: SyncStats::default(),
        }
    }

    /// Get the state manager
    pub fn state(&self) -> &StateManager {
        &self.state
    }

    /// Get statistics
    pub fn stats(&self) -> &SyncStats {
        &self.stats
    }

    /// Plan the readers for a stream from its stored checkpoint.
    ///
    /// Empty when the stream has nothing left to read.
    pub async fn plan(&self, stream: Stream) -> Result<Vec<PartitionReader>> {
        let label = stream.label();
        let checkpoint = self.state.get(&label).await;
        let stream_state = Arc::new(StreamState::new(stream, Arc::clone(&self.shared)));

        let Some(partition) = self.factory.create(stream_state, checkpoint)? else {
            info!("Stream '{}' has nothing left to read", label);
            return Ok(Vec::new());
        };
        debug!("Stream '{}' starts from a {} partition", label, partition.kind());

        PartitionsCreator::new(
            partition,
            Arc::clone(&self.querier),
            Arc::clone(&self.table_size_estimator),
        )
        .run()
        .await
    }

    /// Sync every stream in order, stopping at the first failed one
    pub async fn sync_streams<F>(&mut self, streams: Vec<Stream>, emit: &mut F) -> Result<()>
    where
        F: FnMut(Message),
    {
        let start = Instant::now();
        for stream in streams {
            self.sync_stream(stream, emit).await?;
        }
        self.stats.set_duration(start.elapsed().as_millis() as u64);
        Ok(())
    }

    /// Sync one stream, passing every record batch, checkpoint and log
    /// line to `emit` as it happens.
    ///
    /// Each stream checkpoint is stored in the state manager before it is
    /// emitted.
    pub async fn sync_stream<F>(&mut self, stream: Stream, emit: &mut F) -> Result<()>
    where
        F: FnMut(Message),
    {
        let start = Instant::now();
        let label = stream.label();
        emit(Message::info(format!("Starting sync for stream: {label}")));

        let readers = self.plan(stream).await?;
        if readers.is_empty() {
            emit(Message::info(format!("Stream {label} is already up to date")));
            self.stats.add_stream();
            return Ok(());
        }

        let records_before = self.stats.records_synced;
        self.run_readers(&label, readers, emit).await?;
        self.stats.add_stream();

        let records = self.stats.records_synced - records_before;
        let complete = self
            .state
            .get(&label)
            .await
            .is_some_and(|checkpoint| checkpoint.is_complete());
        if complete {
            emit(Message::info(format!(
                "Completed sync for {label}: {records} records in {} ms",
                start.elapsed().as_millis()
            )));
        } else {
            emit(Message::warn(format!(
                "Stream {label} stopped at an incomplete checkpoint after {records} records"
            )));
        }
        Ok(())
    }

    /// Run planned readers concurrently and coordinate their checkpoints
    async fn run_readers<F>(
        &mut self,
        label: &str,
        readers: Vec<PartitionReader>,
        emit: &mut F,
    ) -> Result<()>
    where
        F: FnMut(Message),
    {
        let config = &self.shared.config;
        let fail_fast = config.fail_fast;
        let concurrency = config.max_concurrency.max(1);

        let mut tracker = CheckpointTracker::new(readers.len());
        let semaphore = Arc::new(Semaphore::new(concurrency));
        let (tx, mut rx) = mpsc::channel::<ReaderEvent>(concurrency * 4);
        let mut tasks = JoinSet::new();

        info!(
            "Reading stream '{}' with {} partition reader(s), at most {} at a time",
            label,
            readers.len(),
            concurrency
        );
        for (index, reader) in readers.into_iter().enumerate() {
            let semaphore = Arc::clone(&semaphore);
            let querier = Arc::clone(&self.querier);
            let events = tx.clone();
            tasks.spawn(async move {
                let result = match semaphore.acquire_owned().await {
                    Ok(_permit) => {
                        debug!("Reader {} started ({})", index, reader.kind());
                        reader.run(index, querier, events).await
                    }
                    Err(_) => Err(Error::reader(index, "reader pool closed")),
                };
                (index, result)
            });
        }
        drop(tx);

        let mut last_emitted = None;
        let mut first_error = None;
        loop {
            // Events a reader sent are handled before its exit is seen
            tokio::select! {
                biased;
                Some(event) = rx.recv() => match event {
                    ReaderEvent::Records { rows, .. } => {
                        self.stats.add_records(rows.len());
                        emit(Message::record(label, rows));
                    }
                    ReaderEvent::Checkpoint { index, state, complete } => {
                        if complete {
                            tracker.report_complete(index, state)?;
                        } else {
                            tracker.report_progress(index, state)?;
                        }
                        let checkpoint = tracker.stream_checkpoint();
                        if checkpoint.is_some() && checkpoint != last_emitted {
                            if let Some(state) = checkpoint.clone() {
                                self.state.set(label, state.clone()).await;
                                self.stats.add_checkpoint();
                                emit(Message::state(label, state));
                            }
                            last_emitted = checkpoint;
                        }
                    }
                },
                Some(joined) = tasks.join_next() => match joined {
                    Ok((index, Ok(()))) => {
                        debug!("Reader {} finished", index);
                        self.stats.add_partition();
                    }
                    Ok((index, Err(e))) => {
                        error!("Reader {} for stream '{}' failed: {}", index, label, e);
                        tracker.report_failed(index)?;
                        self.stats.add_error();
                        emit(Message::error(format!("Failed to read partition {index} of {label}: {e}")));
                        if fail_fast {
                            tasks.abort_all();
                            first_error = Some(e);
                            break;
                        }
                    }
                    Err(e) => {
                        tasks.abort_all();
                        self.stats.add_error();
                        first_error = Some(Error::from(e));
                        break;
                    }
                },
                else => break,
            }
        }

        if let Some(e) = first_error {
            return Err(e);
        }
        if tracker.has_failures() {
            warn!(
                "Stream '{}' finished with failed partitions; its checkpoint stops before them",
                label
            );
            emit(Message::warn(format!(
                "Stream {label} finished with failed partitions"
            )));
        }
        Ok(())
    }
}
