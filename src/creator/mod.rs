//! Partitions creator
//!
//! Plans how a stream's partition is read: resolves the cursor upper
//! bound, samples the table, sizes fetches, and decides whether and where
//! to split.
//!
//! # Overview
//!
//! - `PartitionsCreator` - planning for one partition, concurrent or
//!   sequential
//! - `Sample` / `collect_sample` - progressive Bernoulli sampling
//! - `RowByteSizeEstimator` / `FetchSizeEstimator` - sizing from samples

mod estimators;
mod sample;

pub use estimators::{
    DefaultFetchSizeEstimator, DefaultRowByteSizeEstimator, FetchSizeEstimator,
    RowByteSizeEstimator,
};
pub use sample::{collect_sample, Sample, SampleKind};

use crate::checkpoint::CheckpointState;
use crate::error::Result;
use crate::partition::{Partition, PartitionFactory};
use crate::reader::PartitionReader;
use crate::source::{SelectQuerier, TableSizeEstimator};
use crate::types::{CreatorMode, JsonValue};
use futures::TryStreamExt;
use rand::{rngs::StdRng, Rng, SeedableRng};
use std::sync::Arc;
use tracing::{info, warn};

/// Plans the readers for one partition
pub struct PartitionsCreator {
    partition: Partition,
    factory: PartitionFactory,
    querier: Arc<dyn SelectQuerier>,
    table_size_estimator: Arc<dyn TableSizeEstimator>,
}

impl PartitionsCreator {
    /// Create a creator for `partition`
    pub fn new(
        partition: Partition,
        querier: Arc<dyn SelectQuerier>,
        table_size_estimator: Arc<dyn TableSizeEstimator>,
    ) -> Self {
        Self {
            partition,
            factory: PartitionFactory::new(),
            querier,
            table_size_estimator,
        }
    }

    /// Plan the readers, in the mode the shared config asks for
    pub async fn run(self) -> Result<Vec<PartitionReader>> {
        match self.partition.stream_state().shared().config.mode {
            CreatorMode::Concurrent => self.run_concurrent().await,
            CreatorMode::Sequential => self.run_sequential().await,
        }
    }

    /// Sample the table and split it into partitions of about the target
    /// byte size, each read by its own non-resumable reader
    pub async fn run_concurrent(self) -> Result<Vec<PartitionReader>> {
        let partition = &self.partition;
        let label = partition.stream().label();
        let shared = Arc::clone(partition.stream_state().shared());

        if partition.cursor().is_some() {
            self.ensure_cursor_upper_bound().await?;
            if partition.cursor_upper_bound().is_null() {
                info!("Maximum cursor column value query found that table '{}' was empty", label);
                return Ok(vec![PartitionReader::checkpoint_only(partition)]);
            }
        }

        if !shared.config.with_sampling {
            warn!(
                "Table '{}' cannot be read by concurrent partition readers because it cannot be sampled",
                label
            );
            return Ok(vec![PartitionReader::NonResumable(self.partition)]);
        }

        let sample = self.sample().await?;
        if sample.is_empty() {
            info!("Sampling query found that table '{}' was empty", label);
            return Ok(vec![PartitionReader::checkpoint_only(partition)]);
        }
        self.store_fetch_size(&sample)?;

        if !partition.is_splittable() {
            warn!(
                "Table '{}' cannot be read by concurrent partition readers because it cannot be split",
                label
            );
            return Ok(vec![PartitionReader::NonResumable(self.partition)]);
        }

        let table_byte_size = self
            .table_size_estimator
            .table_byte_size(partition.stream())
            .await?;
        if table_byte_size == 0 {
            info!("Unable to get a size estimate for table '{}'", label);
            return Ok(vec![PartitionReader::NonResumable(self.partition)]);
        }

        let target = shared.config.target_partition_byte_size;
        info!(
            "Table '{}' memory size estimated at {} MiB ({} rows), target partition size is {} MiB",
            label,
            table_byte_size >> 20,
            sample.estimated_row_count(),
            target >> 20
        );
        if table_byte_size <= target {
            return Ok(vec![PartitionReader::NonResumable(self.partition)]);
        }

        let rate = secondary_sampling_rate(table_byte_size, shared.config.max_sample_size, target);
        let candidates = sample.sampled_values.into_iter().map(|(boundary, _)| boundary);
        let boundaries = pick_boundaries(candidates, table_byte_size, rate);

        let partitions = self.factory.split(self.partition, &boundaries);
        info!(
            "Table '{}' will be read by {} concurrent partition reader(s)",
            label,
            partitions.len()
        );
        Ok(partitions
            .into_iter()
            .map(PartitionReader::NonResumable)
            .collect())
    }

    /// Read the partition with a single reader, resumable when the
    /// partition is keyed by its primary key
    pub async fn run_sequential(self) -> Result<Vec<PartitionReader>> {
        let partition = &self.partition;
        let label = partition.stream().label();

        if partition.cursor().is_some() {
            self.ensure_cursor_upper_bound().await?;
            if partition.cursor_upper_bound().is_null() {
                info!("Maximum cursor column value query found that table '{}' was empty", label);
                return Ok(vec![PartitionReader::checkpoint_only(partition)]);
            }
        }

        if partition.stream_state().shared().config.with_sampling {
            let sample = self.sample().await?;
            if sample.is_empty() {
                info!("Sampling query found that table '{}' was empty", label);
                return Ok(vec![PartitionReader::checkpoint_only(partition)]);
            }
            self.store_fetch_size(&sample)?;
        }

        if partition.is_splittable() && partition.is_keyed_by_primary_key() {
            info!("Table '{}' will be read by a resumable partition reader", label);
            Ok(vec![PartitionReader::Resumable(self.partition)])
        } else {
            info!("Table '{}' will be read by a non-resumable partition reader", label);
            Ok(vec![PartitionReader::NonResumable(self.partition)])
        }
    }

    /// Resolve and record the stream's cursor upper bound, once
    async fn ensure_cursor_upper_bound(&self) -> Result<()> {
        let stream_state = self.partition.stream_state();
        if stream_state.cursor_upper_bound().is_some() {
            return Ok(());
        }
        let (Some(spec), Some(cursor)) = (
            self.partition.cursor_upper_bound_query_spec(),
            self.partition.cursor(),
        ) else {
            return Ok(());
        };

        let query = self.partition.query(spec);
        tracing::debug!("Querying cursor upper bound: {}", query.sql);
        let mut rows = self.querier.select(query, None).await?;
        let value = rows
            .try_next()
            .await?
            .and_then(|row| row.get(&cursor.id).cloned())
            .unwrap_or(JsonValue::Null);
        info!(
            "Cursor upper bound for '{}' is {}",
            self.partition.stream().label(),
            value
        );
        stream_state.set_cursor_upper_bound(value)
    }

    /// Sample the partition: per row, its candidate split checkpoint and
    /// its estimated byte size
    async fn sample(&self) -> Result<Sample<(Option<CheckpointState>, u64)>> {
        let partition = &self.partition;
        let shared = partition.stream_state().shared();
        let max_sample_size = shared.config.max_sample_size;
        let estimator = Arc::clone(&shared.row_byte_size_estimator);

        collect_sample(
            self.querier.as_ref(),
            max_sample_size,
            |rate| partition.query(partition.sampling_query_spec(rate, max_sample_size as u64)),
            |row| (partition.incomplete_state(row), estimator.estimate(row)),
        )
        .await
    }

    fn store_fetch_size(&self, sample: &Sample<(Option<CheckpointState>, u64)>) -> Result<()> {
        let stream_state = self.partition.stream_state();
        let row_byte_sizes = sample.map(|(_, size)| *size);
        let fetch_size = stream_state
            .shared()
            .fetch_size_estimator
            .estimate(&row_byte_sizes);
        tracing::debug!(
            "Fetch size for '{}' is {} rows",
            self.partition.stream().label(),
            fetch_size
        );
        stream_state.set_fetch_size(fetch_size)
    }
}

/// Share of sampled rows kept as split boundaries, so that the kept ones
/// lie about one target partition size apart
pub fn secondary_sampling_rate(
    table_byte_size: u64,
    max_sample_size: usize,
    target_partition_byte_size: u64,
) -> f64 {
    let expected_partition_byte_size = table_byte_size / (max_sample_size.max(1) as u64);
    if expected_partition_byte_size < target_partition_byte_size {
        expected_partition_byte_size as f64 / target_partition_byte_size as f64
    } else {
        1.0
    }
}

/// Thin candidate boundaries at `rate`, with randomness seeded by the
/// table size so the same estimate picks the same boundaries.
///
/// One draw per candidate, empty candidates included; kept candidates are
/// de-duplicated in order.
pub fn pick_boundaries(
    candidates: impl IntoIterator<Item = Option<CheckpointState>>,
    table_byte_size: u64,
    rate: f64,
) -> Vec<CheckpointState> {
    let mut rng = StdRng::seed_from_u64(table_byte_size);
    let mut boundaries: Vec<CheckpointState> = Vec::new();
    for candidate in candidates {
        if rng.random::<f64>() >= rate {
            continue;
        }
        if let Some(boundary) = candidate {
            if !boundaries.contains(&boundary) {
                boundaries.push(boundary);
            }
        }
    }
    boundaries
}
