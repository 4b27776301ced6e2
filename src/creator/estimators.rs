//! Row size and fetch size estimation

use super::sample::{Sample, SampleKind};
use crate::config::{FetchConfig, PartitioningConfig};
use crate::types::JsonObject;
use std::fmt::Debug;

/// Estimates how many bytes a row takes in memory once read
pub trait RowByteSizeEstimator: Send + Sync + Debug {
    /// Estimated size of `row`, in bytes
    fn estimate(&self, row: &JsonObject) -> u64;
}

/// Picks how many rows to fetch per round trip
pub trait FetchSizeEstimator: Send + Sync + Debug {
    /// Fetch size for a sample of row byte sizes
    fn estimate(&self, row_byte_sizes: &Sample<u64>) -> usize;
}

/// Sums a fixed per-row overhead and, per column, a fixed overhead plus the
/// lengths of the column name and of the JSON-encoded value.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DefaultRowByteSizeEstimator {
    /// Bytes added once per row
    pub record_overhead_bytes: u64,
    /// Bytes added once per column
    pub field_overhead_bytes: u64,
}

impl Default for DefaultRowByteSizeEstimator {
    fn default() -> Self {
        Self {
            record_overhead_bytes: 16,
            field_overhead_bytes: 16,
        }
    }
}

impl RowByteSizeEstimator for DefaultRowByteSizeEstimator {
    fn estimate(&self, row: &JsonObject) -> u64 {
        row.iter().fold(self.record_overhead_bytes, |total, (name, value)| {
            total + self.field_overhead_bytes + name.len() as u64 + value.to_string().len() as u64
        })
    }
}

/// Sizes fetches so that every concurrent reader's in-flight rows together
/// stay within a share of the memory budget, assuming the largest sampled
/// row is typical.
#[derive(Debug, Clone, PartialEq)]
pub struct DefaultFetchSizeEstimator {
    config: FetchConfig,
    max_concurrency: usize,
}

impl DefaultFetchSizeEstimator {
    /// Create an estimator
    pub fn new(config: FetchConfig, max_concurrency: usize) -> Self {
        Self {
            config,
            max_concurrency: max_concurrency.max(1),
        }
    }

    /// Create an estimator from partitioning settings
    pub fn from_config(config: &PartitioningConfig) -> Self {
        Self::new(config.fetch.clone(), config.max_concurrency)
    }
}

impl FetchSizeEstimator for DefaultFetchSizeEstimator {
    fn estimate(&self, row_byte_sizes: &Sample<u64>) -> usize {
        let max_row_bytes = row_byte_sizes.sampled_values.iter().copied().max();
        let max_row_bytes = match (row_byte_sizes.kind, max_row_bytes) {
            (SampleKind::Empty, _) | (_, None) => return self.config.default_fetch_size,
            (_, Some(bytes)) => bytes.max(1),
        };
        let budget = self.config.memory_budget_bytes as f64 * self.config.capacity_ratio
            / self.max_concurrency as f64;
        let fetch_size = (budget / max_row_bytes as f64).floor();
        let fetch_size = if fetch_size.is_finite() && fetch_size > 0.0 {
            fetch_size as usize
        } else {
            0
        };
        fetch_size
            .max(self.config.min_fetch_size)
            .min(self.config.max_fetch_size)
    }
}
