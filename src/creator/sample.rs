//! Bounded table sampling

use crate::error::Result;
use crate::query::SelectQuery;
use crate::source::SelectQuerier;
use crate::types::JsonObject;
use futures::TryStreamExt;

/// Sampling rates tried in order, as powers of two: 1/65536, 1/256, 1/1
const SAMPLE_RATES_INV_POW2: [(u32, SampleKind); 3] = [
    (16, SampleKind::Large),
    (8, SampleKind::Medium),
    (0, SampleKind::Small),
];

/// How big the sampled table looked
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SampleKind {
    /// No rows at all
    Empty,
    /// Fewer rows than the sample size, even reading everything
    Tiny,
    /// Sample filled reading every row
    Small,
    /// Sample filled reading 1 row in 256
    Medium,
    /// Sample filled reading 1 row in 65536
    Large,
}

/// A bounded sample of values derived from table rows
#[derive(Debug, Clone, PartialEq)]
pub struct Sample<T> {
    /// One value per sampled row, in row order
    pub sampled_values: Vec<T>,
    /// Sample kind
    pub kind: SampleKind,
    /// Approximate number of table rows each sampled row stands for
    pub value_weight: u64,
}

impl<T> Sample<T> {
    /// The empty sample
    pub fn empty() -> Self {
        Self {
            sampled_values: Vec::new(),
            kind: SampleKind::Empty,
            value_weight: 0,
        }
    }

    /// Whether no rows were sampled
    pub fn is_empty(&self) -> bool {
        self.kind == SampleKind::Empty
    }

    /// Approximate number of rows in the sampled table
    pub fn estimated_row_count(&self) -> u64 {
        (self.sampled_values.len() as u64).saturating_mul(self.value_weight)
    }

    /// Transform every sampled value, keeping kind and weight
    pub fn map<U>(&self, f: impl FnMut(&T) -> U) -> Sample<U> {
        Sample {
            sampled_values: self.sampled_values.iter().map(f).collect(),
            kind: self.kind,
            value_weight: self.value_weight,
        }
    }
}

/// Draw a sample of at most `max_sample_size` rows.
///
/// Sparse Bernoulli samples are tried first so large tables are never
/// scanned in full; the first rate that fills the sample wins. If even a
/// full read does not fill it, the table is tiny (or empty).
pub async fn collect_sample<T>(
    querier: &dyn SelectQuerier,
    max_sample_size: usize,
    query_for_rate: impl Fn(u32) -> SelectQuery,
    mut map_row: impl FnMut(&JsonObject) -> T,
) -> Result<Sample<T>> {
    let mut values = Vec::new();
    for (rate, kind) in SAMPLE_RATES_INV_POW2 {
        let query = query_for_rate(rate);
        tracing::debug!("Sampling at 1/2^{}: {}", rate, query.sql);

        values = Vec::with_capacity(max_sample_size);
        let mut rows = querier.select(query, None).await?;
        while let Some(row) = rows.try_next().await? {
            values.push(map_row(&row));
            if values.len() >= max_sample_size {
                break;
            }
        }

        if values.len() >= max_sample_size {
            return Ok(Sample {
                sampled_values: values,
                kind,
                value_weight: 1u64 << rate,
            });
        }
    }

    if values.is_empty() {
        return Ok(Sample::empty());
    }
    Ok(Sample {
        sampled_values: values,
        kind: SampleKind::Tiny,
        value_weight: 1,
    })
}
