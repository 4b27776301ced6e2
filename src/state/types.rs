//! Shared and per-stream extraction state

use crate::config::PartitioningConfig;
use crate::creator::{
    DefaultFetchSizeEstimator, DefaultRowByteSizeEstimator, FetchSizeEstimator,
    RowByteSizeEstimator,
};
use crate::error::{Error, Result};
use crate::query::{SelectQuery, SelectQueryGenerator, SelectQuerySpec};
use crate::stream::Stream;
use crate::types::JsonValue;
use std::sync::{Arc, OnceLock};

/// Settings and collaborators shared by every stream of a sync.
///
/// Built once before any reader starts and never mutated afterwards.
#[derive(Debug, Clone)]
pub struct SharedState {
    /// Partitioning settings
    pub config: PartitioningConfig,
    /// Estimates the in-memory size of one row
    pub row_byte_size_estimator: Arc<dyn RowByteSizeEstimator>,
    /// Picks rows per round trip from sampled row sizes
    pub fetch_size_estimator: Arc<dyn FetchSizeEstimator>,
    /// Turns query specs into SQL
    pub query_generator: Arc<dyn SelectQueryGenerator>,
}

impl SharedState {
    /// Create shared state with the default estimators
    pub fn new(config: PartitioningConfig, query_generator: Arc<dyn SelectQueryGenerator>) -> Self {
        let fetch_size_estimator = DefaultFetchSizeEstimator::from_config(&config);
        Self {
            config,
            row_byte_size_estimator: Arc::new(DefaultRowByteSizeEstimator::default()),
            fetch_size_estimator: Arc::new(fetch_size_estimator),
            query_generator,
        }
    }

    /// Replace the row byte size estimator
    #[must_use]
    pub fn with_row_byte_size_estimator(mut self, estimator: Arc<dyn RowByteSizeEstimator>) -> Self {
        self.row_byte_size_estimator = estimator;
        self
    }

    /// Replace the fetch size estimator
    #[must_use]
    pub fn with_fetch_size_estimator(mut self, estimator: Arc<dyn FetchSizeEstimator>) -> Self {
        self.fetch_size_estimator = estimator;
        self
    }

    /// Optimize a spec and generate its query
    pub fn generate(&self, spec: SelectQuerySpec) -> SelectQuery {
        self.query_generator.generate(&spec.optimize())
    }
}

/// Per-stream state shared by the stream's partitions and readers.
///
/// The cursor upper bound and fetch size are written at most once, by the
/// coordinator while planning, before any reader is started. Readers only
/// ever read them.
#[derive(Debug)]
pub struct StreamState {
    stream: Stream,
    shared: Arc<SharedState>,
    cursor_upper_bound: OnceLock<JsonValue>,
    fetch_size: OnceLock<usize>,
}

impl StreamState {
    /// Create a new stream state
    pub fn new(stream: Stream, shared: Arc<SharedState>) -> Self {
        Self {
            stream,
            shared,
            cursor_upper_bound: OnceLock::new(),
            fetch_size: OnceLock::new(),
        }
    }

    /// The stream
    pub fn stream(&self) -> &Stream {
        &self.stream
    }

    /// Shared extraction state
    pub fn shared(&self) -> &Arc<SharedState> {
        &self.shared
    }

    /// Resolved cursor upper bound, if planning has resolved it
    pub fn cursor_upper_bound(&self) -> Option<&JsonValue> {
        self.cursor_upper_bound.get()
    }

    /// Record the cursor upper bound. Fails if it was already recorded.
    pub fn set_cursor_upper_bound(&self, value: JsonValue) -> Result<()> {
        self.cursor_upper_bound.set(value).map_err(|_| {
            Error::state(format!(
                "cursor upper bound for stream '{}' is already set",
                self.stream.label()
            ))
        })
    }

    /// Rows per round trip, if planning has estimated it
    pub fn fetch_size(&self) -> Option<usize> {
        self.fetch_size.get().copied()
    }

    /// Record the fetch size. Fails if it was already recorded.
    pub fn set_fetch_size(&self, fetch_size: usize) -> Result<()> {
        self.fetch_size.set(fetch_size).map_err(|_| {
            Error::state(format!(
                "fetch size for stream '{}' is already set",
                self.stream.label()
            ))
        })
    }

    /// Optimize a spec and generate its query
    pub fn generate(&self, spec: SelectQuerySpec) -> SelectQuery {
        self.shared.generate(spec)
    }
}
