//! Source database access
//!
//! The rest of the crate only talks to a database through two traits:
//! - `SelectQuerier` - runs a generated query and streams back rows
//! - `TableSizeEstimator` - how many bytes a table takes on disk
//!
//! `DuckDbSource` implements both on top of DuckDB, which reaches
//! PostgreSQL, MySQL and SQLite through its extensions.

mod duckdb;
#[cfg(test)]
pub(crate) mod testing;

pub use self::duckdb::{DuckDbSource, TableRef};

use crate::error::Result;
use crate::query::SelectQuery;
use crate::stream::Stream;
use crate::types::JsonObject;
use async_trait::async_trait;
use futures::stream::BoxStream;

/// Rows of a query result, one JSON object per row
pub type RowStream = BoxStream<'static, Result<JsonObject>>;

/// Runs select queries
#[async_trait]
pub trait SelectQuerier: Send + Sync {
    /// Execute `query`, fetching `fetch_size` rows per round trip when set
    async fn select(&self, query: SelectQuery, fetch_size: Option<usize>) -> Result<RowStream>;
}

/// Estimates table sizes
#[async_trait]
pub trait TableSizeEstimator: Send + Sync {
    /// Size of the stream's table in bytes, or 0 when unknown
    async fn table_byte_size(&self, stream: &Stream) -> Result<u64>;
}
