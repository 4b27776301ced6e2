//! Query description module
//!
//! Partitions never write SQL. They describe the query they need as a
//! [`SelectQuerySpec`], and a [`SelectQueryGenerator`] turns that into an
//! executable [`SelectQuery`] with bound parameters.
//!
//! # Overview
//!
//! - `SelectQuerySpec` - select list, source table (or sample), where tree,
//!   ordering and limit
//! - `WhereClauseNode` - AND/OR tree over comparison leaves
//! - `AnsiQueryGenerator` - double-quoted identifiers, `?` placeholders,
//!   DuckDB `USING SAMPLE` for sampled reads

mod generator;
mod types;

pub use generator::{AnsiQueryGenerator, SelectQueryGenerator};
pub use types::{
    Binding, FromNode, SelectNode, SelectQuery, SelectQuerySpec, WhereClauseNode,
};
