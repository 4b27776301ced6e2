//! Common types used throughout the SQL source
//!
//! This module contains shared type definitions, type aliases,
//! and utility types used across multiple modules.

use serde::{Deserialize, Serialize};

// ============================================================================
// Type Aliases
// ============================================================================

/// JSON value type (re-exported from serde_json)
pub type JsonValue = serde_json::Value;

/// JSON object type, one per row read from the source
pub type JsonObject = serde_json::Map<String, JsonValue>;

// ============================================================================
// Sync Mode
// ============================================================================

/// Synchronization mode for streams
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SyncMode {
    /// Full refresh - read the whole table every time
    #[default]
    FullRefresh,
    /// Incremental - snapshot once, then only read new/updated rows
    Incremental,
}

// ============================================================================
// Replication Method
// ============================================================================

/// How an incremental stream follows changes after its first snapshot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ReplicationMethod {
    /// Cursor column comparison (`cursor > last seen value`)
    #[default]
    Standard,
    /// Log-based replication; only the initial snapshot is read here
    LogReplication,
}

// ============================================================================
// Field Type
// ============================================================================

/// Coarse column type, used to bind checkpoint values back into queries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FieldType {
    Boolean,
    Integer,
    Number,
    #[default]
    String,
    Date,
    Timestamp,
    Binary,
    Json,
    Unknown,
}

impl FieldType {
    /// Map a SQL type name (as reported by DuckDB's catalog) to a field type
    pub fn from_sql_type(sql_type: &str) -> Self {
        let upper = sql_type.trim().to_uppercase();
        let base = upper.split('(').next().unwrap_or_default().trim();
        match base {
            "BOOLEAN" | "BOOL" => Self::Boolean,
            "TINYINT" | "SMALLINT" | "INTEGER" | "INT" | "BIGINT" | "HUGEINT" | "UTINYINT"
            | "USMALLINT" | "UINTEGER" | "UBIGINT" => Self::Integer,
            "FLOAT" | "REAL" | "DOUBLE" | "DECIMAL" | "NUMERIC" => Self::Number,
            "VARCHAR" | "TEXT" | "CHAR" | "BPCHAR" | "STRING" | "UUID" => Self::String,
            "DATE" => Self::Date,
            "BLOB" | "BYTEA" | "VARBINARY" => Self::Binary,
            "JSON" => Self::Json,
            t if t.starts_with("TIMESTAMP") || t == "DATETIME" => Self::Timestamp,
            _ => Self::Unknown,
        }
    }

    /// SQL type a bound parameter of this type must be cast to, if any.
    ///
    /// Checkpoint values travel as JSON, so dates and timestamps come back
    /// as strings and need an explicit cast to compare correctly. Decimals
    /// also travel as exact text but take no cast: the column's own type
    /// converts them, where a bare `DECIMAL` cast would round.
    pub fn cast_type(self) -> Option<&'static str> {
        match self {
            Self::Date => Some("DATE"),
            Self::Timestamp => Some("TIMESTAMP"),
            _ => None,
        }
    }
}

// ============================================================================
// Creator Mode
// ============================================================================

/// How a stream's partition is turned into readers
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CreatorMode {
    /// Sample, split and read sub-partitions concurrently
    #[default]
    Concurrent,
    /// One resumable reader checkpointing after each batch
    Sequential,
}
