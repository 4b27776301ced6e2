//! Streams and fields
//!
//! A [`Stream`] is one table as seen by a sync: its fields, its key and
//! cursor columns, and how it is meant to be replicated.

use crate::types::{FieldType, ReplicationMethod, SyncMode};
use serde::{Deserialize, Serialize};

/// A column of a stream
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Field {
    /// Column name
    pub id: String,
    /// Column type
    #[serde(rename = "type", default)]
    pub field_type: FieldType,
}

impl Field {
    /// Create a new field
    pub fn new(id: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            id: id.into(),
            field_type,
        }
    }
}

/// A table-like source and how it should be extracted
#[derive(Debug, Clone, PartialEq)]
pub struct Stream {
    /// Table name
    pub name: String,
    /// Schema the table lives in
    pub namespace: Option<String>,
    /// Columns to select, in output order
    pub fields: Vec<Field>,
    /// Primary key columns, in key order (may be empty)
    pub primary_key: Vec<Field>,
    /// Cursor column for standard incremental syncs
    pub cursor: Option<Field>,
    /// Sync mode
    pub sync_mode: SyncMode,
    /// Replication method for incremental syncs
    pub replication_method: ReplicationMethod,
}

impl Stream {
    /// Create a full refresh stream with no key or cursor
    pub fn new(name: impl Into<String>, namespace: Option<String>, fields: Vec<Field>) -> Self {
        Self {
            name: name.into(),
            namespace,
            fields,
            primary_key: Vec::new(),
            cursor: None,
            sync_mode: SyncMode::FullRefresh,
            replication_method: ReplicationMethod::Standard,
        }
    }

    /// Set the primary key by column name
    ///
    /// Unknown column names are ignored.
    #[must_use]
    pub fn with_primary_key(mut self, columns: &[&str]) -> Self {
        self.primary_key = columns
            .iter()
            .filter_map(|c| self.field(c).cloned())
            .collect();
        self
    }

    /// Set the cursor by column name, switching the stream to incremental
    #[must_use]
    pub fn with_cursor(mut self, column: &str) -> Self {
        self.cursor = self.field(column).cloned();
        self.sync_mode = SyncMode::Incremental;
        self
    }

    /// Set the sync mode
    #[must_use]
    pub fn with_sync_mode(mut self, sync_mode: SyncMode) -> Self {
        self.sync_mode = sync_mode;
        self
    }

    /// Set the replication method
    #[must_use]
    pub fn with_replication_method(mut self, method: ReplicationMethod) -> Self {
        self.replication_method = method;
        self
    }

    /// Look up a field by column name
    pub fn field(&self, id: &str) -> Option<&Field> {
        self.fields.iter().find(|f| f.id == id)
    }

    /// `namespace.name`, or just `name` without a namespace
    pub fn label(&self) -> String {
        match &self.namespace {
            Some(ns) => format!("{ns}.{}", self.name),
            None => self.name.clone(),
        }
    }

    /// Primary key column names
    pub fn primary_key_names(&self) -> Vec<String> {
        self.primary_key.iter().map(|f| f.id.clone()).collect()
    }
}
