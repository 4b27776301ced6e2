//! Scripted source doubles for unit tests

use super::{RowStream, SelectQuerier, TableSizeEstimator};
use crate::error::Result;
use crate::query::SelectQuery;
use crate::stream::Stream;
use crate::types::JsonObject;
use async_trait::async_trait;
use futures::StreamExt;
use std::sync::{Arc, Mutex};

type Responder = dyn Fn(&SelectQuery) -> Vec<JsonObject> + Send + Sync;

/// Answers queries from a closure and remembers their SQL
pub struct ScriptedQuerier {
    responder: Box<Responder>,
    executed: Arc<Mutex<Vec<String>>>,
}

impl ScriptedQuerier {
    pub fn new(responder: impl Fn(&SelectQuery) -> Vec<JsonObject> + Send + Sync + 'static) -> Self {
        Self {
            responder: Box::new(responder),
            executed: Arc::new(Mutex::new(Vec::new())),
        }
    }

    pub fn executed(&self) -> Vec<String> {
        self.executed.lock().map(|e| e.clone()).unwrap_or_default()
    }
}

#[async_trait]
impl SelectQuerier for ScriptedQuerier {
    async fn select(&self, query: SelectQuery, _fetch_size: Option<usize>) -> Result<RowStream> {
        if let Ok(mut executed) = self.executed.lock() {
            executed.push(query.sql.clone());
        }
        let rows = (self.responder)(&query);
        Ok(futures::stream::iter(rows.into_iter().map(Ok)).boxed())
    }
}

/// Reports the same size for every table
pub struct FixedTableSize(pub u64);

#[async_trait]
impl TableSizeEstimator for FixedTableSize {
    async fn table_byte_size(&self, _stream: &Stream) -> Result<u64> {
        Ok(self.0)
    }
}
