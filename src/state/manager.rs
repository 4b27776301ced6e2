//! State manager implementation
//!
//! Holds stream checkpoints in memory. State comes in as JSON and goes out
//! as JSON; where it is kept between runs is up to the caller.

use crate::checkpoint::CheckpointState;
use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::Path;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Checkpoints for all streams, keyed by stream label (`namespace.name`)
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct State {
    #[serde(default)]
    pub streams: BTreeMap<String, CheckpointState>,
}

impl State {
    /// Create empty state
    pub fn new() -> Self {
        Self::default()
    }
}

/// Thread-safe holder of the current sync state
#[derive(Debug, Clone, Default)]
pub struct StateManager {
    state: Arc<RwLock<State>>,
}

impl StateManager {
    /// Create a state manager with no checkpoints
    pub fn in_memory() -> Self {
        Self::default()
    }

    /// Create a state manager from inline JSON string
    pub fn from_json(json: &str) -> Result<Self> {
        let state: State = serde_json::from_str(json).map_err(|e| Error::State {
            message: format!("Failed to parse state JSON: {e}"),
        })?;

        Ok(Self {
            state: Arc::new(RwLock::new(state)),
        })
    }

    /// Create a state manager from a JSON state file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let contents = std::fs::read_to_string(path.as_ref()).map_err(|e| Error::State {
            message: format!("Failed to read state file: {e}"),
        })?;
        Self::from_json(&contents)
    }

    /// Checkpoint of a stream
    pub async fn get(&self, stream: &str) -> Option<CheckpointState> {
        self.state.read().await.streams.get(stream).cloned()
    }

    /// Replace the checkpoint of a stream
    pub async fn set(&self, stream: &str, checkpoint: CheckpointState) {
        self.state
            .write()
            .await
            .streams
            .insert(stream.to_string(), checkpoint);
    }

    /// Drop the checkpoint of a stream
    pub async fn clear_stream(&self, stream: &str) {
        self.state.write().await.streams.remove(stream);
    }

    /// Drop all checkpoints
    pub async fn clear(&self) {
        self.state.write().await.streams.clear();
    }

    /// Snapshot of the current state
    pub async fn snapshot(&self) -> State {
        self.state.read().await.clone()
    }

    /// Serialize current state to JSON
    pub async fn to_json(&self) -> Result<String> {
        let state = self.state.read().await;
        serde_json::to_string(&*state).map_err(|e| Error::State {
            message: format!("Failed to serialize state: {e}"),
        })
    }

    /// Serialize current state to pretty JSON
    pub async fn to_json_pretty(&self) -> Result<String> {
        let state = self.state.read().await;
        serde_json::to_string_pretty(&*state).map_err(|e| Error::State {
            message: format!("Failed to serialize state: {e}"),
        })
    }
}
