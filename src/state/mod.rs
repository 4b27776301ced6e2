//! State management module
//!
//! Holds everything a sync knows besides the data itself.
//!
//! # Overview
//!
//! The state module provides:
//! - `SharedState` - read-only extraction settings shared by every stream
//! - `StreamState` - per-stream values resolved once during planning
//!   (cursor upper bound, fetch size) and read-only afterwards
//! - `CheckpointTracker` - folds per-partition checkpoints into one safe
//!   stream checkpoint
//! - `StateManager` - the set of stream checkpoints, as JSON in and out

mod manager;
mod tracker;
mod types;

pub use manager::{State, StateManager};
pub use tracker::CheckpointTracker;
pub use types::{SharedState, StreamState};

#[cfg(test)]
mod tests;
