//! Checkpoint encoding module
//!
//! A checkpoint is the opaque, serializable answer to "how far has this
//! stream been read". Each extraction strategy has its own shapes, tagged
//! by `state_type` so a resumed sync rebuilds the right kind of partition.
//!
//! # Overview
//!
//! - `CheckpointState` - closed set of checkpoint shapes
//! - `Strategy` - extraction strategy a checkpoint belongs to

mod types;

pub use types::{CheckpointState, Strategy};
