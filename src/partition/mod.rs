//! Partition module
//!
//! Supports: full refresh snapshots, snapshots followed by cursor reads,
//! cursor incremental reads, and log replication initial snapshots
//!
//! # Overview
//!
//! A partition is a range of a stream over ordered checkpoint columns
//! (the primary key, or the cursor). Partitions can be:
//! - Queried in one go, or in key order a batch at a time
//! - Split at sampled boundaries into adjacent, non-overlapping ranges
//! - Turned into a checkpoint, mid-way or once fully read
//!
//! A checkpoint can in turn be turned back into the partition covering
//! what is left to read.

mod factory;
mod predicate;
mod types;

pub use factory::PartitionFactory;
pub use predicate::{bound_predicate, KeyRange};
pub use types::{
    CursorIncremental, InitialSnapshot, NonResumableSnapshot, NonResumableSnapshotWithCursor,
    Partition, RfrSnapshot, SnapshotWithCursor, SplittableSnapshotWithCursor,
};

#[cfg(test)]
mod tests;
