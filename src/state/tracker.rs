//! Stream checkpoint tracking across concurrent partition readers

use crate::checkpoint::CheckpointState;
use crate::error::{Error, Result};

#[derive(Debug, Clone, PartialEq)]
enum Slot {
    Pending,
    InProgress(CheckpointState),
    Complete(CheckpointState),
    Failed(Option<CheckpointState>),
}

/// Folds per-partition checkpoints into one stream checkpoint.
///
/// Partitions are registered in key order, one slot each. The stream
/// checkpoint is the state of the longest run of completed slots from the
/// start, extended by the last reported position of the first slot that is
/// not complete. Nothing past that point is ever reported, so a failed or
/// slow partition cannot let the stream skip rows it has not confirmed.
#[derive(Debug, Clone)]
pub struct CheckpointTracker {
    slots: Vec<Slot>,
}

impl CheckpointTracker {
    /// Create a tracker for `partitions` partitions, all pending
    pub fn new(partitions: usize) -> Self {
        Self {
            slots: vec![Slot::Pending; partitions],
        }
    }

    /// Number of tracked partitions
    pub fn len(&self) -> usize {
        self.slots.len()
    }

    /// Whether no partitions are tracked
    pub fn is_empty(&self) -> bool {
        self.slots.is_empty()
    }

    /// Record an intermediate checkpoint for a partition
    pub fn report_progress(&mut self, index: usize, state: CheckpointState) -> Result<()> {
        let slot = self.slot_mut(index)?;
        match slot {
            Slot::Pending | Slot::InProgress(_) => {
                *slot = Slot::InProgress(state);
                Ok(())
            }
            Slot::Complete(_) | Slot::Failed(_) => Err(Error::checkpoint(format!(
                "partition {index} reported progress after finishing"
            ))),
        }
    }

    /// Record the completion checkpoint for a partition
    pub fn report_complete(&mut self, index: usize, state: CheckpointState) -> Result<()> {
        let slot = self.slot_mut(index)?;
        match slot {
            Slot::Pending | Slot::InProgress(_) => {
                *slot = Slot::Complete(state);
                Ok(())
            }
            Slot::Complete(_) | Slot::Failed(_) => Err(Error::checkpoint(format!(
                "partition {index} completed twice"
            ))),
        }
    }

    /// Mark a partition failed, keeping its last reported position
    pub fn report_failed(&mut self, index: usize) -> Result<()> {
        let slot = self.slot_mut(index)?;
        let last = match slot {
            Slot::InProgress(state) => Some(state.clone()),
            Slot::Pending | Slot::Failed(_) => None,
            Slot::Complete(_) => return Ok(()),
        };
        *slot = Slot::Failed(last);
        Ok(())
    }

    /// The checkpoint the stream may safely resume from, if any
    pub fn stream_checkpoint(&self) -> Option<CheckpointState> {
        let mut checkpoint = None;
        for slot in &self.slots {
            match slot {
                Slot::Complete(state) => checkpoint = Some(state.clone()),
                Slot::InProgress(state) | Slot::Failed(Some(state)) => {
                    return Some(state.clone());
                }
                Slot::Pending | Slot::Failed(None) => return checkpoint,
            }
        }
        checkpoint
    }

    /// Whether every partition has completed
    pub fn is_complete(&self) -> bool {
        self.slots.iter().all(|s| matches!(s, Slot::Complete(_)))
    }

    /// Whether any partition has failed
    pub fn has_failures(&self) -> bool {
        self.slots.iter().any(|s| matches!(s, Slot::Failed(_)))
    }

    fn slot_mut(&mut self, index: usize) -> Result<&mut Slot> {
        let len = self.slots.len();
        self.slots.get_mut(index).ok_or_else(|| {
            Error::checkpoint(format!(
                "partition index {index} out of range ({len} partitions)"
            ))
        })
    }
}
