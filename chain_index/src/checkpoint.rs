use containers::{Checkpoint, HeaderEntry, Height};
use storage::KeyValueStore;
use tracing::info;

use crate::{ChainError, ChainIndex};

/// Holds the single active checkpoint of a node.
///
/// A newly configured checkpoint is staged and only becomes active at the next
/// rebuild or resync, via [`CheckpointPolicy::activate`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CheckpointPolicy {
    active: Option<Checkpoint>,
    staged: Option<Checkpoint>,
}

impl CheckpointPolicy {
    pub fn new(initial: Option<Checkpoint>) -> Self {
        Self {
            active: None,
            staged: initial,
        }
    }

    pub fn active(&self) -> Option<&Checkpoint> {
        self.active.as_ref()
    }

    pub fn staged(&self) -> Option<&Checkpoint> {
        self.staged.as_ref()
    }

    /// Replace whatever checkpoint is pending activation.
    pub fn stage(&mut self, checkpoint: Checkpoint) {
        self.staged = Some(checkpoint);
    }

    /// Promote the staged checkpoint. Returns the checkpoint now in force.
    pub fn activate(&mut self) -> Option<&Checkpoint> {
        if let Some(staged) = self.staged.take() {
            if self.active.as_ref() != Some(&staged) {
                info!(height = staged.height.0, hash = %staged.hash, "Checkpoint activated");
            }
            self.active = Some(staged);
        }
        self.active.as_ref()
    }

    /// Entries strictly below this height may be discarded.
    pub fn retention_floor(&self) -> Option<Height> {
        self.active.map(|checkpoint| checkpoint.height)
    }

    /// Reject an entry that contradicts the active checkpoint.
    pub fn validate(&self, entry: &HeaderEntry) -> Result<(), ChainError> {
        match &self.active {
            Some(checkpoint) if checkpoint.conflicts_with(entry.height, &entry.hash) => {
                Err(ChainError::CheckpointViolation {
                    height: entry.height,
                    expected: checkpoint.hash,
                    got: entry.hash,
                })
            }
            _ => Ok(()),
        }
    }

    /// Discard history below the active checkpoint. Returns the number of
    /// entries removed; zero when there is nothing to prune yet.
    pub fn apply_retention<S: KeyValueStore>(
        &self,
        index: &ChainIndex<S>,
    ) -> Result<u64, ChainError> {
        match &self.active {
            Some(checkpoint) => index.prune_below(checkpoint),
            None => Ok(0),
        }
    }
}
