use crate::{Bytes32, Height};
use serde::{Deserialize, Serialize};

/// A trusted `(height, hash)` pair.
///
/// The entry at `height` must hash to `hash`. History strictly below the
/// checkpoint may be discarded once the checkpoint is active; the checkpoint
/// entry itself becomes the effective chain root.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Checkpoint {
    pub height: Height,
    pub hash: Bytes32,
}

impl Checkpoint {
    pub fn new(height: impl Into<Height>, hash: Bytes32) -> Self {
        Self {
            height: height.into(),
            hash,
        }
    }

    /// Whether an entry at `height` with `hash` contradicts this checkpoint.
    pub fn conflicts_with(&self, height: Height, hash: &Bytes32) -> bool {
        height == self.height && *hash != self.hash
    }
}
