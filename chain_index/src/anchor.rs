use containers::HeaderEntry;

use crate::ChainError;

/// Alternate chain root: two consecutive, linked entries supplied out of band.
///
/// `prev` becomes the root of the index and `tip` its first tip. Nothing
/// below `prev.height` is ever stored for a fast-synced node.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FastSyncAnchor {
    prev: HeaderEntry,
    tip: HeaderEntry,
}

impl FastSyncAnchor {
    pub fn new(prev: HeaderEntry, tip: HeaderEntry) -> Result<Self, ChainError> {
        for (name, entry) in [("prev", &prev), ("tip", &tip)] {
            if entry.hash != entry.header.hash() {
                return Err(ChainError::InvalidAnchor(format!(
                    "{name} hash {} does not match its header",
                    entry.hash
                )));
            }
        }
        if prev.height.checked_next() != Some(tip.height) || tip.height.checked_next().is_none() {
            return Err(ChainError::InvalidAnchor(format!(
                "tip height {} does not follow prev height {}",
                tip.height, prev.height
            )));
        }
        if tip.prev_hash() != prev.hash {
            return Err(ChainError::InvalidAnchor(format!(
                "tip {} does not link to prev {}",
                tip.hash, prev.hash
            )));
        }
        if tip.chain_work <= prev.chain_work {
            return Err(ChainError::InvalidAnchor(
                "cumulative work does not increase from prev to tip".to_string(),
            ));
        }
        Ok(Self { prev, tip })
    }

    pub fn prev(&self) -> &HeaderEntry {
        &self.prev
    }

    pub fn tip(&self) -> &HeaderEntry {
        &self.tip
    }
}
