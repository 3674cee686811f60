use containers::block_proof;
use storage::{Column, KeyValueStore};

use crate::{ChainError, ChainIndex};

impl<S: KeyValueStore> ChainIndex<S> {
    /// Walk back from the tip and check the persisted chain for internal
    /// consistency: cached hashes, the height index, parent linkage and
    /// cumulative work.
    ///
    /// `depth == 0` checks every entry down to the root and also that the
    /// height index holds nothing outside `[root, tip]`. Returns the number
    /// of entries checked.
    pub fn verify(&self, depth: u64) -> Result<u64, ChainError> {
        let (root, tip) = match (self.root(), self.tip()) {
            (Some(root), Some(tip)) => (root, tip),
            _ => return Ok(0),
        };
        let span = tip.height.0 - root.height.0 + 1;
        let mut remaining = if depth == 0 { span } else { depth.min(span) };

        let mut current = tip;
        let mut checked = 0u64;
        while remaining > 0 {
            if current.header.hash() != current.hash {
                return Err(ChainError::Corrupt(format!(
                    "hash mismatch at height {}",
                    current.height
                )));
            }
            if self.hash_at(current.height)? != Some(current.hash) {
                return Err(ChainError::Corrupt(format!(
                    "height index mismatch at {}",
                    current.height
                )));
            }
            checked += 1;
            remaining -= 1;
            if current.height <= root.height || remaining == 0 {
                break;
            }

            let parent = self.entry_by_hash(&current.prev_hash())?.ok_or_else(|| {
                ChainError::Corrupt(format!("missing parent of height {}", current.height))
            })?;
            if parent.height.next() != current.height {
                return Err(ChainError::Corrupt(format!(
                    "parent height mismatch at {}",
                    current.height
                )));
            }
            let proof = block_proof(current.header.bits)
                .map_err(|err| ChainError::Corrupt(err.to_string()))?;
            if parent.chain_work.saturating_add(proof) != current.chain_work {
                return Err(ChainError::Corrupt(format!(
                    "chain work mismatch at height {}",
                    current.height
                )));
            }
            current = parent;
        }

        if depth == 0 {
            let keys = self.store().scan_prefix(Column::HeightIndex, &[])?;
            if keys.len() as u64 != span {
                return Err(ChainError::Corrupt(format!(
                    "height index holds {} keys for {span} entries",
                    keys.len()
                )));
            }
        }

        Ok(checked)
    }
}
