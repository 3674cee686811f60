use containers::{Bytes32, Checkpoint, HeaderEntry, Height};
use parking_lot::{Mutex, RwLock, RwLockReadGuard};
use storage::{Column, KeyValueStore, WriteBatch};
use tracing::{debug, info, warn};

use crate::{ChainError, FastSyncAnchor};

/// Upper bound on hashes in a block locator.
pub const MAX_LOCATOR_HASHES: usize = 32;

/// Number of locator hashes taken one by one before the step starts doubling.
const LOCATOR_DENSE_PREFIX: usize = 10;

const META_TIP: &[u8] = b"tip";
const META_ROOT: &[u8] = b"root";

#[derive(Clone, Debug, Default)]
struct Pointers {
    root: Option<HeaderEntry>,
    tip: Option<HeaderEntry>,
}

/// Durable header chain addressed by height and by hash.
///
/// Layout in the store:
/// - `header_entry`: hash -> encoded [`HeaderEntry`]
/// - `height_index`: big-endian height -> hash
/// - `meta`: `tip` and `root` hashes
///
/// Every mutation is one atomic [`WriteBatch`]. Mutations serialize on an
/// internal writer lock and commit their batch while holding the pointer
/// lock exclusively, so a reader sees the root and tip either before or after
/// a write, never a pointer to an entry that is not (or no longer) stored.
/// Use [`snapshot`](Self::snapshot) to resolve several lookups against the
/// same state.
pub struct ChainIndex<S> {
    store: S,
    pointers: RwLock<Pointers>,
    writer: Mutex<()>,
}

impl<S: KeyValueStore> ChainIndex<S> {
    /// Load the persisted root and tip, if any.
    pub fn open(store: S) -> Result<Self, ChainError> {
        let root = load_pointer(&store, META_ROOT)?;
        let tip = load_pointer(&store, META_TIP)?;
        if root.is_some() != tip.is_some() {
            return Err(ChainError::Corrupt(
                "root and tip pointers disagree".to_string(),
            ));
        }
        if let (Some(root), Some(tip)) = (&root, &tip) {
            info!(
                root = root.height.0,
                tip = tip.height.0,
                hash = %tip.hash,
                "Loaded chain index"
            );
        }
        Ok(Self {
            store,
            pointers: RwLock::new(Pointers { root, tip }),
            writer: Mutex::new(()),
        })
    }

    pub fn store(&self) -> &S {
        &self.store
    }

    pub fn is_empty(&self) -> bool {
        self.pointers.read().tip.is_none()
    }

    /// Highest entry on the active chain, `None` before initialization.
    pub fn tip(&self) -> Option<HeaderEntry> {
        self.pointers.read().tip.clone()
    }

    /// Lowest retained entry: genesis, the fast-sync `prev`, or the checkpoint
    /// entry once history below it has been pruned.
    pub fn root(&self) -> Option<HeaderEntry> {
        self.pointers.read().root.clone()
    }

    pub fn entry_by_hash(&self, hash: &Bytes32) -> Result<Option<HeaderEntry>, ChainError> {
        let bytes = self.store.get(Column::HeaderEntry, hash.as_bytes())?;
        bytes.map(|bytes| decode_entry(&bytes)).transpose()
    }

    /// Entry at `height`; "not found" for anything outside `[root, tip]`.
    pub fn entry_by_height(&self, height: Height) -> Result<Option<HeaderEntry>, ChainError> {
        self.snapshot().entry_by_height(height)
    }

    /// Consistent read view. Writers block until it is dropped, so keep it
    /// short-lived.
    pub fn snapshot(&self) -> IndexSnapshot<'_, S> {
        IndexSnapshot {
            index: self,
            pointers: self.pointers.read(),
        }
    }

    /// Root an empty index at the network's genesis entry.
    pub fn init_genesis(&self, genesis: HeaderEntry) -> Result<(), ChainError> {
        let _guard = self.writer.lock();
        if !self.is_empty() {
            return Err(ChainError::InvalidAnchor(
                "index already initialized".to_string(),
            ));
        }
        if genesis.height != Height::GENESIS {
            return Err(ChainError::InvalidAnchor(format!(
                "genesis entry at height {}",
                genesis.height
            )));
        }

        let mut batch = WriteBatch::new();
        put_entry(&mut batch, &genesis);
        batch.put(Column::Meta, META_ROOT, genesis.hash.as_bytes().to_vec());
        batch.put(Column::Meta, META_TIP, genesis.hash.as_bytes().to_vec());
        self.commit(&batch, |pointers| {
            pointers.root = Some(genesis.clone());
            pointers.tip = Some(genesis.clone());
        })?;

        info!(hash = %genesis.hash, "Initialized chain index from genesis");
        Ok(())
    }

    /// Root an empty index at a fast-sync anchor instead of genesis.
    pub fn init_with_anchor(&self, anchor: &FastSyncAnchor) -> Result<(), ChainError> {
        let _guard = self.writer.lock();
        if !self.is_empty() {
            return Err(ChainError::InvalidAnchor(
                "anchor requires an empty index".to_string(),
            ));
        }
        let (prev, tip) = (anchor.prev(), anchor.tip());

        let mut batch = WriteBatch::new();
        put_entry(&mut batch, prev);
        put_entry(&mut batch, tip);
        batch.put(Column::Meta, META_ROOT, prev.hash.as_bytes().to_vec());
        batch.put(Column::Meta, META_TIP, tip.hash.as_bytes().to_vec());
        self.commit(&batch, |pointers| {
            pointers.root = Some(prev.clone());
            pointers.tip = Some(tip.clone());
        })?;

        info!(
            root = prev.height.0,
            tip = tip.height.0,
            hash = %tip.hash,
            "Initialized chain index from fast-sync anchor"
        );
        Ok(())
    }

    /// Append one entry at `tip.height + 1`.
    ///
    /// Returns `false` when the identical entry is already present.
    pub fn insert(&self, entry: HeaderEntry) -> Result<bool, ChainError> {
        Ok(self.extend(std::slice::from_ref(&entry))? == 1)
    }

    /// Append a run of consecutive entries in one atomic write.
    ///
    /// Leading entries already present with the same hash are skipped. Either
    /// every remaining entry is persisted or none is. Returns how many entries
    /// were appended.
    pub fn extend(&self, entries: &[HeaderEntry]) -> Result<usize, ChainError> {
        let _guard = self.writer.lock();
        let mut cursor = self.tip().ok_or(ChainError::NotInitialized)?;
        let mut appended: Vec<&HeaderEntry> = Vec::new();

        for entry in entries {
            if appended.is_empty() && entry.height <= cursor.height {
                match self.hash_at(entry.height)? {
                    Some(existing) if existing == entry.hash => continue,
                    Some(existing) => {
                        return Err(ChainError::Duplicate {
                            height: entry.height,
                            existing,
                            incoming: entry.hash,
                        });
                    }
                    None => {
                        return Err(ChainError::Linkage {
                            height: entry.height,
                            hash: entry.hash,
                            tip: cursor.hash,
                        });
                    }
                }
            }
            if entry.height != cursor.height.next() || entry.prev_hash() != cursor.hash {
                return Err(ChainError::Linkage {
                    height: entry.height,
                    hash: entry.hash,
                    tip: cursor.hash,
                });
            }
            appended.push(entry);
            cursor = entry.clone();
        }

        if appended.is_empty() {
            return Ok(0);
        }

        let mut batch = WriteBatch::new();
        for entry in &appended {
            put_entry(&mut batch, entry);
        }
        batch.put(Column::Meta, META_TIP, cursor.hash.as_bytes().to_vec());
        self.commit(&batch, |pointers| pointers.tip = Some(cursor.clone()))?;

        debug!(
            count = appended.len(),
            tip = cursor.height.0,
            hash = %cursor.hash,
            "Extended chain index"
        );
        Ok(appended.len())
    }

    /// Truncate so that the entry at `height` becomes the tip.
    pub fn reset(&self, height: Height) -> Result<HeaderEntry, ChainError> {
        let _guard = self.writer.lock();
        let (root, tip) = match (self.root(), self.tip()) {
            (Some(root), Some(tip)) => (root, tip),
            _ => return Err(ChainError::NotInitialized),
        };
        if height < root.height || height > tip.height {
            return Err(ChainError::Range {
                height,
                root: root.height,
                tip: tip.height,
            });
        }
        if height == tip.height {
            return Ok(tip);
        }

        let target = self
            .entry_by_height(height)?
            .ok_or_else(|| ChainError::Corrupt(format!("missing entry at height {height}")))?;

        let mut batch = WriteBatch::new();
        for removed in (height.0 + 1)..=tip.height.0 {
            self.delete_height(&mut batch, Height(removed))?;
        }
        batch.put(Column::Meta, META_TIP, target.hash.as_bytes().to_vec());
        self.commit(&batch, |pointers| pointers.tip = Some(target.clone()))?;

        warn!(
            from = tip.height.0,
            to = height.0,
            hash = %target.hash,
            "Chain index reset"
        );
        Ok(target)
    }

    /// Drop every entry strictly below `checkpoint` and make the checkpoint
    /// entry the new root.
    ///
    /// Nothing happens while the tip is still below the checkpoint or the
    /// root is already at or above it. Returns the number of entries removed.
    pub fn prune_below(&self, checkpoint: &Checkpoint) -> Result<u64, ChainError> {
        let _guard = self.writer.lock();
        let (root, tip) = match (self.root(), self.tip()) {
            (Some(root), Some(tip)) => (root, tip),
            _ => return Err(ChainError::NotInitialized),
        };
        if root.height >= checkpoint.height || tip.height < checkpoint.height {
            return Ok(0);
        }

        let new_root = self.entry_by_height(checkpoint.height)?.ok_or_else(|| {
            ChainError::Corrupt(format!("missing entry at height {}", checkpoint.height))
        })?;
        if new_root.hash != checkpoint.hash {
            return Err(ChainError::CheckpointViolation {
                height: checkpoint.height,
                expected: checkpoint.hash,
                got: new_root.hash,
            });
        }

        let mut batch = WriteBatch::new();
        for removed in root.height.0..checkpoint.height.0 {
            self.delete_height(&mut batch, Height(removed))?;
        }
        batch.put(Column::Meta, META_ROOT, new_root.hash.as_bytes().to_vec());
        self.commit(&batch, |pointers| pointers.root = Some(new_root.clone()))?;

        let removed = checkpoint.height.0 - root.height.0;
        info!(
            removed,
            root = new_root.height.0,
            hash = %new_root.hash,
            "Pruned history below checkpoint"
        );
        Ok(removed)
    }

    /// Block locator for the current tip: dense near the tip, exponentially
    /// sparser further back, always ending at the root.
    pub fn locator(&self) -> Result<Vec<Bytes32>, ChainError> {
        let (root, tip) = match (self.root(), self.tip()) {
            (Some(root), Some(tip)) => (root, tip),
            _ => return Err(ChainError::NotInitialized),
        };

        let mut hashes = Vec::new();
        let mut height = tip.height.0;
        let mut step = 1u64;
        loop {
            if hashes.len() == MAX_LOCATOR_HASHES - 1 {
                break;
            }
            match self.hash_at(Height(height))? {
                Some(hash) => hashes.push(hash),
                None => break,
            }
            if height <= root.height.0 {
                return Ok(hashes);
            }
            if hashes.len() >= LOCATOR_DENSE_PREFIX {
                step = step.saturating_mul(2);
            }
            height = height.saturating_sub(step).max(root.height.0);
        }
        hashes.push(root.hash);
        Ok(hashes)
    }

    /// Timestamps of `entry` and up to `count - 1` of its ancestors, oldest
    /// first. Stops early at the root.
    pub fn ancestor_times(&self, entry: &HeaderEntry, count: usize) -> Result<Vec<u32>, ChainError> {
        let root_height = self.root().map(|root| root.height).unwrap_or_default();
        let mut times = Vec::with_capacity(count);
        let mut current = Some(entry.clone());
        while let Some(entry) = current {
            if times.len() == count {
                break;
            }
            times.push(entry.time());
            if entry.height <= root_height {
                break;
            }
            current = self.entry_by_hash(&entry.prev_hash())?;
        }
        times.reverse();
        Ok(times)
    }

    pub(crate) fn hash_at(&self, height: Height) -> Result<Option<Bytes32>, ChainError> {
        let bytes = self.store.get(Column::HeightIndex, &height.to_key())?;
        bytes
            .map(|bytes| {
                Bytes32::from_slice(&bytes).ok_or_else(|| {
                    ChainError::Corrupt(format!("bad hash length at height {height}"))
                })
            })
            .transpose()
    }

    /// Write `batch` and update the cached pointers under one exclusive
    /// guard. The pointers are left alone when the write fails.
    fn commit(
        &self,
        batch: &WriteBatch,
        update: impl FnOnce(&mut Pointers),
    ) -> Result<(), ChainError> {
        let mut pointers = self.pointers.write();
        self.store.write_batch(batch)?;
        update(&mut *pointers);
        Ok(())
    }

    fn delete_height(&self, batch: &mut WriteBatch, height: Height) -> Result<(), ChainError> {
        if let Some(hash) = self.hash_at(height)? {
            batch.delete(Column::HeaderEntry, hash.as_bytes().to_vec());
        }
        batch.delete(Column::HeightIndex, height.to_key());
        Ok(())
    }
}

/// Read view pinned to one root/tip pair.
///
/// While a snapshot is alive no write can commit, so every entry between its
/// root and tip stays resolvable by height and by hash.
pub struct IndexSnapshot<'a, S> {
    index: &'a ChainIndex<S>,
    pointers: RwLockReadGuard<'a, Pointers>,
}

impl<S: KeyValueStore> IndexSnapshot<'_, S> {
    pub fn tip(&self) -> Option<&HeaderEntry> {
        self.pointers.tip.as_ref()
    }

    pub fn root(&self) -> Option<&HeaderEntry> {
        self.pointers.root.as_ref()
    }

    pub fn entry_by_hash(&self, hash: &Bytes32) -> Result<Option<HeaderEntry>, ChainError> {
        self.index.entry_by_hash(hash)
    }

    pub fn entry_by_height(&self, height: Height) -> Result<Option<HeaderEntry>, ChainError> {
        match (&self.pointers.root, &self.pointers.tip) {
            (Some(root), Some(tip)) if height >= root.height && height <= tip.height => {}
            _ => return Ok(None),
        }
        match self.index.hash_at(height)? {
            Some(hash) => self.index.entry_by_hash(&hash),
            None => Ok(None),
        }
    }
}

fn put_entry(batch: &mut WriteBatch, entry: &HeaderEntry) {
    batch.put(Column::HeaderEntry, entry.hash.as_bytes().to_vec(), entry.encode());
    batch.put(Column::HeightIndex, entry.height.to_key(), entry.hash.as_bytes().to_vec());
}

fn decode_entry(bytes: &[u8]) -> Result<HeaderEntry, ChainError> {
    HeaderEntry::decode(bytes).map_err(|err| ChainError::Corrupt(err.to_string()))
}

fn load_pointer<S: KeyValueStore>(store: &S, key: &[u8]) -> Result<Option<HeaderEntry>, ChainError> {
    let Some(hash) = store.get(Column::Meta, key)? else {
        return Ok(None);
    };
    let hash = Bytes32::from_slice(&hash)
        .ok_or_else(|| ChainError::Corrupt("bad pointer length".to_string()))?;
    let bytes = store.get(Column::HeaderEntry, hash.as_bytes())?.ok_or_else(|| {
        ChainError::Corrupt(format!("pointer to missing entry {hash}"))
    })?;
    decode_entry(&bytes).map(Some)
}
