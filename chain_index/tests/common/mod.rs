#![allow(dead_code)]

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{mpsc, Arc};

use chain::{Network, NetworkParams};
use chain_index::ChainIndex;
use containers::{compact_to_u256, hash_meets_target, BlockHeader, Bytes32, HeaderEntry};
use parking_lot::Mutex;
use storage::{Column, KeyValueStore, MemoryStore, StoreError, WriteBatch};

pub const BLOCK_SPACING: u32 = 600;

pub fn regtest() -> NetworkParams {
    Network::Regtest.params()
}

pub fn genesis() -> HeaderEntry {
    regtest().genesis_entry().unwrap()
}

/// Mine a regtest header on top of `parent`. `salt` goes into the merkle
/// root so that siblings with the same parent get different hashes.
pub fn mine_child(parent: &HeaderEntry, salt: u8) -> HeaderEntry {
    let bits = regtest().pow_limit_bits;
    let target = compact_to_u256(bits).unwrap();
    let mut header = BlockHeader {
        version: 4,
        prev_hash: parent.hash,
        merkle_root: Bytes32([salt; 32]),
        time: parent.time() + BLOCK_SPACING,
        bits,
        nonce: 0,
    };
    while !hash_meets_target(&header.hash(), &target) {
        header.nonce += 1;
    }
    parent.child(header).unwrap()
}

/// `count` consecutive entries on top of `from`, excluding `from` itself.
pub fn mine_chain(from: &HeaderEntry, count: usize, salt: u8) -> Vec<HeaderEntry> {
    let mut entries = Vec::with_capacity(count);
    let mut parent = from.clone();
    for _ in 0..count {
        let child = mine_child(&parent, salt);
        entries.push(child.clone());
        parent = child;
    }
    entries
}

pub fn genesis_index() -> ChainIndex<Arc<MemoryStore>> {
    let index = ChainIndex::open(Arc::new(MemoryStore::new())).unwrap();
    index.init_genesis(genesis()).unwrap();
    index
}

/// Index rooted at genesis and extended by `count` entries. Returns the
/// index and the full chain including genesis.
pub fn index_with_chain(count: usize) -> (ChainIndex<Arc<MemoryStore>>, Vec<HeaderEntry>) {
    let index = genesis_index();
    let mut chain = vec![genesis()];
    chain.extend(mine_chain(&chain[0], count, 0));
    index.extend(&chain[1..]).unwrap();
    (index, chain)
}

/// Store whose writes can be made to fail on demand.
#[derive(Default)]
pub struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    pub fn set_failing(&self, failing: bool) {
        self.fail_writes.store(failing, Ordering::SeqCst);
    }
}

impl KeyValueStore for FlakyStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(column, key)
    }

    fn scan_prefix(
        &self,
        column: Column,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.inner.scan_prefix(column, prefix)
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(StoreError::Backend("disk full".to_string()));
        }
        self.inner.write_batch(batch)
    }
}

/// Store that, once armed, applies the next batch and then holds the writing
/// thread until it is released.
#[derive(Default)]
pub struct PausingStore {
    inner: MemoryStore,
    gate: Mutex<Option<(mpsc::Sender<()>, mpsc::Receiver<()>)>>,
}

impl PausingStore {
    /// Pause after the next write. The first channel reports that the batch
    /// is applied; sending on the second lets the writer return.
    pub fn arm(&self) -> (mpsc::Receiver<()>, mpsc::Sender<()>) {
        let (paused_tx, paused_rx) = mpsc::channel();
        let (resume_tx, resume_rx) = mpsc::channel();
        *self.gate.lock() = Some((paused_tx, resume_rx));
        (paused_rx, resume_tx)
    }
}

impl KeyValueStore for PausingStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        self.inner.get(column, key)
    }

    fn scan_prefix(
        &self,
        column: Column,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        self.inner.scan_prefix(column, prefix)
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        self.inner.write_batch(batch)?;
        let gate = self.gate.lock().take();
        if let Some((paused, resume)) = gate {
            let _ = paused.send(());
            let _ = resume.recv();
        }
        Ok(())
    }
}
