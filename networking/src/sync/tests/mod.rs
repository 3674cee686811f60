mod checkpoint_tests;
mod states_tests;

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::anyhow;
use chain::{Network, NodeConfig};
use containers::{compact_to_u256, hash_meets_target, BlockHeader, Bytes32, HeaderEntry};
use parking_lot::Mutex;
use storage::{Column, KeyValueStore, MemoryStore, StoreError, WriteBatch};
use tokio::sync::mpsc;

use crate::sync::SyncCoordinator;
use crate::types::{PeerEvent, PeerSession};

type Coordinator<S> = SyncCoordinator<S, MockPeer>;

const BLOCK_SPACING: u32 = 600;

fn regtest_config() -> NodeConfig {
    NodeConfig::new(Network::Regtest)
}

fn genesis() -> HeaderEntry {
    Network::Regtest.params().genesis_entry().unwrap()
}

fn mine_header(parent: &HeaderEntry, time: u32, salt: u8) -> HeaderEntry {
    let bits = Network::Regtest.params().pow_limit_bits;
    let target = compact_to_u256(bits).unwrap();
    let mut header = BlockHeader {
        version: 4,
        prev_hash: parent.hash,
        merkle_root: Bytes32([salt; 32]),
        time,
        bits,
        nonce: 0,
    };
    while !hash_meets_target(&header.hash(), &target) {
        header.nonce += 1;
    }
    parent.child(header).unwrap()
}

/// `count` entries on top of `from`, excluding `from`.
fn mine_chain(from: &HeaderEntry, count: usize, salt: u8) -> Vec<HeaderEntry> {
    let mut entries: Vec<HeaderEntry> = Vec::with_capacity(count);
    for _ in 0..count {
        let parent = entries.last().unwrap_or(from);
        let child = mine_header(parent, parent.time() + BLOCK_SPACING, salt);
        entries.push(child);
    }
    entries
}

/// Genesis followed by `count` regtest headers, indexed by height.
fn regtest_chain(count: usize) -> Vec<HeaderEntry> {
    let mut chain = vec![genesis()];
    chain.extend(mine_chain(&chain[0], count, 0));
    chain
}

/// Peer that answers locator requests from a scripted chain.
#[derive(Clone)]
struct MockPeer {
    chain: Arc<Mutex<Vec<HeaderEntry>>>,
    batch_size: usize,
    sender: mpsc::UnboundedSender<PeerEvent>,
    locators: Arc<Mutex<Vec<Vec<Bytes32>>>>,
    disconnected: Arc<AtomicBool>,
    fail_requests: Arc<AtomicBool>,
}

impl MockPeer {
    fn new(chain: Vec<HeaderEntry>, batch_size: usize) -> (Self, mpsc::UnboundedReceiver<PeerEvent>) {
        let (sender, receiver) = mpsc::unbounded_channel();
        let peer = Self {
            chain: Arc::new(Mutex::new(chain)),
            batch_size,
            sender,
            locators: Arc::new(Mutex::new(Vec::new())),
            disconnected: Arc::new(AtomicBool::new(false)),
            fail_requests: Arc::new(AtomicBool::new(false)),
        };
        (peer, receiver)
    }

    fn extend(&self, entries: Vec<HeaderEntry>) {
        self.chain.lock().extend(entries);
    }

    fn announce_tip(&self) {
        let tip = self.chain.lock().last().map(|entry| entry.hash).unwrap();
        self.send(PeerEvent::Announced(tip));
    }

    fn send(&self, event: PeerEvent) {
        self.sender.send(event).unwrap();
    }

    fn locators(&self) -> Vec<Vec<Bytes32>> {
        self.locators.lock().clone()
    }

    fn is_disconnected(&self) -> bool {
        self.disconnected.load(Ordering::SeqCst)
    }

    fn set_failing(&self, failing: bool) {
        self.fail_requests.store(failing, Ordering::SeqCst);
    }
}

#[async_trait::async_trait]
impl PeerSession for MockPeer {
    async fn request_headers(&self, locator: Vec<Bytes32>) -> anyhow::Result<()> {
        if self.fail_requests.load(Ordering::SeqCst) {
            return Err(anyhow!("connection reset"));
        }
        let headers = {
            let chain = self.chain.lock();
            let start = locator
                .iter()
                .find_map(|hash| chain.iter().position(|entry| entry.hash == *hash))
                .map(|position| position + 1)
                .unwrap_or(1);
            chain
                .iter()
                .skip(start)
                .take(self.batch_size)
                .map(|entry| entry.header.clone())
                .collect()
        };
        self.locators.lock().push(locator);
        self.sender
            .send(PeerEvent::Headers(headers))
            .map_err(|err| anyhow!("queue closed: {err}"))
    }

    async fn disconnect(&self) {
        self.disconnected.store(true, Ordering::SeqCst);
    }
}

/// Open a coordinator on `store`, attach a peer serving `chain` and sync
/// until the peer runs out of headers.
async fn synced_node<S: KeyValueStore>(
    config: NodeConfig,
    store: S,
    chain: Vec<HeaderEntry>,
    batch_size: usize,
) -> (Coordinator<S>, MockPeer) {
    let mut node = Coordinator::new(config, store).unwrap();
    node.open().await.unwrap();
    let (peer, events) = MockPeer::new(chain, batch_size);
    node.connect(peer.clone(), events).unwrap();
    node.start_sync().await.unwrap();
    node.drain().await.unwrap();
    (node, peer)
}

/// Store whose writes can be made to fail on demand.
#[derive(Default)]
struct FlakyStore {
    inner: MemoryStore,
    fail_writes: AtomicBool,
}

impl FlakyStore {
    fn set_failing(&self, failing: bool) {
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
