use std::sync::Arc;

use chain_index::{ChainError, ChainIndex, IndexSnapshot};
use containers::{Bytes32, HeaderEntry, Height};
use storage::KeyValueStore;
use tokio::sync::broadcast;

use crate::TipEvent;

/// Read-only view of the chain for wallets and indexers.
///
/// Handles are cheap to clone and may be used from any task while the
/// coordinator keeps writing; every lookup sees a fully persisted entry.
pub struct ChainQuery<S> {
    index: Arc<ChainIndex<S>>,
    events: broadcast::Sender<TipEvent>,
}

impl<S> Clone for ChainQuery<S> {
    fn clone(&self) -> Self {
        Self {
            index: Arc::clone(&self.index),
            events: self.events.clone(),
        }
    }
}

impl<S: KeyValueStore> ChainQuery<S> {
    pub(crate) fn new(index: Arc<ChainIndex<S>>, events: broadcast::Sender<TipEvent>) -> Self {
        Self { index, events }
    }

    pub fn tip(&self) -> Option<HeaderEntry> {
        self.index.tip()
    }

    pub fn root(&self) -> Option<HeaderEntry> {
        self.index.root()
    }

    pub fn header_by_height(&self, height: Height) -> Result<Option<HeaderEntry>, ChainError> {
        self.index.entry_by_height(height)
    }

    pub fn header_by_hash(&self, hash: &Bytes32) -> Result<Option<HeaderEntry>, ChainError> {
        self.index.entry_by_hash(hash)
    }

    /// Pin the current root and tip for a series of lookups. The coordinator
    /// cannot commit while the snapshot is held.
    pub fn snapshot(&self) -> IndexSnapshot<'_, S> {
        self.index.snapshot()
    }

    /// Receive every tip change from now on.
    pub fn subscribe(&self) -> broadcast::Receiver<TipEvent> {
        self.events.subscribe()
    }
}
