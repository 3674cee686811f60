use std::sync::Arc;

use containers::{Checkpoint, Height};
use pretty_assertions::assert_eq;
use storage::MemoryStore;

use super::*;
use crate::sync::SyncState;
use crate::types::TipEvent;

#[tokio::test]
async fn test_resync_prunes_below_new_checkpoint() {
    let chain = regtest_chain(30);
    let (mut node, _peer) = synced_node(regtest_config(), Arc::new(MemoryStore::new()), chain.clone(), 50).await;
    let mut tips = node.query().subscribe();

    node.set_checkpoint(Checkpoint::new(20, chain[20].hash));
    // Staged only: nothing is pruned before the resync.
    assert!(node.query().header_by_height(Height(18)).unwrap().is_some());

    node.resync().await.unwrap();
    node.drain().await.unwrap();

    let query = node.query();
    assert_eq!(query.header_by_height(Height(18)).unwrap(), None);
    assert_eq!(query.header_by_height(Height(20)).unwrap(), Some(chain[20].clone()));
    assert_eq!(
        query.header_by_height(Height(21)).unwrap().map(|entry| entry.hash),
        Some(chain[21].hash)
    );
    assert_eq!(query.root(), Some(chain[20].clone()));
    assert_eq!(query.tip(), Some(chain[30].clone()));
    assert_eq!(tips.try_recv().unwrap(), TipEvent::Pruned(chain[20].clone()));
    assert_eq!(node.state(), SyncState::Idle);
}

#[tokio::test]
async fn test_conflicting_checkpoint_truncates_and_resyncs() {
    let chain = regtest_chain(30);
    let mut honest = chain[..20].to_vec();
    honest.extend(mine_chain(&chain[19], 12, 4));

    let (mut node, first) = synced_node(regtest_config(), Arc::new(MemoryStore::new()), chain.clone(), 50).await;
    node.set_checkpoint(Checkpoint::new(20, honest[20].hash));
    node.resync().await.unwrap();
    assert_eq!(node.query().tip(), Some(chain[19].clone()));

    // The first peer keeps serving the conflicting branch.
    node.drain().await.unwrap();
    assert_eq!(node.state(), SyncState::Opening);
    assert!(first.is_disconnected());
    assert_eq!(node.query().tip(), Some(chain[19].clone()));

    let (second, events) = MockPeer::new(honest.clone(), 50);
    node.connect(second, events).unwrap();
    node.start_sync().await.unwrap();
    node.drain().await.unwrap();
    node.resync().await.unwrap();
    node.drain().await.unwrap();

    let query = node.query();
    assert_eq!(query.tip(), Some(honest[31].clone()));
    assert_eq!(query.root(), Some(honest[20].clone()));
    assert_eq!(query.header_by_height(Height(19)).unwrap(), None);
}

#[tokio::test]
async fn test_configured_checkpoint_applies_on_open() {
    let store = Arc::new(MemoryStore::new());
    let chain = regtest_chain(20);
    let (mut node, _) = synced_node(regtest_config(), store.clone(), chain.clone(), 50).await;
    node.close().await.unwrap();
    drop(node);

    let mut config = regtest_config();
    config.checkpoint = Some(Checkpoint::new(10, chain[10].hash));
    let mut node = Coordinator::<Arc<MemoryStore>>::new(config, store).unwrap();
    node.open().await.unwrap();

    let query = node.query();
    assert_eq!(query.root(), Some(chain[10].clone()));
    assert_eq!(query.header_by_height(Height(9)).unwrap(), None);
    assert_eq!(query.tip(), Some(chain[20].clone()));
    assert_eq!(
        node.checkpoint_policy().active().map(|cp| cp.height),
        Some(Height(10))
    );
}

#[tokio::test]
async fn test_checkpoints_are_per_node() {
    let chain = regtest_chain(10);
    let mut pinned = regtest_config();
    pinned.checkpoint = Some(Checkpoint::new(5, chain[5].hash));

    let (mut first, _) = synced_node(pinned, Arc::new(MemoryStore::new()), chain.clone(), 50).await;
    let (mut second, _) = synced_node(regtest_config(), Arc::new(MemoryStore::new()), chain.clone(), 50).await;
    first.resync().await.unwrap();
    second.resync().await.unwrap();

    assert_eq!(first.query().root().map(|root| root.height), Some(Height(5)));
    assert_eq!(second.query().root().map(|root| root.height), Some(Height(0)));
    assert!(second.params().last_checkpoint.is_none());
}

#[tokio::test]
async fn test_resync_requires_open_node() {
    let mut node = Coordinator::<Arc<MemoryStore>>::new(regtest_config(), Arc::new(MemoryStore::new())).unwrap();
    assert!(node.resync().await.is_err());
}
