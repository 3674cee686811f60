mod common;

use std::sync::Arc;

use chain::MEDIAN_TIME_SPAN;
use chain_index::{check_header, ChainError, ChainIndex, HeaderError, MedianTimeWindow};
use common::*;
use containers::{Height, U256};
use pretty_assertions::assert_eq;
use storage::{Column, KeyValueStore, MemoryStore, WriteBatch};

#[test]
fn test_verify_whole_chain() {
    let (index, _) = index_with_chain(25);
    assert_eq!(index.verify(0).unwrap(), 26);
    assert_eq!(index.verify(5).unwrap(), 5);
    assert_eq!(index.verify(1000).unwrap(), 26);
}

#[test]
fn test_verify_empty_index() {
    let index = ChainIndex::open(MemoryStore::new()).unwrap();
    assert_eq!(index.verify(0).unwrap(), 0);
}

#[test]
fn test_verify_detects_height_index_damage() {
    let store = Arc::new(MemoryStore::new());
    let index = ChainIndex::open(store.clone()).unwrap();
    index.init_genesis(genesis()).unwrap();
    let chain = mine_chain(&genesis(), 6, 0);
    index.extend(&chain).unwrap();

    let mut batch = WriteBatch::new();
    batch.put(Column::HeightIndex, Height(3).to_key(), chain[0].hash.as_bytes().to_vec());
    store.write_batch(&batch).unwrap();

    assert_eq!(index.verify(2).unwrap(), 2);
    assert!(matches!(index.verify(0), Err(ChainError::Corrupt(_))));
}

#[test]
fn test_verify_detects_work_damage() {
    let store = Arc::new(MemoryStore::new());
    let index = ChainIndex::open(store.clone()).unwrap();
    index.init_genesis(genesis()).unwrap();
    let chain = mine_chain(&genesis(), 4, 0);
    index.extend(&chain).unwrap();

    let mut damaged = chain[1].clone();
    damaged.chain_work = damaged.chain_work + U256::from(1u64);
    let mut batch = WriteBatch::new();
    batch.put(Column::HeaderEntry, damaged.hash.as_bytes().to_vec(), damaged.encode());
    store.write_batch(&batch).unwrap();

    assert!(matches!(index.verify(0), Err(ChainError::Corrupt(_))));
}

#[test]
fn test_mined_headers_pass_network_rules() {
    let (index, chain) = index_with_chain(15);
    let params = regtest();
    let now = chain[15].time();

    let child = mine_child(&chain[15], 0);
    let times = index.ancestor_times(&chain[15], MEDIAN_TIME_SPAN).unwrap();
    let window = MedianTimeWindow::from_times(MEDIAN_TIME_SPAN, times);
    assert_eq!(
        check_header(&child.header, &child.hash, &window, &params, now),
        Ok(())
    );

    let mut stale = child.header.clone();
    stale.time = chain[10].time();
    assert!(matches!(
        check_header(&stale, &stale.hash(), &window, &params, now),
        Err(HeaderError::TimeTooOld { .. }) | Err(HeaderError::InsufficientWork { .. })
    ));
}

#[test]
fn test_verify_detects_stray_height_keys() {
    let store = Arc::new(MemoryStore::new());
    let index = ChainIndex::open(store.clone()).unwrap();
    index.init_genesis(genesis()).unwrap();
    index.extend(&mine_chain(&genesis(), 3, 0)).unwrap();

    let mut batch = WriteBatch::new();
    batch.put(Column::HeightIndex, Height(100).to_key(), genesis().hash.as_bytes().to_vec());
    store.write_batch(&batch).unwrap();

    assert_eq!(index.verify(3).unwrap(), 3);
    assert!(matches!(index.verify(0), Err(ChainError::Corrupt(_))));
}
