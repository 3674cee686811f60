use std::collections::BTreeMap;

use parking_lot::RwLock;

use crate::{Column, KeyValueStore, StoreError, WriteBatch, WriteOp};

/// In-process store. Durable only for the lifetime of the value, which is
/// what tests and restart simulations need.
#[derive(Debug, Default)]
pub struct MemoryStore {
    data: RwLock<BTreeMap<(Column, Vec<u8>), Vec<u8>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self, column: Column) -> usize {
        self.data.read().keys().filter(|(c, _)| *c == column).count()
    }
}

impl KeyValueStore for MemoryStore {
    fn get(&self, column: Column, key: &[u8]) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.data.read().get(&(column, key.to_vec())).cloned())
    }

    fn scan_prefix(
        &self,
        column: Column,
        prefix: &[u8],
    ) -> Result<Vec<(Vec<u8>, Vec<u8>)>, StoreError> {
        let data = self.data.read();
        Ok(data
            .range((column, prefix.to_vec())..)
            .take_while(|((c, key), _)| *c == column && key.starts_with(prefix))
            .map(|((_, key), value)| (key.clone(), value.clone()))
            .collect())
    }

    fn write_batch(&self, batch: &WriteBatch) -> Result<(), StoreError> {
        let mut data = self.data.write();
        for op in batch.iter() {
            match op {
                WriteOp::Put { column, key, value } => {
                    data.insert((*column, key.clone()), value.clone());
                }
                WriteOp::Delete { column, key } => {
                    data.remove(&(*column, key.clone()));
                }
            }
        }
        Ok(())
    }
}
