use crate::core::storage::KVStorage;
use crate::core::table::ProducedBlock;
use crate::storage::schema::keys;
use anyhow::Result;
use std::sync::Arc;

use super::rocksdb::RocksDBStorage;

/// Persists the last block handed off downstream for one chain.
#[derive(Clone)]
pub struct ProducedBlockStorage {
    pub storage: Arc<RocksDBStorage>,
    pub chain: String,
}

impl ProducedBlockStorage {
    pub fn new(storage: Arc<RocksDBStorage>, chain: impl Into<String>) -> Self {
        Self {
            storage,
            chain: chain.into(),
        }
    }

    pub fn get(&self) -> Result<Option<ProducedBlock>> {
        let key = keys::produced_block_key(&self.chain);
        self.storage.read_json::<ProducedBlock>(&key)
    }

    pub fn update(&self, produced: &ProducedBlock) -> Result<()> {
        let key = keys::produced_block_key(&self.chain);
        self.storage.write_json(&key, produced)
    }

    pub fn delete(&self) -> Result<()> {
        let key = keys::produced_block_key(&self.chain);
        self.storage.delete(&key)
    }

    /// First block to subscribe from: one past the last produced block, or
    /// `start_block` when nothing was produced yet.
    pub fn resume_block(&self, start_block: u64) -> Result<u64> {
        Ok(match self.get()? {
            Some(produced) => produced.block_number + 1,
            None => start_block,
        })
    }
}
