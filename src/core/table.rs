use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::core::types::Block;

/// Last block handed off downstream, persisted per chain to resume after restarts.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct ProducedBlock {
    /// Chain name (e.g. "filecoin", "calibnet")
    pub chain: String,

    pub block_number: u64,

    pub block_hash: String,

    /// Parent hash, kept so downstream reorg handling can compare against it
    pub parent_hash: String,

    /// Number of transactions that made it into the hydrated block
    #[serde(default)]
    pub transaction_count: usize,

    /// Last updated UTC time
    pub produced_at: DateTime<Utc>,

    /// Data version number, for future schema compatibility upgrade
    pub version: u32,
}

impl ProducedBlock {
    pub fn from_block(chain: impl Into<String>, block: &Block) -> Self {
        Self {
            chain: chain.into(),
            block_number: block.number,
            block_hash: format!("{:?}", block.hash),
            parent_hash: format!("{:?}", block.parent_hash),
            transaction_count: block.transactions.len(),
            produced_at: Utc::now(),
            version: crate::storage::schema::SCHEMA_VERSION,
        }
    }
}
