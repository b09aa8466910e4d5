use alloy::primitives::B256;
use async_trait::async_trait;

use crate::core::types::{ChainBlock, TransactionReceipt};
use crate::error::ProducerError;

/// Point-in-time access to a chain node.
#[async_trait]
pub trait ChainClient: Send + Sync {
    /// Fetch a block with its full transaction objects.
    async fn get_block(&self, block_number: u64) -> Result<ChainBlock, ProducerError>;

    /// Fetch a receipt; `Ok(None)` when the node does not know it yet.
    async fn get_transaction_receipt(
        &self,
        transaction_hash: B256,
    ) -> Result<Option<TransactionReceipt>, ProducerError>;

    async fn get_latest_block_number(&self) -> Result<u64, ProducerError>;
}
