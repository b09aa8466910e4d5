use async_trait::async_trait;

use crate::core::types::Block;
use crate::error::ProducerError;

/// Source of fully hydrated blocks, consumed by the block poller.
#[async_trait]
pub trait BlockGetter: Send + Sync {
    /// Fetch the block at `block_number` with every transaction's receipt attached.
    async fn get_block_with_transaction_receipts(
        &self,
        block_number: u64,
    ) -> Result<Block, ProducerError>;

    async fn get_latest_block_number(&self) -> Result<u64, ProducerError>;
}
