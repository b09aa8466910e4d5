use anyhow::Result;
use async_trait::async_trait;
use tokio::sync::mpsc;

use crate::core::types::Block;

/// Downstream hand-off point for produced blocks.
#[async_trait]
pub trait BlockSink: Send + Sync {
    async fn deliver(&self, block: Block) -> Result<()>;
}

#[async_trait]
impl BlockSink for mpsc::Sender<Block> {
    async fn deliver(&self, block: Block) -> Result<()> {
        self.send(block)
            .await
            .map_err(|e| anyhow::anyhow!("Downstream block channel closed at block {}", e.0.number))
    }
}
