use std::sync::Arc;

use alloy::primitives::{B256, U64};
use async_trait::async_trait;
use tracing::debug;

use crate::{
    core::{
        client::ChainClient,
        getter::BlockGetter,
        types::{Block, ChainBlock, ChainTransaction, Receipt, Transaction, TransactionReceipt},
    },
    error::ProducerError,
    utils::retry::retry_async,
};

/// Fetches blocks from a Lotus node and hydrates every transaction with its receipt.
///
/// Receipts are looked up one by one. A receipt the node does not know yet drops
/// the transaction from the block; a failing lookup is retried immediately up to
/// `max_retries` times before the whole block fails.
pub struct LotusBlockGetter<C> {
    client: Arc<C>,
    max_retries: u32,
}

impl<C> Clone for LotusBlockGetter<C> {
    fn clone(&self) -> Self {
        Self {
            client: Arc::clone(&self.client),
            max_retries: self.max_retries,
        }
    }
}

impl<C: ChainClient> LotusBlockGetter<C> {
    pub fn new(client: Arc<C>, max_retries: u32) -> Self {
        Self {
            client,
            max_retries,
        }
    }

    async fn get_lotus_transaction_receipt(
        &self,
        transaction_hash: B256,
    ) -> Result<Option<TransactionReceipt>, ProducerError> {
        retry_async(
            || self.client.get_transaction_receipt(transaction_hash),
            self.max_retries,
        )
        .await
    }
}

#[async_trait]
impl<C: ChainClient> BlockGetter for LotusBlockGetter<C> {
    async fn get_block_with_transaction_receipts(
        &self,
        block_number: u64,
    ) -> Result<Block, ProducerError> {
        let mut block = self.client.get_block(block_number).await?;
        debug!(
            "🧾 Fetching transaction receipts for block {}",
            block.number.to::<u64>()
        );

        let raw_transactions = std::mem::take(&mut block.transactions);
        let mut transactions = Vec::with_capacity(raw_transactions.len());

        for transaction in raw_transactions {
            match self.get_lotus_transaction_receipt(transaction.hash).await? {
                Some(receipt) => transactions.push(format_transaction(transaction, receipt)?),
                None => debug!(
                    "Receipt for transaction {} not available yet, dropping it from block {}",
                    transaction.hash, block_number
                ),
            }
        }

        Ok(format_block_with_transactions(block, transactions))
    }

    async fn get_latest_block_number(&self) -> Result<u64, ProducerError> {
        self.client.get_latest_block_number().await
    }
}

pub fn format_transaction(
    transaction: ChainTransaction,
    receipt: TransactionReceipt,
) -> Result<Transaction, ProducerError> {
    if receipt.transaction_hash != transaction.hash {
        return Err(ProducerError::Rpc(format!(
            "receipt {} returned for transaction {}",
            receipt.transaction_hash, transaction.hash
        )));
    }

    Ok(Transaction {
        hash: transaction.hash,
        nonce: transaction.nonce.to(),
        transaction_index: transaction.transaction_index.map(|i| i.to()),
        from: transaction.from,
        to: transaction.to,
        value: transaction.value,
        gas: transaction.gas.to(),
        gas_price: transaction.gas_price,
        max_fee_per_gas: transaction.max_fee_per_gas,
        max_priority_fee_per_gas: transaction.max_priority_fee_per_gas,
        input: transaction.input,
        tx_type: transaction.tx_type.map(|t| t.to()),
        chain_id: transaction.chain_id.map(|c| c.to()),
        v: transaction.v,
        r: transaction.r,
        s: transaction.s,
        receipt: Receipt {
            transaction_hash: receipt.transaction_hash,
            status: receipt.status.is_none_or(|status| status != U64::ZERO),
            gas_used: receipt.gas_used.to(),
            cumulative_gas_used: receipt.cumulative_gas_used.to(),
            effective_gas_price: receipt.effective_gas_price,
            contract_address: receipt.contract_address,
            logs: receipt.logs,
            logs_bloom: receipt.logs_bloom,
        },
    })
}

pub fn format_block_with_transactions(block: ChainBlock, transactions: Vec<Transaction>) -> Block {
    Block {
        number: block.number.to(),
        hash: block.hash,
        parent_hash: block.parent_hash,
        timestamp: block.timestamp.to(),
        miner: block.miner,
        gas_limit: block.gas_limit.to(),
        gas_used: block.gas_used.to(),
        base_fee_per_gas: block.base_fee_per_gas,
        state_root: block.state_root,
        receipts_root: block.receipts_root,
        transactions_root: block.transactions_root,
        logs_bloom: block.logs_bloom,
        extra_data: block.extra_data,
        size: block.size.map(|s| s.to()),
        transactions,
    }
}
