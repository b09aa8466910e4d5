use alloy::primitives::{Address, B256, Bytes, U64, U256};
use serde::{Deserialize, Serialize};

// Wire shapes returned by the node's eth_* endpoints.

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChainBlock {
    pub number: U64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: U64,
    #[serde(default)]
    pub miner: Address,
    #[serde(default)]
    pub gas_limit: U64,
    #[serde(default)]
    pub gas_used: U64,
    pub base_fee_per_gas: Option<U256>,
    #[serde(default)]
    pub state_root: B256,
    #[serde(default)]
    pub receipts_root: B256,
    #[serde(default)]
    pub transactions_root: B256,
    #[serde(default)]
    pub logs_bloom: Bytes,
    #[serde(default)]
    pub extra_data: Bytes,
    pub size: Option<U64>,
    #[serde(default)]
    pub transactions: Vec<ChainTransaction>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct ChainTransaction {
    pub hash: B256,
    #[serde(default)]
    pub nonce: U64,
    pub block_hash: Option<B256>,
    pub block_number: Option<U64>,
    pub transaction_index: Option<U64>,
    pub from: Address,
    pub to: Option<Address>,
    #[serde(default)]
    pub value: U256,
    #[serde(default)]
    pub gas: U64,
    pub gas_price: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    #[serde(default)]
    pub input: Bytes,
    #[serde(rename = "type")]
    pub tx_type: Option<U64>,
    pub chain_id: Option<U64>,
    pub v: Option<U256>,
    pub r: Option<U256>,
    pub s: Option<U256>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct TransactionReceipt {
    pub transaction_hash: B256,
    pub transaction_index: Option<U64>,
    pub block_hash: Option<B256>,
    pub block_number: Option<U64>,
    pub from: Option<Address>,
    pub to: Option<Address>,
    #[serde(default)]
    pub cumulative_gas_used: U64,
    #[serde(default)]
    pub gas_used: U64,
    pub effective_gas_price: Option<U256>,
    pub contract_address: Option<Address>,
    #[serde(default)]
    pub logs: Vec<Log>,
    #[serde(default)]
    pub logs_bloom: Bytes,
    pub status: Option<U64>,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Log {
    pub address: Address,
    #[serde(default)]
    pub topics: Vec<B256>,
    #[serde(default)]
    pub data: Bytes,
    pub block_number: Option<U64>,
    pub transaction_hash: Option<B256>,
    pub transaction_index: Option<U64>,
    pub block_hash: Option<B256>,
    pub log_index: Option<U64>,
    #[serde(default)]
    pub removed: bool,
}

/// A block with every transaction merged with its receipt.
///
/// Immutable once assembled by a [`BlockGetter`](crate::core::getter::BlockGetter).
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Block {
    pub number: u64,
    pub hash: B256,
    pub parent_hash: B256,
    pub timestamp: u64,
    pub miner: Address,
    pub gas_limit: u64,
    pub gas_used: u64,
    pub base_fee_per_gas: Option<U256>,
    pub state_root: B256,
    pub receipts_root: B256,
    pub transactions_root: B256,
    pub logs_bloom: Bytes,
    pub extra_data: Bytes,
    pub size: Option<u64>,
    pub transactions: Vec<Transaction>,
}

/// Transaction fields merged with the outcome recorded in its receipt.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Transaction {
    pub hash: B256,
    pub nonce: u64,
    pub transaction_index: Option<u64>,
    pub from: Address,
    pub to: Option<Address>,
    pub value: U256,
    pub gas: u64,
    pub gas_price: Option<U256>,
    pub max_fee_per_gas: Option<U256>,
    pub max_priority_fee_per_gas: Option<U256>,
    pub input: Bytes,
    pub tx_type: Option<u64>,
    pub chain_id: Option<u64>,
    pub v: Option<U256>,
    pub r: Option<U256>,
    pub s: Option<U256>,
    pub receipt: Receipt,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub transaction_hash: B256,
    /// `true` on success; pre-byzantium style receipts without a status are treated as success.
    pub status: bool,
    pub gas_used: u64,
    pub cumulative_gas_used: u64,
    pub effective_gas_price: Option<U256>,
    pub contract_address: Option<Address>,
    pub logs: Vec<Log>,
    pub logs_bloom: Bytes,
}
