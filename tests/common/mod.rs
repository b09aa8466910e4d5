#![allow(dead_code)]

use std::{
    collections::{HashMap, HashSet, VecDeque},
    sync::{
        Arc, Mutex,
        atomic::{AtomicUsize, Ordering},
    },
    time::Duration,
};

use alloy::primitives::{Address, B256, Bytes, U64, U256};
use async_trait::async_trait;
use fevm_block_producer::{
    core::{
        client::ChainClient,
        getter::BlockGetter,
        subscription::Observer,
        types::{Block, ChainBlock, ChainTransaction, TransactionReceipt},
    },
    error::{NULL_ROUND_MESSAGE, ProducerError},
};

pub fn block(number: u64) -> Block {
    Block {
        number,
        hash: B256::with_last_byte(number as u8),
        parent_hash: B256::with_last_byte(number.saturating_sub(1) as u8),
        timestamp: 1_700_000_000 + number * 30,
        miner: Address::ZERO,
        gas_limit: 10_000_000_000,
        gas_used: 0,
        base_fee_per_gas: Some(U256::from(100)),
        state_root: B256::ZERO,
        receipts_root: B256::ZERO,
        transactions_root: B256::ZERO,
        logs_bloom: Bytes::new(),
        extra_data: Bytes::new(),
        size: None,
        transactions: Vec::new(),
    }
}

#[derive(Default)]
struct GetterScript {
    latest: VecDeque<Result<u64, ProducerError>>,
    last_latest: u64,
    failures: HashMap<u64, VecDeque<ProducerError>>,
    null_rounds: HashSet<u64>,
    delays: HashMap<u64, Duration>,
}

/// `BlockGetter` answering from a script.
///
/// Latest block numbers are served in order; once the script runs out the last
/// value repeats. Every height exists unless it is a null round or has queued
/// failures.
#[derive(Default)]
pub struct ScriptedGetter {
    script: Mutex<GetterScript>,
    latest_calls: AtomicUsize,
    fetched: Mutex<Vec<u64>>,
}

impl ScriptedGetter {
    pub fn with_latest(values: impl IntoIterator<Item = u64>) -> Self {
        let getter = Self::default();
        for value in values {
            getter.push_latest(value);
        }
        getter
    }

    pub fn push_latest(&self, value: u64) {
        self.script.lock().unwrap().latest.push_back(Ok(value));
    }

    pub fn push_latest_error(&self, error: ProducerError) {
        self.script.lock().unwrap().latest.push_back(Err(error));
    }

    pub fn null_round(&self, block_number: u64) {
        self.script.lock().unwrap().null_rounds.insert(block_number);
    }

    pub fn fail_once(&self, block_number: u64, error: ProducerError) {
        self.script
            .lock()
            .unwrap()
            .failures
            .entry(block_number)
            .or_default()
            .push_back(error);
    }

    pub fn delay(&self, block_number: u64, delay: Duration) {
        self.script.lock().unwrap().delays.insert(block_number, delay);
    }

    pub fn latest_calls(&self) -> usize {
        self.latest_calls.load(Ordering::SeqCst)
    }

    pub fn fetched(&self) -> Vec<u64> {
        self.fetched.lock().unwrap().clone()
    }
}

#[async_trait]
impl BlockGetter for ScriptedGetter {
    async fn get_block_with_transaction_receipts(
        &self,
        block_number: u64,
    ) -> Result<Block, ProducerError> {
        self.fetched.lock().unwrap().push(block_number);
        let delay = self.script.lock().unwrap().delays.get(&block_number).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let mut script = self.script.lock().unwrap();
        if script.null_rounds.contains(&block_number) {
            return Err(ProducerError::NullRound(block_number));
        }
        if let Some(error) = script
            .failures
            .get_mut(&block_number)
            .and_then(|queue| queue.pop_front())
        {
            return Err(error);
        }
        Ok(block(block_number))
    }

    async fn get_latest_block_number(&self) -> Result<u64, ProducerError> {
        self.latest_calls.fetch_add(1, Ordering::SeqCst);
        let mut script = self.script.lock().unwrap();
        match script.latest.pop_front() {
            Some(Ok(value)) => {
                script.last_latest = value;
                Ok(value)
            }
            Some(Err(error)) => Err(error),
            None => Ok(script.last_latest),
        }
    }
}

/// Observer collecting everything it is handed.
#[derive(Default)]
pub struct RecordingObserver {
    blocks: Mutex<Vec<u64>>,
    errors: Mutex<Vec<ProducerError>>,
}

impl RecordingObserver {
    pub fn blocks(&self) -> Vec<u64> {
        self.blocks.lock().unwrap().clone()
    }

    pub fn errors(&self) -> Vec<ProducerError> {
        self.errors.lock().unwrap().clone()
    }

    /// Wait (on the tokio clock) until at least `count` blocks arrived.
    pub async fn wait_for_blocks(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(600), async {
            while self.blocks.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("blocks did not arrive in time");
    }

    pub async fn wait_for_errors(&self, count: usize) {
        tokio::time::timeout(Duration::from_secs(600), async {
            while self.errors.lock().unwrap().len() < count {
                tokio::time::sleep(Duration::from_millis(5)).await;
            }
        })
        .await
        .expect("errors did not arrive in time");
    }
}

impl Observer<Block, ProducerError> for RecordingObserver {
    fn next(&self, item: Block) {
        self.blocks.lock().unwrap().push(item.number);
    }

    fn error(&self, error: ProducerError) {
        self.errors.lock().unwrap().push(error);
    }
}

pub fn tx_hash(block_number: u64, index: u64) -> B256 {
    let mut bytes = [0u8; 32];
    bytes[..8].copy_from_slice(&block_number.to_be_bytes());
    bytes[24..].copy_from_slice(&(index + 1).to_be_bytes());
    B256::from(bytes)
}

fn chain_transaction(block_number: u64, index: u64) -> ChainTransaction {
    ChainTransaction {
        hash: tx_hash(block_number, index),
        nonce: U64::from(index),
        block_hash: None,
        block_number: Some(U64::from(block_number)),
        transaction_index: Some(U64::from(index)),
        from: Address::repeat_byte(0x11),
        to: Some(Address::repeat_byte(0x22)),
        value: U256::from(1_000),
        gas: U64::from(21_000),
        gas_price: Some(U256::from(100)),
        max_fee_per_gas: None,
        max_priority_fee_per_gas: None,
        input: Bytes::new(),
        tx_type: Some(U64::from(2)),
        chain_id: Some(U64::from(314)),
        v: None,
        r: None,
        s: None,
    }
}

fn chain_receipt(block_number: u64, index: u64) -> TransactionReceipt {
    TransactionReceipt {
        transaction_hash: tx_hash(block_number, index),
        transaction_index: Some(U64::from(index)),
        block_hash: None,
        block_number: Some(U64::from(block_number)),
        from: Some(Address::repeat_byte(0x11)),
        to: Some(Address::repeat_byte(0x22)),
        cumulative_gas_used: U64::from(21_000 * (index + 1)),
        gas_used: U64::from(21_000),
        effective_gas_price: Some(U256::from(100)),
        contract_address: None,
        logs: Vec::new(),
        logs_bloom: Bytes::new(),
        status: Some(U64::from(1)),
    }
}

#[derive(Default)]
struct ChainState {
    blocks: HashMap<u64, ChainBlock>,
    receipts: HashMap<B256, TransactionReceipt>,
    null_rounds: HashSet<u64>,
    delays: HashMap<u64, Duration>,
}

/// In-memory Lotus node. Clones share state.
#[derive(Clone, Default)]
pub struct MockChain {
    state: Arc<Mutex<ChainState>>,
}

impl MockChain {
    /// Add a block whose first `with_receipts` transactions already have receipts.
    pub fn add_block(&self, number: u64, transactions: u64, with_receipts: u64) {
        let transactions_list = (0..transactions)
            .map(|index| chain_transaction(number, index))
            .collect();
        let chain_block = ChainBlock {
            number: U64::from(number),
            hash: B256::with_last_byte(number as u8),
            parent_hash: B256::with_last_byte(number.saturating_sub(1) as u8),
            timestamp: U64::from(1_700_000_000 + number * 30),
            miner: Address::ZERO,
            gas_limit: U64::from(10_000_000_000u64),
            gas_used: U64::from(21_000 * transactions),
            base_fee_per_gas: Some(U256::from(100)),
            state_root: B256::ZERO,
            receipts_root: B256::ZERO,
            transactions_root: B256::ZERO,
            logs_bloom: Bytes::new(),
            extra_data: Bytes::new(),
            size: None,
            transactions: transactions_list,
        };

        let mut state = self.state.lock().unwrap();
        state.blocks.insert(number, chain_block);
        for index in 0..with_receipts.min(transactions) {
            state
                .receipts
                .insert(tx_hash(number, index), chain_receipt(number, index));
        }
    }

    pub fn null_round(&self, number: u64) {
        self.state.lock().unwrap().null_rounds.insert(number);
    }

    pub fn delay(&self, number: u64, delay: Duration) {
        self.state.lock().unwrap().delays.insert(number, delay);
    }
}

#[async_trait]
impl ChainClient for MockChain {
    async fn get_block(&self, block_number: u64) -> Result<ChainBlock, ProducerError> {
        let delay = self.state.lock().unwrap().delays.get(&block_number).copied();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        let state = self.state.lock().unwrap();
        if state.null_rounds.contains(&block_number) {
            return Err(ProducerError::Rpc(format!(
                "error code 1: {NULL_ROUND_MESSAGE}"
            )));
        }
        state
            .blocks
            .get(&block_number)
            .cloned()
            .ok_or(ProducerError::BlockNotFound(block_number))
    }

    async fn get_transaction_receipt(
        &self,
        transaction_hash: B256,
    ) -> Result<Option<TransactionReceipt>, ProducerError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .receipts
            .get(&transaction_hash)
            .cloned())
    }

    async fn get_latest_block_number(&self) -> Result<u64, ProducerError> {
        Ok(self
            .state
            .lock()
            .unwrap()
            .blocks
            .keys()
            .copied()
            .max()
            .unwrap_or_default())
    }
}
