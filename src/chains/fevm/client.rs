use std::{fmt::Display, future::Future, time::Duration};

use alloy::{
    primitives::{B256, U64},
    providers::{Provider, ProviderBuilder, RootProvider},
    transports::{BoxTransport, TransportResult},
};
use async_trait::async_trait;
use tokio::time::timeout;
use tracing::debug;

use crate::{
    core::{
        client::ChainClient,
        types::{ChainBlock, TransactionReceipt},
    },
    error::{NULL_ROUND_MESSAGE, ProducerError},
};

/// Default per-call timeout, matches the websocket timeout Lotus gateways are usually run with.
pub const DEFAULT_RPC_TIMEOUT: Duration = Duration::from_secs(45);

/// Lotus FEVM JSON-RPC client.
///
/// `ws://` endpoints keep one long-lived connection that the transport
/// reconnects by itself; `http://` endpoints open a request per call.
#[derive(Clone)]
pub struct FevmClient {
    provider: RootProvider<BoxTransport>,
    rpc_timeout: Duration,
}

impl FevmClient {
    pub async fn connect(rpc_url: &str, rpc_timeout: Duration) -> Result<Self, ProducerError> {
        let provider = ProviderBuilder::new()
            .on_builtin(rpc_url)
            .await
            .map_err(|e| ProducerError::Rpc(format!("failed to connect to {rpc_url}: {e}")))?;
        debug!("🔌 Connected to FEVM node at {}", rpc_url);

        Ok(Self {
            provider,
            rpc_timeout,
        })
    }

    async fn call<R>(
        &self,
        method: &'static str,
        block_number: Option<u64>,
        request: impl Future<Output = TransportResult<R>>,
    ) -> Result<R, ProducerError> {
        match timeout(self.rpc_timeout, request).await {
            Ok(Ok(response)) => Ok(response),
            Ok(Err(e)) => Err(map_rpc_error(e, block_number)),
            Err(_) => Err(ProducerError::Timeout {
                method: method.to_string(),
            }),
        }
    }
}

/// Lotus reports null rounds as a plain RPC error, recognizable only by its message.
pub fn map_rpc_error(error: impl Display, block_number: Option<u64>) -> ProducerError {
    let message = error.to_string();
    match block_number {
        Some(number) if message.contains(NULL_ROUND_MESSAGE) => ProducerError::NullRound(number),
        _ => ProducerError::Rpc(message),
    }
}

#[async_trait]
impl ChainClient for FevmClient {
    async fn get_block(&self, block_number: u64) -> Result<ChainBlock, ProducerError> {
        let block: Option<ChainBlock> = self
            .call(
                "eth_getBlockByNumber",
                Some(block_number),
                self.provider.raw_request(
                    "eth_getBlockByNumber".into(),
                    (U64::from(block_number), true),
                ),
            )
            .await?;

        block.ok_or(ProducerError::BlockNotFound(block_number))
    }

    async fn get_transaction_receipt(
        &self,
        transaction_hash: B256,
    ) -> Result<Option<TransactionReceipt>, ProducerError> {
        self.call(
            "eth_getTransactionReceipt",
            None,
            self.provider
                .raw_request("eth_getTransactionReceipt".into(), (transaction_hash,)),
        )
        .await
    }

    async fn get_latest_block_number(&self) -> Result<u64, ProducerError> {
        self.call("eth_blockNumber", None, async {
            self.provider.get_block_number().await
        })
        .await
    }
}
