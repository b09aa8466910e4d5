use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Message returned by Lotus when the requested height was a null round.
pub const NULL_ROUND_MESSAGE: &str = "requested epoch was a null round";

/// Errors produced while fetching and polling blocks.
///
/// The enum is `Clone` and serde-serializable because it travels inside
/// [`BlockWorkerResponse`](crate::chains::fevm::worker::BlockWorkerResponse)
/// and is handed to observers by value.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum ProducerError {
    /// The node or the transport returned an error.
    #[error("RPC error: {0}")]
    Rpc(String),

    /// An RPC call did not answer within the configured timeout.
    #[error("RPC method {method} timed out")]
    Timeout { method: String },

    /// The node answered `null` for the requested block.
    #[error("Block {0} not found")]
    BlockNotFound(u64),

    /// No block was produced at this height.
    #[error("{NULL_ROUND_MESSAGE} (block {0})")]
    NullRound(u64),

    /// The offloaded block worker is gone or never came up.
    #[error("Block worker unavailable: {0}")]
    WorkerUnavailable(String),

    /// The block worker was started without its required parameters.
    #[error("Block worker initialization failed: {0}")]
    WorkerInit(String),

    #[error("Unknown error: {0}")]
    Unknown(String),
}

impl ProducerError {
    /// Wrap an arbitrary error, keeping it as-is if it already is a `ProducerError`.
    pub fn create_unknown(error: impl Into<anyhow::Error>) -> Self {
        let error = error.into();
        match error.downcast::<ProducerError>() {
            Ok(known) => known,
            Err(other) => ProducerError::Unknown(format!("{other:#}")),
        }
    }

    /// Whether this error means the height was never produced on-chain.
    pub fn is_null_round(&self) -> bool {
        match self {
            ProducerError::NullRound(_) => true,
            ProducerError::Rpc(message) => message.contains(NULL_ROUND_MESSAGE),
            _ => false,
        }
    }
}
