use crate::error::ProducerError;

/// Categorizes block fetch failures for metrics reporting.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BlockFetchFailureReason {
    Rpc,
    Timeout,
    NotFound,
    Worker,
    Other,
}

impl BlockFetchFailureReason {
    pub fn from_error(error: &ProducerError) -> Self {
        match error {
            ProducerError::Rpc(_) | ProducerError::NullRound(_) => BlockFetchFailureReason::Rpc,
            ProducerError::Timeout { .. } => BlockFetchFailureReason::Timeout,
            ProducerError::BlockNotFound(_) => BlockFetchFailureReason::NotFound,
            ProducerError::WorkerUnavailable(_) | ProducerError::WorkerInit(_) => {
                BlockFetchFailureReason::Worker
            }
            ProducerError::Unknown(_) => BlockFetchFailureReason::Other,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            BlockFetchFailureReason::Rpc => "rpc_error",
            BlockFetchFailureReason::Timeout => "timeout",
            BlockFetchFailureReason::NotFound => "not_found",
            BlockFetchFailureReason::Worker => "worker",
            BlockFetchFailureReason::Other => "other",
        }
    }
}

/// Abstraction over producer runtime metrics, allowing a no-op implementation when disabled.
pub trait ProducerMetrics: Send + Sync {
    fn record_block_produced(&self, block_number: u64, transaction_count: usize);
    fn record_null_round(&self);
    fn record_block_fetch_failure(&self, reason: BlockFetchFailureReason);
    fn record_subscription_restart(&self);
}

#[derive(Default)]
pub struct NoopProducerMetrics;

impl NoopProducerMetrics {
    pub fn new() -> Self {
        Self
    }
}

impl ProducerMetrics for NoopProducerMetrics {
    fn record_block_produced(&self, _block_number: u64, _transaction_count: usize) {}

    fn record_null_round(&self) {}

    fn record_block_fetch_failure(&self, _reason: BlockFetchFailureReason) {}

    fn record_subscription_restart(&self) {}
}

pub struct PrometheusProducerMetrics {
    chain: String,
}

impl PrometheusProducerMetrics {
    pub fn new(chain: impl Into<String>) -> Self {
        Self {
            chain: chain.into(),
        }
    }
}

impl ProducerMetrics for PrometheusProducerMetrics {
    fn record_block_produced(&self, block_number: u64, transaction_count: usize) {
        let chain = self.chain.clone();
        metrics::counter!(
            "producer_blocks_produced_total",
            1,
            "chain" => chain.clone()
        );
        metrics::counter!(
            "producer_transactions_produced_total",
            transaction_count as u64,
            "chain" => chain.clone()
        );
        metrics::gauge!(
            "producer_current_block",
            block_number as f64,
            "chain" => chain
        );
    }

    fn record_null_round(&self) {
        let chain = self.chain.clone();
        metrics::counter!(
            "producer_null_rounds_total",
            1,
            "chain" => chain
        );
    }

    fn record_block_fetch_failure(&self, reason: BlockFetchFailureReason) {
        let chain = self.chain.clone();
        metrics::counter!(
            "producer_block_fetch_failure_total",
            1,
            "chain" => chain,
            "reason" => reason.as_str()
        );
    }

    fn record_subscription_restart(&self) {
        let chain = self.chain.clone();
        metrics::counter!(
            "producer_subscription_restarts_total",
            1,
            "chain" => chain
        );
    }
}
