use std::{
    sync::{
        Arc,
        atomic::{AtomicU64, Ordering},
    },
    time::Duration,
};

use tracing::{debug, error, info, warn};

use crate::{
    core::{
        getter::BlockGetter,
        subscription::{BlockSubscription, Observer},
        types::Block,
    },
    error::ProducerError,
    utils::metrics::{BlockFetchFailureReason, NoopProducerMetrics, ProducerMetrics},
};

/// Token value meaning "no live session".
const NO_SESSION: u64 = 0;

/// Turns point-in-time block fetches into a continuous, ordered block stream.
///
/// Each `subscribe` mints a session token and starts a polling loop tied to it.
/// Cancellation is cooperative: a loop re-reads the live token before every
/// observable effect and exits once it no longer matches. A fetch already in
/// flight when the session ends still completes, its result is discarded.
pub struct LotusBlockPoller<G> {
    getter: Arc<G>,
    block_polling_timeout: Duration,
    live_token: Arc<AtomicU64>,
    next_token: AtomicU64,
    metrics: Arc<dyn ProducerMetrics>,
}

impl<G: BlockGetter + 'static> LotusBlockPoller<G> {
    pub fn new(getter: Arc<G>, block_polling_timeout: Duration) -> Self {
        Self {
            getter,
            block_polling_timeout,
            live_token: Arc::new(AtomicU64::new(NO_SESSION)),
            next_token: AtomicU64::new(NO_SESSION + 1),
            metrics: Arc::new(NoopProducerMetrics::new()),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn ProducerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }
}

impl<G: BlockGetter + 'static> BlockSubscription<Block, ProducerError> for LotusBlockPoller<G> {
    fn subscribe(&self, observer: Arc<dyn Observer<Block, ProducerError>>, start_block: u64) {
        let token = self.next_token.fetch_add(1, Ordering::SeqCst);
        // Supersedes any running session without signaling it
        self.live_token.store(token, Ordering::SeqCst);

        let session = PollingSession {
            token,
            live_token: Arc::clone(&self.live_token),
            getter: Arc::clone(&self.getter),
            observer: Arc::clone(&observer),
            block_polling_timeout: self.block_polling_timeout,
            metrics: Arc::clone(&self.metrics),
        };

        match tokio::runtime::Handle::try_current() {
            Ok(handle) => {
                info!("🚀 Block polling started at block {} (session {})", start_block, token);
                handle.spawn(session.run(start_block));
            }
            Err(e) => {
                let _ = self.live_token.compare_exchange(
                    token,
                    NO_SESSION,
                    Ordering::SeqCst,
                    Ordering::SeqCst,
                );
                error!("❌ Failed to start polling loop: {}", e);
                observer.error(ProducerError::create_unknown(e));
            }
        }
    }

    fn unsubscribe(&self) -> bool {
        let previous = self.live_token.swap(NO_SESSION, Ordering::SeqCst);
        if previous != NO_SESSION {
            info!("🛑 Block polling stopped (session {})", previous);
        }
        true
    }

    fn is_active(&self) -> bool {
        self.live_token.load(Ordering::SeqCst) != NO_SESSION
    }
}

struct PollingSession<G> {
    token: u64,
    live_token: Arc<AtomicU64>,
    getter: Arc<G>,
    observer: Arc<dyn Observer<Block, ProducerError>>,
    block_polling_timeout: Duration,
    metrics: Arc<dyn ProducerMetrics>,
}

impl<G: BlockGetter> PollingSession<G> {
    fn is_live(&self) -> bool {
        self.live_token.load(Ordering::SeqCst) == self.token
    }

    async fn run(self, start_block: u64) {
        match self.poll(start_block).await {
            Ok(()) => debug!("Polling session {} ended", self.token),
            Err(e) => {
                // Back to Idle, unless a new session took over meanwhile
                if self
                    .live_token
                    .compare_exchange(self.token, NO_SESSION, Ordering::SeqCst, Ordering::SeqCst)
                    .is_err()
                {
                    debug!("Polling session {} failed after it was superseded: {}", self.token, e);
                    return;
                }
                error!("❌ Block polling terminated: {}", e);
                self.observer.error(e);
            }
        }
    }

    async fn poll(&self, start_block: u64) -> Result<(), ProducerError> {
        // First height not yet emitted or skipped
        let mut next_block = start_block;

        while self.is_live() {
            let latest = self.getter.get_latest_block_number().await?;

            if latest < next_block {
                debug!("Waiting for block {} (latest {})", next_block, latest);
                tokio::time::sleep(self.block_polling_timeout).await;
                continue;
            }

            for block_number in next_block..=latest {
                if !self.is_live() {
                    return Ok(());
                }

                let result = self
                    .getter
                    .get_block_with_transaction_receipts(block_number)
                    .await;

                if !self.is_live() {
                    debug!("Discarding block {} fetched by a stale session", block_number);
                    return Ok(());
                }

                match result {
                    Ok(block) => {
                        debug!(
                            "📦 Block {} with {} transactions",
                            block.number,
                            block.transactions.len()
                        );
                        self.observer.next(block);
                        next_block = block_number + 1;
                    }
                    Err(e) if e.is_null_round() => {
                        warn!("⏭️ Skipping null round at block {}", block_number);
                        self.metrics.record_null_round();
                        next_block = block_number + 1;
                    }
                    Err(e) => {
                        // Reported but not retried unless a later height fails too
                        error!("❌ Fetch block {} failed: {}", block_number, e);
                        self.metrics
                            .record_block_fetch_failure(BlockFetchFailureReason::from_error(&e));
                        self.observer.error(e);
                    }
                }
            }
        }

        Ok(())
    }
}
