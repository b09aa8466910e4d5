use std::{
    sync::{
        Arc,
        atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering},
    },
    time::Duration,
};

use anyhow::Result;
use tokio::{
    sync::{broadcast, mpsc},
    time::{Instant, sleep_until},
};
use tracing::{error, info, warn};

use crate::{
    core::{
        sink::BlockSink,
        subscription::{BlockSubscription, Observer},
        table::ProducedBlock,
        types::Block,
    },
    error::ProducerError,
    storage::manager::ProducedBlockStorage,
    utils::metrics::{BlockFetchFailureReason, NoopProducerMetrics, ProducerMetrics},
};

/// Default number of emitted blocks allowed to wait for the sink.
pub const DEFAULT_QUEUE_LIMIT: usize = 64;

/// What a subscription hands to the producer.
#[derive(Debug)]
pub enum ProducerEvent {
    Block(Block),
    Error(ProducerError),
}

/// Blocks emitted by the subscription but not yet taken by the producer loop.
///
/// Crossing `high_water` pauses the subscription; it is resumed once the queue
/// has fully drained.
pub struct QueueGauge {
    queued: AtomicUsize,
    high_water: usize,
    paused: AtomicBool,
}

impl QueueGauge {
    pub fn new(high_water: usize) -> Self {
        Self {
            queued: AtomicUsize::new(0),
            high_water: high_water.max(1),
            paused: AtomicBool::new(false),
        }
    }

    /// Count one queued block. True only for the push that pauses the subscription.
    fn push(&self) -> bool {
        let queued = self.queued.fetch_add(1, Ordering::SeqCst) + 1;
        queued >= self.high_water && !self.paused.swap(true, Ordering::SeqCst)
    }

    fn pop(&self) {
        let _ = self
            .queued
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |q| q.checked_sub(1));
    }

    /// Clear the pause once nothing is left in the queue. True if it was paused.
    fn try_resume(&self) -> bool {
        self.queued() == 0 && self.paused.swap(false, Ordering::SeqCst)
    }

    pub fn queued(&self) -> usize {
        self.queued.load(Ordering::SeqCst)
    }

    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst)
    }
}

/// Observer forwarding everything to the producer loop.
///
/// `pause` runs on the polling task, right after the block that filled the
/// queue, so no further block is fetched until the producer resumes.
pub struct ChannelObserver {
    events: mpsc::UnboundedSender<ProducerEvent>,
    queue: Arc<QueueGauge>,
    pause: Box<dyn Fn() + Send + Sync>,
}

impl ChannelObserver {
    pub fn new(
        events: mpsc::UnboundedSender<ProducerEvent>,
        queue: Arc<QueueGauge>,
        pause: Box<dyn Fn() + Send + Sync>,
    ) -> Self {
        Self {
            events,
            queue,
            pause,
        }
    }
}

impl Observer<Block, ProducerError> for ChannelObserver {
    fn next(&self, item: Block) {
        // Counted before sending so the producer never pops an uncounted block
        let pause = self.queue.push();
        // Receiver only goes away when the producer stops
        if self.events.send(ProducerEvent::Block(item)).is_err() {
            return;
        }
        if pause {
            (self.pause)();
        }
    }

    fn error(&self, error: ProducerError) {
        let _ = self.events.send(ProducerEvent::Error(error));
    }
}

/// Drives a block subscription and hands every emitted block downstream.
///
/// Blocks are delivered to the sink first and only then recorded as produced,
/// so a restart resumes at the first block the sink has not accepted. At most
/// `queue_limit` emitted blocks wait in memory; beyond that polling is paused
/// until the sink catches up.
pub struct BlockProducer<S, K> {
    chain_name: String,
    subscription: Arc<S>,
    sink: K,
    storage: ProducedBlockStorage,
    start_block: u64,
    restart_delay: Duration,
    queue_limit: usize,
    metrics: Arc<dyn ProducerMetrics>,
    produced_count: AtomicU64,
}

impl<S, K> BlockProducer<S, K>
where
    S: BlockSubscription<Block, ProducerError> + 'static,
    K: BlockSink,
{
    pub fn new(
        chain_name: impl Into<String>,
        subscription: Arc<S>,
        sink: K,
        storage: ProducedBlockStorage,
        start_block: u64,
        restart_delay: Duration,
    ) -> Self {
        Self {
            chain_name: chain_name.into(),
            subscription,
            sink,
            storage,
            start_block,
            restart_delay,
            queue_limit: DEFAULT_QUEUE_LIMIT,
            metrics: Arc::new(NoopProducerMetrics::new()),
            produced_count: AtomicU64::new(0),
        }
    }

    pub fn with_metrics(mut self, metrics: Arc<dyn ProducerMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    pub fn with_queue_limit(mut self, queue_limit: usize) -> Self {
        self.queue_limit = queue_limit;
        self
    }

    pub fn produced_count(&self) -> u64 {
        self.produced_count.load(Ordering::Relaxed)
    }

    async fn produce(&self, block: Block) -> Result<()> {
        let block_number = block.number;
        let transaction_count = block.transactions.len();
        let produced = ProducedBlock::from_block(&self.chain_name, &block);

        self.sink.deliver(block).await?;
        self.storage.update(&produced)?;

        self.produced_count.fetch_add(1, Ordering::Relaxed);
        self.metrics
            .record_block_produced(block_number, transaction_count);
        info!(
            "✅ Produced block {} ({} transactions)",
            block_number, transaction_count
        );
        Ok(())
    }

    fn subscribe(&self, observer: &Arc<dyn Observer<Block, ProducerError>>) -> Result<u64> {
        let resume_block = self.storage.resume_block(self.start_block)?;
        self.subscription
            .subscribe(Arc::clone(observer), resume_block);
        Ok(resume_block)
    }

    /// Run until `shutdown` fires or the sink stops accepting blocks.
    pub async fn run(&self, mut shutdown: broadcast::Receiver<()>) -> Result<()> {
        let (events_tx, mut events) = mpsc::unbounded_channel();
        let queue = Arc::new(QueueGauge::new(self.queue_limit));
        let pause = {
            let subscription = Arc::clone(&self.subscription);
            let queue_limit = self.queue_limit;
            Box::new(move || {
                warn!(
                    "⏸️ {} blocks waiting for downstream, pausing block polling",
                    queue_limit
                );
                subscription.unsubscribe();
            })
        };
        let observer: Arc<dyn Observer<Block, ProducerError>> = Arc::new(ChannelObserver::new(
            events_tx,
            Arc::clone(&queue),
            pause,
        ));

        let resume_block = self.subscribe(&observer)?;
        info!("🔄 Producer loop started from block {}", resume_block);

        let mut restart_at: Option<Instant> = None;
        let mut outcome = Ok(());

        loop {
            tokio::select! {
                _ = shutdown.recv() => {
                    info!("🛑 Shutdown signal received, stopping producer gracefully...");
                    break;
                }

                Some(event) = events.recv() => match event {
                    ProducerEvent::Block(block) => {
                        queue.pop();

                        // A full sink must not hold up shutdown
                        tokio::select! {
                            result = self.produce(block) => {
                                if let Err(e) = result {
                                    error!("❌ Block hand-off failed: {:#}", e);
                                    outcome = Err(e);
                                    break;
                                }
                            }
                            _ = shutdown.recv() => {
                                info!("🛑 Shutdown signal received while downstream was full, stopping producer...");
                                break;
                            }
                        }

                        if queue.try_resume() {
                            let resume_block = self.subscribe(&observer)?;
                            info!("▶️ Downstream caught up, polling resumed from block {}", resume_block);
                        }
                    }
                    ProducerEvent::Error(e) => {
                        error!("❌ Subscription error: {}", e);
                        if !self.subscription.is_active()
                            && !queue.is_paused()
                            && restart_at.is_none()
                        {
                            self.metrics
                                .record_block_fetch_failure(BlockFetchFailureReason::from_error(&e));
                            warn!(
                                "⚠️ Block polling stopped, resubscribing in {:?}",
                                self.restart_delay
                            );
                            restart_at = Some(Instant::now() + self.restart_delay);
                        }
                    }
                },

                _ = sleep_until(restart_at.unwrap_or_else(Instant::now)), if restart_at.is_some() => {
                    restart_at = None;
                    let resume_block = self.subscribe(&observer)?;
                    self.metrics.record_subscription_restart();
                    info!("🔁 Resubscribed from block {}", resume_block);
                }
            }
        }

        self.subscription.unsubscribe();
        self.print_final_status()?;

        info!("👋 Producer stopped");
        outcome
    }

    fn print_final_status(&self) -> Result<()> {
        info!("📊 Final producer status:");
        info!("  └─ Chain: {}", self.chain_name);
        info!("  └─ Blocks produced this run: {}", self.produced_count());
        match self.storage.get()? {
            Some(produced) => {
                info!("  └─ Last produced block: {}", produced.block_number);
                info!("  └─ Last produced at: {}", produced.produced_at);
            }
            None => info!("  └─ Last produced block: none"),
        }
        Ok(())
    }
}
