use std::{path::Path, sync::Arc};

use anyhow::Result;
use clap::Parser;
use fevm_block_producer::{
    chains::fevm::{
        client::FevmClient,
        getter::LotusBlockGetter,
        poller::LotusBlockPoller,
        producer::BlockProducer,
        worker::{BlockWorker, WorkerBlockGetter, WorkerData},
    },
    cli::Cli,
    config::AppConfig,
    core::{getter::BlockGetter, storage::KVStorage, types::Block},
    storage::{manager::ProducedBlockStorage, rocksdb::RocksDBStorage},
    utils::{
        logger::init_logger,
        metrics::{NoopProducerMetrics, ProducerMetrics, PrometheusProducerMetrics},
    },
};
use metrics_exporter_prometheus::PrometheusBuilder;
use tokio::sync::{broadcast, mpsc};
use tracing::{error, info};

#[tokio::main]
async fn main() -> Result<()> {
    let args = Cli::parse();
    let cfg = AppConfig::load(&args.config)?;

    // Initialize logger system
    init_logger(&cfg.logging)?;

    info!("✅ Configuration load successful");
    info!(chain_name = %cfg.producer.chain_name, "Chain name");
    info!(start_block = cfg.producer.start_block, "Start block number");
    info!(max_retries = cfg.producer.max_retries, "Receipt retries");
    info!(use_worker = cfg.producer.use_worker, "Worker offload");
    info!(rpc_url = %cfg.rpc.url, "RPC node");

    let metrics: Arc<dyn ProducerMetrics> = if cfg.metrics.enable {
        PrometheusBuilder::new()
            .with_http_listener(([0, 0, 0, 0], cfg.metrics.prometheus_exporter_port))
            .install()?;
        info!(
            "📈 Prometheus exporter listening on port {}",
            cfg.metrics.prometheus_exporter_port
        );
        Arc::new(PrometheusProducerMetrics::new(cfg.producer.chain_name.clone()))
    } else {
        Arc::new(NoopProducerMetrics::new())
    };

    // Create shutdown channel
    let (shutdown_tx, shutdown_rx) = broadcast::channel::<()>(1);

    // Spawn signal handler task for Ctrl+C
    let shutdown_tx_sigint = shutdown_tx.clone();
    tokio::spawn(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            return;
        }

        info!("📡 Received shutdown signal (Ctrl+C)");
        // Send shutdown signal (ignore error if receiver is dropped)
        let _ = shutdown_tx_sigint.send(());
    });

    // SIGTERM handler (Unix only)
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let shutdown_tx_sigterm = shutdown_tx.clone();
        tokio::spawn(async move {
            if let Ok(mut sigterm) = signal(SignalKind::terminate()) {
                sigterm.recv().await;
                info!("📡 Received SIGTERM signal");
                let _ = shutdown_tx_sigterm.send(());
            }
        });
    }

    // Initialize storage
    let storage_path = Path::new(&cfg.storage.path).join(&cfg.producer.chain_name);
    let storage_path = storage_path.to_string_lossy();
    let storage = RocksDBStorage::new(&storage_path)?;
    storage.init()?;
    info!("✅ Storage initialized at: {}", storage_path);
    let storage = Arc::new(storage);

    let client = Arc::new(FevmClient::connect(&cfg.rpc.url, cfg.rpc.timeout()).await?);
    info!("✅ Connected to FEVM node");
    let getter = LotusBlockGetter::new(client, cfg.producer.max_retries);

    if cfg.producer.use_worker {
        let worker_data = WorkerData::new(cfg.rpc.url.clone(), cfg.producer.max_retries)
            .with_rpc_timeout(cfg.rpc.timeout());
        let (worker, responses) = BlockWorker::spawn(worker_data)?;
        info!("🧵 Block fetching offloaded to a worker thread");
        let getter = WorkerBlockGetter::new(getter, worker, responses);
        run_producer(&cfg, Arc::new(getter), storage, metrics, shutdown_rx).await?;
    } else {
        run_producer(&cfg, Arc::new(getter), storage, metrics, shutdown_rx).await?;
    }

    info!("✨ Producer exited successfully");
    Ok(())
}

async fn run_producer<G: BlockGetter + 'static>(
    cfg: &AppConfig,
    getter: Arc<G>,
    storage: Arc<RocksDBStorage>,
    metrics: Arc<dyn ProducerMetrics>,
    shutdown: broadcast::Receiver<()>,
) -> Result<()> {
    let poller = LotusBlockPoller::new(getter, cfg.producer.block_polling_timeout())
        .with_metrics(Arc::clone(&metrics));

    // Downstream consumer, encoding and publishing live elsewhere
    let (sink, mut blocks) = mpsc::channel::<Block>(cfg.producer.sink_buffer);
    let consumer = tokio::spawn(async move {
        while let Some(block) = blocks.recv().await {
            info!(
                "📤 Block {} handed off ({} transactions, hash {})",
                block.number,
                block.transactions.len(),
                block.hash
            );
        }
    });

    let producer = BlockProducer::new(
        cfg.producer.chain_name.clone(),
        Arc::new(poller),
        sink,
        ProducedBlockStorage::new(Arc::clone(&storage), cfg.producer.chain_name.clone()),
        cfg.producer.start_block,
        cfg.producer.block_polling_timeout(),
    )
    .with_queue_limit(cfg.producer.sink_buffer)
    .with_metrics(metrics);

    info!("🔄 Starting block producer...");
    info!("💡 Press Ctrl+C to stop gracefully");
    let result = producer.run(shutdown).await;

    drop(producer);
    let _ = consumer.await;
    storage.flush()?;
    result
}
