//! Block fetching offloaded to a dedicated thread.
//!
//! A [`BlockWorker`] owns its own Tokio runtime and its own node connection, so a
//! slow `eth_getTransactionReceipt` storm never stalls the polling loop. The
//! coordinator side, [`WorkerBlockGetter`], talks to it with correlated
//! request/response messages and exposes the usual [`BlockGetter`] interface.

use std::{
    collections::HashMap,
    future::Future,
    sync::{
        Arc, Mutex, PoisonError,
        atomic::{AtomicU64, Ordering},
    },
    thread,
    time::Duration,
};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::{
    sync::{mpsc, oneshot},
    task::JoinHandle,
};
use tracing::{debug, error, info, warn};

use crate::{
    chains::fevm::{
        client::{DEFAULT_RPC_TIMEOUT, FevmClient},
        getter::LotusBlockGetter,
    },
    core::{client::ChainClient, getter::BlockGetter, types::Block},
    error::ProducerError,
};

/// Parameters a worker needs before it may start.
#[derive(Debug, Clone)]
pub struct WorkerData {
    pub endpoint: String,
    pub max_retries: u32,
    pub rpc_timeout: Duration,
}

impl WorkerData {
    pub fn new(endpoint: impl Into<String>, max_retries: u32) -> Self {
        Self {
            endpoint: endpoint.into(),
            max_retries,
            rpc_timeout: DEFAULT_RPC_TIMEOUT,
        }
    }

    pub fn with_rpc_timeout(mut self, rpc_timeout: Duration) -> Self {
        self.rpc_timeout = rpc_timeout;
        self
    }

    fn validate(&self) -> Result<(), ProducerError> {
        if self.endpoint.trim().is_empty() {
            return Err(ProducerError::WorkerInit(
                "missing node endpoint".to_string(),
            ));
        }
        Ok(())
    }
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct BlockWorkerRequest {
    pub block_number: u64,
    pub callback_id: u64,
}

/// Reply to a [`BlockWorkerRequest`]; exactly one of `error` and `block` is set.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct BlockWorkerResponse {
    pub callback_id: u64,
    pub error: Option<ProducerError>,
    pub block: Option<Block>,
}

impl BlockWorkerResponse {
    pub fn from_result(callback_id: u64, result: Result<Block, ProducerError>) -> Self {
        match result {
            Ok(block) => Self {
                callback_id,
                error: None,
                block: Some(block),
            },
            Err(error) => Self {
                callback_id,
                error: Some(error),
                block: None,
            },
        }
    }

    pub fn into_result(self) -> Result<Block, ProducerError> {
        match (self.error, self.block) {
            (Some(error), _) => Err(error),
            (None, Some(block)) => Ok(block),
            (None, None) => Err(ProducerError::Unknown(format!(
                "empty worker response for callback {}",
                self.callback_id
            ))),
        }
    }
}

/// Handle to a block worker thread.
///
/// The worker lives until every handle to its request channel is dropped. It is
/// never restarted; reconnecting is left to the node transport.
pub struct BlockWorker {
    requests: mpsc::UnboundedSender<BlockWorkerRequest>,
    thread: Option<thread::JoinHandle<()>>,
}

impl BlockWorker {
    /// Start a worker with its own [`FevmClient`] connection.
    pub fn spawn(
        worker_data: WorkerData,
    ) -> Result<(Self, mpsc::UnboundedReceiver<BlockWorkerResponse>), ProducerError> {
        Self::spawn_with(worker_data, |data: WorkerData| async move {
            FevmClient::connect(&data.endpoint, data.rpc_timeout).await
        })
    }

    /// Start a worker whose client is built by `connect` on the worker thread.
    ///
    /// Fails immediately, without starting a thread, when `worker_data` is incomplete.
    pub fn spawn_with<C, F, Fut>(
        worker_data: WorkerData,
        connect: F,
    ) -> Result<(Self, mpsc::UnboundedReceiver<BlockWorkerResponse>), ProducerError>
    where
        C: ChainClient + 'static,
        F: FnOnce(WorkerData) -> Fut + Send + 'static,
        Fut: Future<Output = Result<C, ProducerError>>,
    {
        worker_data.validate()?;

        let (request_tx, request_rx) = mpsc::unbounded_channel();
        let (response_tx, response_rx) = mpsc::unbounded_channel();

        let thread = thread::Builder::new()
            .name("fevm-block-worker".to_string())
            .spawn(move || run_worker(worker_data, connect, request_rx, response_tx))
            .map_err(|e| ProducerError::WorkerInit(format!("failed to spawn worker thread: {e}")))?;

        Ok((
            Self {
                requests: request_tx,
                thread: Some(thread),
            },
            response_rx,
        ))
    }

    pub fn post_message(&self, request: BlockWorkerRequest) -> Result<(), ProducerError> {
        self.requests
            .send(request)
            .map_err(|e| {
                ProducerError::WorkerUnavailable(format!(
                    "worker stopped before block {} was requested",
                    e.0.block_number
                ))
            })
    }

    pub fn is_running(&self) -> bool {
        !self.requests.is_closed()
            && self
                .thread
                .as_ref()
                .is_some_and(|thread| !thread.is_finished())
    }
}

fn run_worker<C, F, Fut>(
    worker_data: WorkerData,
    connect: F,
    mut requests: mpsc::UnboundedReceiver<BlockWorkerRequest>,
    responses: mpsc::UnboundedSender<BlockWorkerResponse>,
) where
    C: ChainClient + 'static,
    F: FnOnce(WorkerData) -> Fut,
    Fut: Future<Output = Result<C, ProducerError>>,
{
    let runtime = match tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
    {
        Ok(runtime) => runtime,
        Err(e) => {
            error!("❌ Block worker failed to build its runtime: {}", e);
            return;
        }
    };

    runtime.block_on(async move {
        let max_retries = worker_data.max_retries;
        let client = match connect(worker_data).await {
            Ok(client) => Arc::new(client),
            Err(e) => {
                error!("❌ Block worker failed to connect: {}", e);
                return;
            }
        };
        let getter = Arc::new(LotusBlockGetter::new(client, max_retries));
        info!("🧵 Block worker ready");

        while let Some(request) = requests.recv().await {
            let getter = Arc::clone(&getter);
            let responses = responses.clone();
            let BlockWorkerRequest {
                block_number,
                callback_id,
            } = request;

            // Requests run concurrently and may answer out of order
            tokio::spawn(async move {
                let fetch = tokio::spawn(async move {
                    getter.get_block_with_transaction_receipts(block_number).await
                });
                let result = fetch.await.unwrap_or_else(|e| {
                    error!("❌ Block {} fetch aborted: {}", block_number, e);
                    Err(ProducerError::create_unknown(e))
                });

                if responses
                    .send(BlockWorkerResponse::from_result(callback_id, result))
                    .is_err()
                {
                    debug!("Response for callback {} dropped, coordinator is gone", callback_id);
                }
            });
        }

        debug!("Block worker request channel closed, exiting");
    });
}

#[derive(Default)]
struct PendingCallbacks {
    closed: bool,
    callbacks: HashMap<u64, oneshot::Sender<Result<Block, ProducerError>>>,
}

/// [`BlockGetter`] that fetches blocks through a [`BlockWorker`].
///
/// The latest block number is answered on the coordinating side by `latest`,
/// it is a single cheap call.
pub struct WorkerBlockGetter<G> {
    latest: G,
    worker: BlockWorker,
    pending: Arc<Mutex<PendingCallbacks>>,
    next_callback_id: AtomicU64,
    dispatcher: JoinHandle<()>,
}

impl<G: BlockGetter> WorkerBlockGetter<G> {
    /// Must be called from within a Tokio runtime: response dispatching runs as a task on it.
    pub fn new(
        latest: G,
        worker: BlockWorker,
        responses: mpsc::UnboundedReceiver<BlockWorkerResponse>,
    ) -> Self {
        let pending = Arc::new(Mutex::new(PendingCallbacks::default()));
        let dispatcher = tokio::spawn(dispatch_responses(responses, Arc::clone(&pending)));

        Self {
            latest,
            worker,
            pending,
            next_callback_id: AtomicU64::new(1),
            dispatcher,
        }
    }

    pub fn pending_requests(&self) -> usize {
        self.pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .len()
    }

    pub fn is_worker_running(&self) -> bool {
        let closed = self
            .pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .closed;
        !closed && self.worker.is_running()
    }
}

impl<G> Drop for WorkerBlockGetter<G> {
    fn drop(&mut self) {
        self.dispatcher.abort();
    }
}

async fn dispatch_responses(
    mut responses: mpsc::UnboundedReceiver<BlockWorkerResponse>,
    pending: Arc<Mutex<PendingCallbacks>>,
) {
    while let Some(response) = responses.recv().await {
        let callback = pending
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .callbacks
            .remove(&response.callback_id);

        match callback {
            // The caller may have given up waiting
            Some(callback) => {
                let _ = callback.send(response.into_result());
            }
            None => warn!(
                "⚠️ Worker answered unknown callback {}",
                response.callback_id
            ),
        }
    }

    let mut state = pending.lock().unwrap_or_else(PoisonError::into_inner);
    state.closed = true;
    if !state.callbacks.is_empty() {
        warn!(
            "⚠️ Block worker exited with {} requests in flight",
            state.callbacks.len()
        );
    }
    for (_, callback) in state.callbacks.drain() {
        let _ = callback.send(Err(ProducerError::WorkerUnavailable(
            "block worker exited".to_string(),
        )));
    }
}

#[async_trait]
impl<G: BlockGetter> BlockGetter for WorkerBlockGetter<G> {
    async fn get_block_with_transaction_receipts(
        &self,
        block_number: u64,
    ) -> Result<Block, ProducerError> {
        let callback_id = self.next_callback_id.fetch_add(1, Ordering::Relaxed);
        let (tx, rx) = oneshot::channel();

        {
            let mut state = self.pending.lock().unwrap_or_else(PoisonError::into_inner);
            if state.closed {
                return Err(ProducerError::WorkerUnavailable(
                    "block worker exited".to_string(),
                ));
            }
            state.callbacks.insert(callback_id, tx);
        }

        if let Err(e) = self.worker.post_message(BlockWorkerRequest {
            block_number,
            callback_id,
        }) {
            self.pending
                .lock()
                .unwrap_or_else(PoisonError::into_inner)
                .callbacks
                .remove(&callback_id);
            return Err(e);
        }

        rx.await.map_err(|_| {
            ProducerError::WorkerUnavailable(format!(
                "no response for block {block_number} (callback {callback_id})"
            ))
        })?
    }

    async fn get_latest_block_number(&self) -> Result<u64, ProducerError> {
        self.latest.get_latest_block_number().await
    }
}
