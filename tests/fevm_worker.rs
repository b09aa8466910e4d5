mod common;

use std::{sync::Arc, time::Duration};

use common::{MockChain, RecordingObserver, tx_hash};
use fevm_block_producer::{
    chains::fevm::{
        getter::LotusBlockGetter,
        poller::LotusBlockPoller,
        worker::{BlockWorker, WorkerBlockGetter, WorkerData},
    },
    core::{getter::BlockGetter, subscription::BlockSubscription},
    error::ProducerError,
};

const ENDPOINT: &str = "ws://127.0.0.1:1234/rpc/v1";

fn chain() -> MockChain {
    let chain = MockChain::default();
    chain.add_block(1, 3, 3);
    chain.add_block(2, 2, 1);
    chain.add_block(3, 0, 0);
    chain.null_round(4);
    chain.add_block(5, 1, 1);
    chain
}

fn worker_getter(chain: &MockChain, max_retries: u32) -> WorkerBlockGetter<LotusBlockGetter<MockChain>> {
    let worker_chain = chain.clone();
    let (worker, responses) =
        BlockWorker::spawn_with(WorkerData::new(ENDPOINT, max_retries), move |_| async move {
            Ok::<_, ProducerError>(worker_chain)
        })
        .expect("worker starts");

    let latest = LotusBlockGetter::new(Arc::new(chain.clone()), max_retries);
    WorkerBlockGetter::new(latest, worker, responses)
}

#[tokio::test]
async fn worker_returns_the_same_blocks_as_a_direct_getter() {
    let chain = chain();
    let direct = LotusBlockGetter::new(Arc::new(chain.clone()), 0);
    let offloaded = worker_getter(&chain, 0);

    for number in [1, 2, 3, 5] {
        let expected = direct.get_block_with_transaction_receipts(number).await.unwrap();
        let actual = offloaded
            .get_block_with_transaction_receipts(number)
            .await
            .unwrap();
        assert_eq!(actual, expected);
    }

    let block = offloaded.get_block_with_transaction_receipts(2).await.unwrap();
    assert_eq!(block.transactions.len(), 1);
    assert_eq!(block.transactions[0].hash, tx_hash(2, 0));
    assert_eq!(block.transactions[0].receipt.transaction_hash, tx_hash(2, 0));

    assert_eq!(offloaded.get_latest_block_number().await.unwrap(), 5);
    assert_eq!(offloaded.pending_requests(), 0);
}

#[tokio::test]
async fn worker_errors_come_back_through_the_response() {
    let chain = chain();
    let offloaded = worker_getter(&chain, 2);

    let null_round = offloaded
        .get_block_with_transaction_receipts(4)
        .await
        .unwrap_err();
    assert!(null_round.is_null_round());

    let missing = offloaded
        .get_block_with_transaction_receipts(42)
        .await
        .unwrap_err();
    assert_eq!(missing, ProducerError::BlockNotFound(42));

    // still serving after failures
    let block = offloaded.get_block_with_transaction_receipts(1).await.unwrap();
    assert_eq!(block.transactions.len(), 3);
    assert!(offloaded.is_worker_running());
}

#[tokio::test]
async fn concurrent_requests_are_matched_by_callback() {
    let chain = chain();
    chain.delay(1, Duration::from_millis(300));
    let offloaded = worker_getter(&chain, 0);

    let (slow, fast, empty) = tokio::join!(
        offloaded.get_block_with_transaction_receipts(1),
        offloaded.get_block_with_transaction_receipts(2),
        offloaded.get_block_with_transaction_receipts(3),
    );

    assert_eq!(slow.unwrap().number, 1);
    assert_eq!(fast.unwrap().number, 2);
    assert_eq!(empty.unwrap().number, 3);
    assert_eq!(offloaded.pending_requests(), 0);
}

#[tokio::test]
async fn missing_endpoint_is_rejected_before_start() {
    let result = BlockWorker::spawn_with(WorkerData::new("", 0), |_| async {
        Ok::<_, ProducerError>(MockChain::default())
    });

    assert!(matches!(result, Err(ProducerError::WorkerInit(_))));
}

#[tokio::test]
async fn failed_worker_connection_makes_requests_fail() {
    let chain = chain();
    let (worker, responses) = BlockWorker::spawn_with(WorkerData::new(ENDPOINT, 0), |_| async {
        Err::<MockChain, _>(ProducerError::Rpc("connection refused".to_string()))
    })
    .expect("worker thread starts");
    let offloaded = WorkerBlockGetter::new(
        LotusBlockGetter::new(Arc::new(chain), 0),
        worker,
        responses,
    );

    let err = offloaded
        .get_block_with_transaction_receipts(1)
        .await
        .unwrap_err();
    assert!(matches!(err, ProducerError::WorkerUnavailable(_)));

    let err = offloaded
        .get_block_with_transaction_receipts(2)
        .await
        .unwrap_err();
    assert!(matches!(err, ProducerError::WorkerUnavailable(_)));
    assert!(!offloaded.is_worker_running());
}

#[tokio::test]
async fn poller_runs_on_top_of_the_worker() {
    let chain = chain();
    let offloaded = Arc::new(worker_getter(&chain, 0));
    let poller = LotusBlockPoller::new(offloaded, Duration::from_millis(20));
    let observer = Arc::new(RecordingObserver::default());

    poller.subscribe(observer.clone(), 1);
    observer.wait_for_blocks(4).await;
    poller.unsubscribe();

    // 4 is a null round
    assert_eq!(observer.blocks(), vec![1, 2, 3, 5]);
    assert!(observer.errors().is_empty());
}
