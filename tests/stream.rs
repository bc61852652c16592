mod common;

use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use es_bulk_stream::{BulkStream, FlushOutcome, StreamError, StreamSettings};
use rstest::rstest;
use serde_json::json;
use tokio::time::Instant;

use common::{ids, names, op, RecordingExecutor};

const WAIT: Duration = Duration::from_secs(10);

#[tokio::test(start_paused = true)]
async fn five_operations_split_into_full_then_partial_batch() {
    let executor = RecordingExecutor::new();
    let stream = BulkStream::new(
        executor.clone(),
        StreamSettings::new(3, Duration::from_secs(1), 1),
    )
    .unwrap();

    for name in ["A", "B", "C", "D", "E"] {
        stream.enqueue(op(name)).await.unwrap();
    }

    assert!(executor.wait_for_submitted(5, WAIT).await);
    let batches: Vec<Vec<String>> = executor.batches().iter().map(|b| ids(b)).collect();
    assert_eq!(batches, vec![names(&["A", "B", "C"]), names(&["D", "E"])]);
}

#[tokio::test(start_paused = true)]
async fn full_queue_flushes_before_the_interval() {
    let executor = RecordingExecutor::new();
    let interval = Duration::from_secs(60);
    let stream = BulkStream::new(executor.clone(), StreamSettings::new(4, interval, 1)).unwrap();
    let start = Instant::now();

    for n in 0..4 {
        stream.enqueue(op(&n.to_string())).await.unwrap();
    }

    assert!(executor.wait_for_submitted(4, WAIT).await);
    assert!(start.elapsed() < interval);
    assert_eq!(executor.batches().len(), 1);
}

#[tokio::test(start_paused = true)]
async fn sparse_queue_flushes_after_the_interval() {
    let executor = RecordingExecutor::new();
    let interval = Duration::from_millis(200);
    let stream = BulkStream::new(executor.clone(), StreamSettings::new(10, interval, 1)).unwrap();
    let start = Instant::now();

    stream.index("test", None, Some("lonely".to_string()), json!({})).await.unwrap();

    assert!(executor.wait_for_submitted(1, WAIT).await);
    let elapsed = start.elapsed();
    assert!(elapsed >= interval);
    assert!(elapsed < interval * 2);
    assert_eq!(executor.submitted_ids(), names(&["lonely"]));
}

#[tokio::test]
async fn single_producer_single_worker_keeps_fifo_order() {
    let executor = RecordingExecutor::new();
    let stream = BulkStream::new(
        executor.clone(),
        StreamSettings::new(5, Duration::from_millis(5), 1),
    )
    .unwrap();

    let expected: Vec<String> = (0..23).map(|n| n.to_string()).collect();
    for name in &expected {
        stream.enqueue(op(name)).await.unwrap();
    }

    assert!(executor.wait_for_submitted(expected.len(), WAIT).await);
    assert_eq!(executor.submitted_ids(), expected);
}

#[tokio::test]
async fn no_batch_exceeds_queue_size() {
    let executor = RecordingExecutor::new().with_delay(Duration::from_millis(2));
    let stream = BulkStream::new(
        executor.clone(),
        StreamSettings::new(3, Duration::from_millis(5), 2),
    )
    .unwrap();

    for n in 0..40 {
        stream.enqueue(op(&n.to_string())).await.unwrap();
    }

    assert!(executor.wait_for_submitted(40, WAIT).await);
    let batches = executor.batches();
    assert!(batches.iter().all(|batch| !batch.is_empty() && batch.len() <= 3));

    let seen: HashSet<String> = executor.submitted_ids().into_iter().collect();
    assert_eq!(seen.len(), 40);
}

#[tokio::test]
async fn producers_wait_only_when_the_queue_is_full() {
    let (executor, gate) = RecordingExecutor::new().gated();
    // capacity = 1 * 1 * 2
    let stream = Arc::new(
        BulkStream::new(
            executor.clone(),
            StreamSettings::new(1, Duration::from_millis(5), 1),
        )
        .unwrap(),
    );
    let quick = Duration::from_millis(50);

    // The worker pops A and then hangs on the closed gate.
    tokio::time::timeout(quick, stream.enqueue(op("A"))).await.unwrap().unwrap();
    tokio::time::sleep(Duration::from_millis(30)).await;
    tokio::time::timeout(quick, stream.enqueue(op("B"))).await.unwrap().unwrap();
    tokio::time::timeout(quick, stream.enqueue(op("C"))).await.unwrap().unwrap();
    assert_eq!(stream.queued(), 2);

    let blocked = {
        let stream = Arc::clone(&stream);
        tokio::spawn(async move { stream.enqueue(op("D")).await })
    };
    tokio::time::sleep(quick).await;
    assert!(!blocked.is_finished());

    gate.add_permits(100);
    blocked.await.unwrap().unwrap();
    assert!(executor.wait_for_submitted(4, WAIT).await);
    assert_eq!(executor.submitted_ids(), names(&["A", "B", "C", "D"]));
}

#[tokio::test]
async fn failed_batch_does_not_stop_the_worker() {
    let executor = RecordingExecutor::new();
    executor.fail_next(1);
    let stream = BulkStream::new(
        executor.clone(),
        StreamSettings::new(2, Duration::from_millis(10), 1),
    )
    .unwrap();

    stream.enqueue(op("doomed")).await.unwrap();
    assert!(executor.wait_for_failures(1, WAIT).await);

    stream.enqueue(op("survivor")).await.unwrap();
    assert!(executor.wait_for_submitted(1, WAIT).await);
    assert_eq!(executor.submitted_ids(), names(&["survivor"]));

    let stats = stream.stats();
    assert_eq!(stats.failed_batches, 1);
    assert_eq!(stats.operations_lost, 1);
    assert_eq!(stats.operations_submitted, 1);
}

#[tokio::test(start_paused = true)]
async fn flush_now_submits_on_the_calling_task() {
    let executor = RecordingExecutor::new();
    let stream = BulkStream::new(
        executor.clone(),
        StreamSettings::new(10, Duration::from_secs(3600), 1),
    )
    .unwrap();

    stream.enqueue(op("x")).await.unwrap();
    stream.partial_update("test", None, "y", json!({"v": 2})).await.unwrap();

    match stream.flush_now().await.unwrap() {
        FlushOutcome::Submitted(ack) => assert_eq!(ack.items, 2),
        other => panic!("unexpected outcome {:?}", other),
    }
    assert_eq!(executor.submitted_ids(), names(&["x", "y"]));
    assert_eq!(stream.stats().flushes_submitted, 1);
}

#[tokio::test]
async fn shutdown_joins_every_worker_and_settles_every_operation() {
    let executor = RecordingExecutor::new();
    let stream = BulkStream::new(
        executor.clone(),
        StreamSettings::new(5, Duration::from_millis(10), 3),
    )
    .unwrap();

    for n in 0..50 {
        stream.enqueue(op(&n.to_string())).await.unwrap();
    }
    let report = tokio::time::timeout(WAIT, stream.shutdown()).await.unwrap();

    assert_eq!(report.workers.len(), 3);
    assert_eq!(report.panicked, 0);
    assert_eq!(report.stats.operations_enqueued, 50);
    // Operations batched together with the sentinel are discarded, not lost.
    assert_eq!(report.stats.operations_settled(), 50);
    assert_eq!(report.stats.operations_lost, 0);
    assert_eq!(stream.queued(), 0);

    assert!(matches!(
        stream.enqueue(op("late")).await,
        Err(StreamError::Closed)
    ));
}

#[rstest]
#[case(5, 1)]
#[case(25, 1)]
#[case(25, 3)]
#[tokio::test(start_paused = true)]
async fn drain_before_shutdown_delivers_the_partial_tail(
    #[case] count: usize,
    #[case] flushers: usize,
) {
    let executor = RecordingExecutor::new();
    let stream = BulkStream::new(
        executor.clone(),
        StreamSettings::new(10, Duration::from_secs(1), flushers),
    )
    .unwrap();

    for n in 0..count {
        stream.enqueue(op(&n.to_string())).await.unwrap();
    }
    tokio::time::timeout(WAIT, stream.drain()).await.unwrap();
    let report = stream.shutdown().await;

    assert_eq!(report.stats.operations_submitted, count as u64);
    assert_eq!(report.stats.operations_discarded, 0);
    assert_eq!(executor.submitted_ids().len(), count);
}

#[tokio::test]
async fn operations_flushed_before_stop_are_all_delivered() {
    let executor = RecordingExecutor::new();
    let stream = BulkStream::new(
        executor.clone(),
        StreamSettings::new(4, Duration::from_millis(10), 2),
    )
    .unwrap();

    for n in 0..10 {
        stream.enqueue(op(&n.to_string())).await.unwrap();
    }
    assert!(executor.wait_for_submitted(10, WAIT).await);

    stream.stop().await.unwrap();
    assert!(stream.is_stopping());
    let report = tokio::time::timeout(WAIT, stream.shutdown()).await.unwrap();
    assert_eq!(report.stats.operations_submitted, 10);
    assert_eq!(report.stats.operations_discarded, 0);
}

#[tokio::test]
async fn shutdown_on_an_idle_stream_returns_promptly() {
    let stream = BulkStream::new(
        RecordingExecutor::new(),
        StreamSettings::new(10, Duration::from_secs(3600), 4),
    )
    .unwrap();
    let report = tokio::time::timeout(Duration::from_secs(5), stream.shutdown())
        .await
        .unwrap();
    assert_eq!(report.workers.len(), 4);
    assert!(report.stats.aborted_flushes >= 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn plain_threads_can_produce() {
    let executor = RecordingExecutor::new();
    let stream = Arc::new(
        BulkStream::new(
            executor.clone(),
            StreamSettings::new(4, Duration::from_millis(5), 2),
        )
        .unwrap(),
    );

    let producers: Vec<_> = (0..3)
        .map(|thread| {
            let stream = Arc::clone(&stream);
            std::thread::spawn(move || {
                for n in 0..20 {
                    stream
                        .blocking_index("test", None, Some(format!("{}-{}", thread, n)), json!({}))
                        .unwrap();
                }
            })
        })
        .collect();
    tokio::task::spawn_blocking(move || {
        for producer in producers {
            producer.join().unwrap();
        }
    })
    .await
    .unwrap();

    assert!(executor.wait_for_submitted(60, WAIT).await);
    let seen: HashSet<String> = executor.submitted_ids().into_iter().collect();
    assert_eq!(seen.len(), 60);
    assert_eq!(stream.stats().operations_enqueued, 60);
}

#[tokio::test]
async fn invalid_settings_are_refused() {
    let result = BulkStream::new(
        RecordingExecutor::new(),
        StreamSettings::new(0, Duration::from_secs(1), 1),
    );
    assert!(matches!(result, Err(StreamError::InvalidConfig(_))));
}

#[test]
fn stream_needs_a_runtime() {
    let result = BulkStream::new(RecordingExecutor::new(), StreamSettings::default());
    assert!(matches!(result, Err(StreamError::NoRuntime)));
}
