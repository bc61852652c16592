#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use es_bulk_stream::{BulkAck, BulkBatch, BulkExecutor, Operation, SubmissionError};
use serde_json::json;
use tokio::sync::{Notify, Semaphore};

/// Executor keeping every batch it was asked to submit.
#[derive(Clone, Default)]
pub struct RecordingExecutor {
    inner: Arc<Recorder>,
}

#[derive(Default)]
struct Recorder {
    submitted: Mutex<Vec<Vec<Operation>>>,
    failed: Mutex<Vec<Vec<Operation>>>,
    fail_next: AtomicUsize,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    delay: Mutex<Option<Duration>>,
    gate: Mutex<Option<Arc<Semaphore>>>,
    changed: Notify,
}

pub struct RecordingBatch {
    inner: Arc<Recorder>,
    operations: Vec<Operation>,
}

impl RecordingExecutor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Every submission sleeps for `delay` before answering.
    pub fn with_delay(self, delay: Duration) -> Self {
        *self.inner.delay.lock().unwrap() = Some(delay);
        self
    }

    /// Submissions wait for a permit of the returned semaphore.
    pub fn gated(self) -> (Self, Arc<Semaphore>) {
        let gate = Arc::new(Semaphore::new(0));
        *self.inner.gate.lock().unwrap() = Some(Arc::clone(&gate));
        (self, gate)
    }

    pub fn fail_next(&self, count: usize) {
        self.inner.fail_next.store(count, Ordering::SeqCst);
    }

    pub fn batches(&self) -> Vec<Vec<Operation>> {
        self.inner.submitted.lock().unwrap().clone()
    }

    pub fn failed_batches(&self) -> Vec<Vec<Operation>> {
        self.inner.failed.lock().unwrap().clone()
    }

    pub fn submitted_ids(&self) -> Vec<String> {
        self.batches().iter().flat_map(|batch| ids(batch)).collect()
    }

    pub fn max_in_flight(&self) -> usize {
        self.inner.max_in_flight.load(Ordering::SeqCst)
    }

    /// Waits until `count` operations went through successful submissions.
    pub async fn wait_for_submitted(&self, count: usize, within: Duration) -> bool {
        self.wait_until(within, |recorder| {
            recorder
                .submitted
                .lock()
                .unwrap()
                .iter()
                .map(Vec::len)
                .sum::<usize>()
                >= count
        })
        .await
    }

    pub async fn wait_for_failures(&self, count: usize, within: Duration) -> bool {
        self.wait_until(within, |recorder| recorder.failed.lock().unwrap().len() >= count)
            .await
    }

    async fn wait_until(&self, within: Duration, done: impl Fn(&Recorder) -> bool) -> bool {
        tokio::time::timeout(within, async {
            loop {
                let changed = self.inner.changed.notified();
                if done(&self.inner) {
                    return;
                }
                changed.await;
            }
        })
        .await
        .is_ok()
    }
}

impl BulkExecutor for RecordingExecutor {
    type Batch = RecordingBatch;

    fn open_batch(&self) -> RecordingBatch {
        RecordingBatch {
            inner: Arc::clone(&self.inner),
            operations: Vec::new(),
        }
    }
}

#[async_trait]
impl BulkBatch for RecordingBatch {
    fn append(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    fn len(&self) -> usize {
        self.operations.len()
    }

    async fn submit(self) -> Result<BulkAck, SubmissionError> {
        let inner = self.inner;
        let now = inner.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        inner.max_in_flight.fetch_max(now, Ordering::SeqCst);

        let gate = inner.gate.lock().unwrap().clone();
        if let Some(gate) = gate {
            gate.acquire().await.unwrap().forget();
        }
        let delay = *inner.delay.lock().unwrap();
        if let Some(delay) = delay {
            tokio::time::sleep(delay).await;
        }

        inner.in_flight.fetch_sub(1, Ordering::SeqCst);
        let items = self.operations.len();
        let fail = inner
            .fail_next
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        let result = if fail {
            inner.failed.lock().unwrap().push(self.operations);
            Err(SubmissionError::Other("injected failure".to_string()))
        } else {
            inner.submitted.lock().unwrap().push(self.operations);
            Ok(BulkAck {
                items,
                took_ms: Some(1),
            })
        };
        inner.changed.notify_waiters();
        result
    }
}

pub fn op(name: &str) -> Operation {
    Operation::index("test", Some(name.to_string()), json!({ "name": name }))
}

pub fn ids(batch: &[Operation]) -> Vec<String> {
    batch
        .iter()
        .map(|operation| operation.get_id().unwrap_or_default().to_string())
        .collect()
}

pub fn names(values: &[&str]) -> Vec<String> {
    values.iter().map(|value| value.to_string()).collect()
}
