use std::sync::{Arc, Mutex, PoisonError};

use serde_json::Value;
use tokio::runtime::Handle;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::conf::StreamSettings;
use crate::error::{StreamError, StreamResult, SubmissionError};
use crate::executor::BulkExecutor;
use crate::flush::{FlushCoordinator, FlushOutcome};
use crate::models::operation::{Operation, QueueItem};
use crate::queue::BoundedQueue;
use crate::stats::{StreamCounters, StreamStats};
use crate::worker::{FlushWorker, WorkerReport};

/// Streams individual writes into bulk requests.
///
/// Producers enqueue operations and wait only while the queue is full;
/// `flusher_count` background workers turn the queue into batches, either
/// as soon as `queue_size` operations are waiting or every `flush_interval`.
/// Submission failures are logged by the workers and never reach producers.
///
/// ```ignore
/// let stream = BulkStream::new(DryRunExecutor, StreamSettings::default())?;
/// stream.index("events", None, Some("1".into()), json!({"n": 1})).await?;
/// let report = stream.shutdown().await;
/// ```
pub struct BulkStream<E: BulkExecutor> {
    settings: StreamSettings,
    queue: Arc<BoundedQueue>,
    coordinator: Arc<FlushCoordinator<E>>,
    counters: Arc<StreamCounters>,
    stop_tx: watch::Sender<bool>,
    workers: Mutex<Vec<JoinHandle<WorkerReport>>>,
    runtime: Handle,
}

#[derive(Debug, Clone)]
pub struct ShutdownReport {
    pub workers: Vec<WorkerReport>,
    pub panicked: usize,
    pub stats: StreamStats,
}

impl<E: BulkExecutor> BulkStream<E> {
    /// Validates `settings` and spawns the flush workers on the current
    /// tokio runtime.
    pub fn new(executor: E, settings: StreamSettings) -> StreamResult<Self> {
        settings.validate()?;
        let runtime = Handle::try_current().map_err(|_| StreamError::NoRuntime)?;
        let capacity = settings
            .queue_capacity()
            .ok_or_else(|| StreamError::InvalidConfig("queue capacity overflow".to_string()))?;

        let queue = Arc::new(BoundedQueue::new(capacity));
        let counters = Arc::new(StreamCounters::default());
        let coordinator = Arc::new(FlushCoordinator::new(
            executor,
            Arc::clone(&queue),
            settings.get_queue_size(),
            settings.get_lock_scope(),
            Arc::clone(&counters),
        ));
        let (stop_tx, stop_rx) = watch::channel(false);

        let workers = (0..settings.get_flusher_count())
            .map(|id| {
                let worker = FlushWorker::new(
                    id,
                    Arc::clone(&coordinator),
                    Arc::clone(&queue),
                    settings.get_queue_size(),
                    settings.get_flush_interval(),
                    stop_rx.clone(),
                );
                runtime.spawn(worker.run())
            })
            .collect();

        info!(
            queue_size = settings.get_queue_size(),
            flush_interval = ?settings.get_flush_interval(),
            flushers = settings.get_flusher_count(),
            capacity,
            lock_scope = ?settings.get_lock_scope(),
            "bulk stream started"
        );

        Ok(Self {
            settings,
            queue,
            coordinator,
            counters,
            stop_tx,
            workers: Mutex::new(workers),
            runtime,
        })
    }

    pub async fn index(
        &self,
        index: impl Into<String>,
        doc_type: Option<String>,
        id: Option<String>,
        document: Value,
    ) -> StreamResult<()> {
        self.enqueue(Operation::index(index, id, document).with_doc_type(doc_type))
            .await
    }

    pub async fn partial_update(
        &self,
        index: impl Into<String>,
        doc_type: Option<String>,
        id: impl Into<String>,
        patch: Value,
    ) -> StreamResult<()> {
        self.enqueue(Operation::partial_update(index, id, patch).with_doc_type(doc_type))
            .await
    }

    /// Waits while the queue is full. Fails only once the stream is shut down.
    pub async fn enqueue(&self, operation: Operation) -> StreamResult<()> {
        self.queue.push(QueueItem::Operation(operation)).await?;
        self.counters.record_enqueued();
        Ok(())
    }

    /// Blocking flavour of [`BulkStream::enqueue`] for plain threads.
    ///
    /// # Panics
    ///
    /// Panics when called from within an asynchronous execution context.
    pub fn blocking_enqueue(&self, operation: Operation) -> StreamResult<()> {
        self.runtime.block_on(self.enqueue(operation))
    }

    pub fn blocking_index(
        &self,
        index: impl Into<String>,
        doc_type: Option<String>,
        id: Option<String>,
        document: Value,
    ) -> StreamResult<()> {
        self.blocking_enqueue(Operation::index(index, id, document).with_doc_type(doc_type))
    }

    pub fn blocking_partial_update(
        &self,
        index: impl Into<String>,
        doc_type: Option<String>,
        id: impl Into<String>,
        patch: Value,
    ) -> StreamResult<()> {
        self.blocking_enqueue(Operation::partial_update(index, id, patch).with_doc_type(doc_type))
    }

    /// Flushes on the caller's task and waits for the batch to complete.
    ///
    /// Like the workers' flushes, this waits for at least one operation.
    pub async fn flush_now(&self) -> Result<FlushOutcome, SubmissionError> {
        self.coordinator.flush().await
    }

    /// Waits until the workers flushed every operation enqueued so far.
    ///
    /// Call it before [`BulkStream::shutdown`] when the tail of the queue
    /// must be delivered: operations still queued behind the stop sentinel
    /// can be discarded.
    pub async fn drain(&self) {
        self.counters.wait_settled().await;
        debug!(stats = ?self.stats(), "bulk stream drained");
    }

    /// Asks the workers to stop once the queue is drained; does not wait.
    ///
    /// The sentinel pushed here aborts the flush that pops it, so operations
    /// assembled into that same batch are discarded.
    pub async fn stop(&self) -> StreamResult<()> {
        // wake up the waiters
        self.queue.clear_if_empty();
        self.queue.push(QueueItem::Shutdown).await?;
        self.stop_tx.send_replace(true);
        info!(queued = self.queue.len(), "bulk stream stopping");
        Ok(())
    }

    /// Stops the stream, closes the queue and joins every worker.
    ///
    /// Enqueueing afterwards fails with [`StreamError::Closed`].
    pub async fn shutdown(&self) -> ShutdownReport {
        if !self.queue.is_closed() {
            if let Err(err) = self.stop().await {
                debug!(error = %err, "stop skipped during shutdown");
            }
        }
        self.queue.close();

        let handles: Vec<_> = self
            .workers
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .drain(..)
            .collect();

        let mut workers = Vec::with_capacity(handles.len());
        let mut panicked = 0;
        for handle in handles {
            match handle.await {
                Ok(report) => workers.push(report),
                Err(err) => {
                    panicked += 1;
                    error!(error = %err, "flush worker did not finish cleanly");
                }
            }
        }

        let stats = self.stats();
        info!(
            submitted = stats.operations_submitted,
            lost = stats.operations_lost,
            discarded = stats.operations_discarded,
            "bulk stream shut down"
        );
        ShutdownReport {
            workers,
            panicked,
            stats,
        }
    }

    pub fn stats(&self) -> StreamStats {
        self.counters.snapshot()
    }

    pub fn queued(&self) -> usize {
        self.queue.len()
    }

    pub fn is_stopping(&self) -> bool {
        *self.stop_tx.borrow()
    }

    pub fn settings(&self) -> &StreamSettings {
        &self.settings
    }

    pub fn executor(&self) -> &E {
        self.coordinator.get_executor()
    }
}

impl<E: BulkExecutor> Drop for BulkStream<E> {
    fn drop(&mut self) {
        // Workers drain what is left and exit on their own.
        self.stop_tx.send_replace(true);
        self.queue.close();
    }
}
