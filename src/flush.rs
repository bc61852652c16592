use std::sync::Arc;

use tokio::sync::Mutex;
use tracing::{debug, warn};

use crate::conf::LockScope;
use crate::error::SubmissionError;
use crate::executor::{BulkBatch, BulkExecutor};
use crate::models::bulk::BulkAck;
use crate::models::operation::QueueItem;
use crate::queue::BoundedQueue;
use crate::stats::StreamCounters;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FlushOutcome {
    Submitted(BulkAck),
    /// The shutdown sentinel was met while assembling; nothing was sent and
    /// the operations already appended to the batch are gone.
    ShutdownAbort { discarded: usize },
}

/// Drains bounded runs of the queue into batches, one assembly at a time.
pub struct FlushCoordinator<E: BulkExecutor> {
    executor: E,
    queue: Arc<BoundedQueue>,
    submission_lock: Mutex<()>,
    queue_size: usize,
    lock_scope: LockScope,
    counters: Arc<StreamCounters>,
}

impl<E: BulkExecutor> FlushCoordinator<E> {
    pub fn new(
        executor: E,
        queue: Arc<BoundedQueue>,
        queue_size: usize,
        lock_scope: LockScope,
        counters: Arc<StreamCounters>,
    ) -> Self {
        Self {
            executor,
            queue,
            submission_lock: Mutex::new(()),
            queue_size: queue_size.max(1),
            lock_scope,
            counters,
        }
    }

    pub fn get_executor(&self) -> &E {
        &self.executor
    }

    /// Pulls at least one and at most `queue_size` operations into a fresh
    /// batch and submits it.
    ///
    /// Waits for the first operation when the queue is empty. Dropping the
    /// returned future mid-assembly loses whatever was already popped.
    pub async fn flush(&self) -> Result<FlushOutcome, SubmissionError> {
        let mut batch = self.executor.open_batch();

        let guard = self.submission_lock.lock().await;
        if let Some(discarded) = self.assemble(&mut batch).await {
            drop(guard);
            self.counters.record_aborted(discarded);
            warn!(discarded, "shutdown sentinel reached, flush aborted");
            return Ok(FlushOutcome::ShutdownAbort { discarded });
        }
        let _held = match self.lock_scope {
            LockScope::Assembly => {
                drop(guard);
                None
            }
            LockScope::AssemblyAndSubmission => Some(guard),
        };

        let items = batch.len();
        debug!(items, "submitting bulk batch");
        match batch.submit().await {
            Ok(ack) => {
                self.counters.record_submitted(items);
                debug!(items, took_ms = ?ack.took_ms, "bulk batch acknowledged");
                Ok(FlushOutcome::Submitted(ack))
            }
            Err(err) => {
                self.counters.record_failed(items);
                Err(err)
            }
        }
    }

    /// Returns `Some(appended)` when the sentinel cut the assembly short.
    async fn assemble(&self, batch: &mut E::Batch) -> Option<usize> {
        match self.queue.pop().await {
            QueueItem::Operation(operation) => batch.append(operation),
            QueueItem::Shutdown => return Some(batch.len()),
        }

        let observed = self.queue.len();
        for _ in 0..observed.min(self.queue_size - 1) {
            match self.queue.pop().await {
                QueueItem::Operation(operation) => batch.append(operation),
                QueueItem::Shutdown => return Some(batch.len()),
            }
        }
        None
    }
}
