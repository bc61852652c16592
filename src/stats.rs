use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;
use tokio::sync::Notify;

/// Monotonic counters shared by the stream, its flush coordinator and workers.
#[derive(Debug, Default)]
pub struct StreamCounters {
    operations_enqueued: AtomicU64,
    flushes_submitted: AtomicU64,
    operations_submitted: AtomicU64,
    failed_batches: AtomicU64,
    operations_lost: AtomicU64,
    aborted_flushes: AtomicU64,
    operations_discarded: AtomicU64,
    settled: Notify,
}

/// Point-in-time copy of [`StreamCounters`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StreamStats {
    pub operations_enqueued: u64,
    pub flushes_submitted: u64,
    pub operations_submitted: u64,
    pub failed_batches: u64,
    pub operations_lost: u64,
    pub aborted_flushes: u64,
    pub operations_discarded: u64,
}

impl StreamCounters {
    pub fn record_enqueued(&self) {
        self.operations_enqueued.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_submitted(&self, items: usize) {
        self.flushes_submitted.fetch_add(1, Ordering::Relaxed);
        self.operations_submitted
            .fetch_add(items as u64, Ordering::Relaxed);
        self.settled.notify_waiters();
    }

    pub fn record_failed(&self, items: usize) {
        self.failed_batches.fetch_add(1, Ordering::Relaxed);
        self.operations_lost.fetch_add(items as u64, Ordering::Relaxed);
        self.settled.notify_waiters();
    }

    pub fn record_aborted(&self, discarded: usize) {
        self.aborted_flushes.fetch_add(1, Ordering::Relaxed);
        self.operations_discarded
            .fetch_add(discarded as u64, Ordering::Relaxed);
        self.settled.notify_waiters();
    }

    /// Waits until every enqueued operation left the queue through a flush.
    pub async fn wait_settled(&self) {
        loop {
            let notified = self.settled.notified();
            let stats = self.snapshot();
            if stats.operations_settled() >= stats.operations_enqueued {
                return;
            }
            notified.await;
        }
    }

    pub fn snapshot(&self) -> StreamStats {
        StreamStats {
            operations_enqueued: self.operations_enqueued.load(Ordering::Relaxed),
            flushes_submitted: self.flushes_submitted.load(Ordering::Relaxed),
            operations_submitted: self.operations_submitted.load(Ordering::Relaxed),
            failed_batches: self.failed_batches.load(Ordering::Relaxed),
            operations_lost: self.operations_lost.load(Ordering::Relaxed),
            aborted_flushes: self.aborted_flushes.load(Ordering::Relaxed),
            operations_discarded: self.operations_discarded.load(Ordering::Relaxed),
        }
    }
}

impl StreamStats {
    /// Operations that left the queue through a flush, whatever its outcome.
    pub fn operations_settled(&self) -> u64 {
        self.operations_submitted + self.operations_lost + self.operations_discarded
    }
}
