use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info};

use crate::executor::BulkExecutor;
use crate::flush::{FlushCoordinator, FlushOutcome};
use crate::queue::BoundedQueue;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WorkerState {
    Running,
    /// Stop was requested but the queue still holds operations.
    Stopping,
    Stopped,
}

/// What a worker did over its lifetime, returned when it exits.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WorkerReport {
    pub worker: usize,
    pub flush_attempts: u64,
    pub failed_flushes: u64,
    pub aborted_flushes: u64,
}

/// Long-lived loop deciding when the coordinator should flush.
pub struct FlushWorker<E: BulkExecutor> {
    id: usize,
    coordinator: Arc<FlushCoordinator<E>>,
    queue: Arc<BoundedQueue>,
    queue_size: usize,
    flush_interval: Duration,
    stop: watch::Receiver<bool>,
    state: WorkerState,
}

impl<E: BulkExecutor> FlushWorker<E> {
    pub fn new(
        id: usize,
        coordinator: Arc<FlushCoordinator<E>>,
        queue: Arc<BoundedQueue>,
        queue_size: usize,
        flush_interval: Duration,
        stop: watch::Receiver<bool>,
    ) -> Self {
        Self {
            id,
            coordinator,
            queue,
            queue_size,
            flush_interval,
            stop,
            state: WorkerState::Running,
        }
    }

    pub fn spawn(self) -> JoinHandle<WorkerReport> {
        tokio::spawn(self.run())
    }

    pub async fn run(mut self) -> WorkerReport {
        let mut report = WorkerReport {
            worker: self.id,
            ..WorkerReport::default()
        };
        debug!(worker = self.id, "flush worker started");

        while self.state != WorkerState::Stopped {
            // Full queue flushes right away, otherwise wait for the interval.
            if self.queue.len() < self.queue_size {
                self.wait_interval().await;
            }

            report.flush_attempts += 1;
            match self.coordinator.flush().await {
                Ok(FlushOutcome::Submitted(_)) => {}
                Ok(FlushOutcome::ShutdownAbort { .. }) => report.aborted_flushes += 1,
                Err(err) => {
                    report.failed_flushes += 1;
                    error!(worker = self.id, error = %err, "bulk flush failed, batch dropped");
                }
            }

            self.state = self.next_state();
        }

        info!(
            worker = self.id,
            flushes = report.flush_attempts,
            failed = report.failed_flushes,
            "flush worker stopped"
        );
        report
    }

    pub fn get_state(&self) -> WorkerState {
        self.state
    }

    /// Best effort: the emptiness check races with producers and other workers.
    fn next_state(&self) -> WorkerState {
        let stopping = *self.stop.borrow() || self.queue.is_closed();
        if !stopping {
            WorkerState::Running
        } else if self.queue.is_empty() {
            WorkerState::Stopped
        } else {
            WorkerState::Stopping
        }
    }

    async fn wait_interval(&mut self) {
        if self.state == WorkerState::Stopping {
            return;
        }
        let interval = self.flush_interval;
        tokio::select! {
            _ = tokio::time::sleep(interval) => {}
            _ = self.stop.wait_for(|stopping| *stopping) => {}
        }
    }
}
