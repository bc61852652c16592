//! The bulk-write capability the stream submits batches to.

use async_trait::async_trait;
use tracing::{debug, info};

use crate::error::SubmissionError;
use crate::models::bulk::BulkAck;
use crate::models::operation::Operation;

/// Opens one batch context per flush.
pub trait BulkExecutor: Send + Sync + 'static {
    type Batch: BulkBatch;

    fn open_batch(&self) -> Self::Batch;
}

/// A batch being assembled; lives for exactly one flush.
#[async_trait]
pub trait BulkBatch: Send + Sized + 'static {
    fn append(&mut self, operation: Operation);

    fn len(&self) -> usize;

    fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Sends the batch and waits until the store acknowledges or fails it.
    async fn submit(self) -> Result<BulkAck, SubmissionError>;
}

/// Acknowledges every batch without sending anything.
#[derive(Debug, Default, Clone)]
pub struct DryRunExecutor;

#[derive(Debug, Default)]
pub struct DryRunBatch {
    operations: Vec<Operation>,
}

impl BulkExecutor for DryRunExecutor {
    type Batch = DryRunBatch;

    fn open_batch(&self) -> DryRunBatch {
        DryRunBatch::default()
    }
}

#[async_trait]
impl BulkBatch for DryRunBatch {
    fn append(&mut self, operation: Operation) {
        self.operations.push(operation);
    }

    fn len(&self) -> usize {
        self.operations.len()
    }

    async fn submit(self) -> Result<BulkAck, SubmissionError> {
        info!(items = self.operations.len(), "dry run, bulk request not sent");
        for operation in &self.operations {
            debug!(
                action = operation.kind(),
                index = operation.get_index(),
                id = ?operation.get_id(),
                "dry run item"
            );
        }
        Ok(BulkAck {
            items: self.operations.len(),
            took_ms: None,
        })
    }
}
