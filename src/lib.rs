//! Streams individual Elasticsearch writes into bulk requests.
//!
//! Producers hand [`Operation`]s to a [`BulkStream`]; a fixed number of flush
//! workers drain the bounded queue into batches of at most `queue_size`
//! operations and submit them through a [`BulkExecutor`]. The queue is the
//! only flow control: producers wait while it is full.

pub mod audit_builder;
pub mod conf;
pub mod error;
pub mod es_client;
pub mod executor;
pub mod flush;
pub mod models;
pub mod queue;
pub mod stats;
pub mod stream;
pub mod utils;
pub mod worker;

pub use conf::{Config, LockScope, StreamSettings};
pub use error::{ClientError, ConfigError, StreamError, SubmissionError};
pub use es_client::{EsBulkExecutor, EsClient};
pub use executor::{BulkBatch, BulkExecutor, DryRunExecutor};
pub use flush::FlushOutcome;
pub use models::bulk::BulkAck;
pub use models::operation::{Operation, QueueItem};
pub use stats::StreamStats;
pub use stream::{BulkStream, ShutdownReport};
