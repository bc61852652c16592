use thiserror::Error;

/// A batch that the backing store rejected or could not complete.
///
/// Operations popped for a failed batch are not re-queued.
#[derive(Debug, Error)]
pub enum SubmissionError {
    #[error("bulk request could not be sent: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("bulk request failed with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("bulk response could not be decoded: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("{failed} of {total} bulk items were rejected, first reason: {reason}")]
    Rejected {
        failed: usize,
        total: usize,
        reason: String,
    },
    #[error("{0}")]
    Other(String),
}

#[derive(Debug, Error)]
pub enum StreamError {
    #[error("bulk stream is closed")]
    Closed,
    #[error("invalid stream settings: {0}")]
    InvalidConfig(String),
    #[error("bulk stream must be created inside a tokio runtime")]
    NoRuntime,
}

#[derive(Debug, Error)]
pub enum ClientError {
    #[error("request to cluster failed: {0}")]
    Http(#[from] reqwest::Error),
    #[error("cluster answered with status {status}: {body}")]
    Status { status: u16, body: String },
    #[error("incorrect response from cluster: {0}")]
    Decode(#[from] serde_json::Error),
    #[error("cluster reported an unparsable version {version:?}: {source}")]
    Version {
        version: String,
        source: semver::Error,
    },
    #[error("failed to read root certificate {path:?}: {reason}")]
    Certificate { path: String, reason: String },
}

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to load config file {path:?}: {source}")]
    Load {
        path: std::path::PathBuf,
        source: twelf::Error,
    },
    #[error("invalid config: {0}")]
    Invalid(String),
}

pub type StreamResult<T> = Result<T, StreamError>;
