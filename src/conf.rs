use std::path::{Path, PathBuf};
use std::time::Duration;

use serde_with::{serde_as, DurationMilliSeconds};
use twelf::reexports::serde::{Deserialize, Serialize};
use twelf::{config, Layer};

use crate::error::{ConfigError, StreamError, StreamResult};

pub const DEFAULT_QUEUE_SIZE: usize = 10;
pub const DEFAULT_FLUSH_INTERVAL: Duration = Duration::from_secs(1);
pub const DEFAULT_FLUSHER_COUNT: usize = 1;

#[config]
#[derive(Debug, Default)]
pub struct Config {
    endpoint: Endpoint,
    stream: Option<StreamSettings>,
    target: Option<Target>,
    audit: Option<Audit>,
}

#[derive(Debug, Deserialize, Serialize, Clone, Default)]
pub struct Endpoint {
    url: String,
    #[serde(default)]
    basic_auth: Option<BasicAuth>,
    #[serde(default)]
    root_certificates: Vec<String>,
    #[serde(default)]
    timeout_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct BasicAuth {
    username: String,
    #[serde(default)]
    password: Option<String>,
}

/// Where the batch submission lock is released.
#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum LockScope {
    /// Only queue draining is serialized; submissions of assembled batches
    /// may overlap, up to one per flusher.
    #[default]
    Assembly,
    /// Draining and the submission round trip are serialized; at most one
    /// batch is in flight whatever the flusher count.
    AssemblyAndSubmission,
}

#[serde_as]
#[derive(Debug, Deserialize, Serialize, Clone, PartialEq)]
#[serde(default)]
pub struct StreamSettings {
    queue_size: usize,
    #[serde(rename = "flush_interval_ms")]
    #[serde_as(as = "DurationMilliSeconds<u64>")]
    flush_interval: Duration,
    flusher_count: usize,
    lock_scope: LockScope,
}

#[derive(Debug, Deserialize, Serialize, Clone, Copy, PartialEq, Eq)]
pub enum Refresh {
    #[serde(rename = "true")]
    True,
    #[serde(rename = "false")]
    False,
    #[serde(rename = "wait_for")]
    WaitFor,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Target {
    index: String,
    #[serde(default)]
    doc_type: Option<String>,
    #[serde(default)]
    refresh: Option<Refresh>,
}

#[derive(Debug, Deserialize, Serialize, Clone)]
pub struct Audit {
    file: String,
}

impl Config {
    /// Loads the config file, the format follows the file extension
    /// (`.toml`, `.json`, anything else is read as YAML).
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let path_buf = path.to_path_buf();
        let layer = match path.extension().and_then(|ext| ext.to_str()) {
            Some("toml") => Layer::Toml(path_buf),
            Some("json") => Layer::Json(path_buf),
            _ => Layer::Yaml(path_buf),
        };
        let config = Config::with_layers(&[layer]).map_err(|source| ConfigError::Load {
            path: path.to_path_buf(),
            source,
        })?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.endpoint.url.trim().is_empty() {
            return Err(ConfigError::Invalid("endpoint.url must be set".to_string()));
        }
        reqwest::Url::parse(&self.endpoint.url)
            .map_err(|e| ConfigError::Invalid(format!("endpoint.url: {}", e)))?;
        self.get_stream()
            .validate()
            .map_err(|e| ConfigError::Invalid(e.to_string()))?;
        if let Some(target) = &self.target {
            if target.index.trim().is_empty() {
                return Err(ConfigError::Invalid("target.index must not be empty".to_string()));
            }
        }
        Ok(())
    }

    pub fn get_endpoint(&self) -> &Endpoint {
        &self.endpoint
    }
    pub fn get_stream(&self) -> StreamSettings {
        self.stream.clone().unwrap_or_default()
    }
    pub fn get_target(&self) -> &Option<Target> {
        &self.target
    }
    pub fn get_audit_file(&self) -> Option<PathBuf> {
        self.audit.as_ref().map(|audit| PathBuf::from(&audit.file))
    }
}

impl BasicAuth {
    pub fn get_username(&self) -> &String {
        &self.username
    }
    pub fn get_password(&self) -> &Option<String> {
        &self.password
    }
}

impl Endpoint {
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            ..Self::default()
        }
    }

    pub fn with_basic_auth(mut self, username: impl Into<String>, password: Option<String>) -> Self {
        self.basic_auth = Some(BasicAuth {
            username: username.into(),
            password,
        });
        self
    }

    pub fn get_url(&self) -> &str {
        self.url.trim_end_matches('/')
    }
    pub fn get_root_certificates(&self) -> &Vec<String> {
        &self.root_certificates
    }
    pub fn get_timeout(&self) -> Option<Duration> {
        self.timeout_ms.map(Duration::from_millis)
    }
    pub fn has_basic_auth(&self) -> bool {
        self.basic_auth.is_some()
    }
    pub fn get_username(&self) -> String {
        if let Some(basic_auth) = &self.basic_auth {
            basic_auth.get_username().clone()
        } else {
            String::default()
        }
    }
    pub fn get_password(&self) -> Option<String> {
        if let Some(basic_auth) = &self.basic_auth {
            return basic_auth.get_password().clone();
        }
        None
    }
}

impl Default for StreamSettings {
    fn default() -> Self {
        Self {
            queue_size: DEFAULT_QUEUE_SIZE,
            flush_interval: DEFAULT_FLUSH_INTERVAL,
            flusher_count: DEFAULT_FLUSHER_COUNT,
            lock_scope: LockScope::default(),
        }
    }
}

impl StreamSettings {
    pub fn new(queue_size: usize, flush_interval: Duration, flusher_count: usize) -> Self {
        Self {
            queue_size,
            flush_interval,
            flusher_count,
            lock_scope: LockScope::default(),
        }
    }

    pub fn with_lock_scope(mut self, lock_scope: LockScope) -> Self {
        self.lock_scope = lock_scope;
        self
    }

    pub fn validate(&self) -> StreamResult<()> {
        if self.queue_size == 0 {
            return Err(StreamError::InvalidConfig(
                "queue_size must be positive".to_string(),
            ));
        }
        if self.flusher_count == 0 {
            return Err(StreamError::InvalidConfig(
                "flusher_count must be positive".to_string(),
            ));
        }
        if self.flush_interval.is_zero() {
            return Err(StreamError::InvalidConfig(
                "flush_interval must be positive".to_string(),
            ));
        }
        if self.queue_capacity().is_none() {
            return Err(StreamError::InvalidConfig(format!(
                "queue_size {} with {} flushers overflows the queue capacity",
                self.queue_size, self.flusher_count
            )));
        }
        Ok(())
    }

    /// Back-buffer able to absorb a burst for every flusher.
    pub fn queue_capacity(&self) -> Option<usize> {
        self.queue_size
            .checked_mul(self.flusher_count)
            .and_then(|n| n.checked_mul(2))
    }

    pub fn get_queue_size(&self) -> usize {
        self.queue_size
    }
    pub fn get_flush_interval(&self) -> Duration {
        self.flush_interval
    }
    pub fn get_flusher_count(&self) -> usize {
        self.flusher_count
    }
    pub fn get_lock_scope(&self) -> LockScope {
        self.lock_scope
    }
}

impl Refresh {
    pub fn as_str(&self) -> &'static str {
        match self {
            Refresh::True => "true",
            Refresh::False => "false",
            Refresh::WaitFor => "wait_for",
        }
    }
}

impl Target {
    pub fn new(index: impl Into<String>) -> Self {
        Self {
            index: index.into(),
            doc_type: None,
            refresh: None,
        }
    }

    pub fn get_index(&self) -> &String {
        &self.index
    }
    pub fn get_doc_type(&self) -> &Option<String> {
        &self.doc_type
    }
    pub fn get_refresh(&self) -> Option<Refresh> {
        self.refresh
    }
}
