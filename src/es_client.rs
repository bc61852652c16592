use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use human_bytes::human_bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::{Certificate, Client, RequestBuilder};
use serde_json::json;
use tokio::sync::Mutex;
use tokio_retry::strategy::{jitter, ExponentialBackoff};
use tokio_retry::Retry;
use tracing::{debug, info, warn};

use crate::audit_builder::{AuditTrail, What};
use crate::conf::{Endpoint, Refresh};
use crate::error::{ClientError, SubmissionError};
use crate::executor::{BulkBatch, BulkExecutor};
use crate::models::bulk::{write_bulk_lines, BulkAck, BulkResponse};
use crate::models::operation::Operation;
use crate::models::server_info::ServerInfo;

const NDJSON: &str = "application/x-ndjson";

#[derive(Debug, Clone)]
pub struct EsClient {
    endpoint: Endpoint,
    http_client: Client,
}

fn inject_auth(request_builder: RequestBuilder, endpoint: &Endpoint) -> RequestBuilder {
    if endpoint.has_basic_auth() {
        request_builder.basic_auth(endpoint.get_username(), endpoint.get_password())
    } else {
        request_builder
    }
}

/// HTTP client trusting the endpoint's extra root certificates.
pub fn build_http_client(endpoint: &Endpoint, insecure: bool) -> Result<Client, ClientError> {
    let mut builder = Client::builder();
    if insecure {
        builder = builder.danger_accept_invalid_certs(true);
    }
    if let Some(timeout) = endpoint.get_timeout() {
        builder = builder.timeout(timeout);
    }
    for path in endpoint.get_root_certificates() {
        for cert in load_certificates(Path::new(path))? {
            builder = builder.add_root_certificate(cert);
        }
    }
    Ok(builder.build()?)
}

/// Reads one PEM file, or every PEM file of a directory.
fn load_certificates(path: &Path) -> Result<Vec<Certificate>, ClientError> {
    let cert_error = |path: &Path, reason: String| ClientError::Certificate {
        path: path.display().to_string(),
        reason,
    };

    let files = if path.is_dir() {
        let mut files = Vec::new();
        let entries = std::fs::read_dir(path).map_err(|e| cert_error(path, e.to_string()))?;
        for entry in entries {
            let entry = entry.map_err(|e| cert_error(path, e.to_string()))?;
            if entry.path().is_file() {
                files.push(entry.path());
            }
        }
        files.sort();
        files
    } else {
        vec![path.to_path_buf()]
    };

    let mut certs = Vec::with_capacity(files.len());
    for file in files {
        let content = std::fs::read(&file).map_err(|e| cert_error(&file, e.to_string()))?;
        let cert = Certificate::from_pem(&content).map_err(|e| cert_error(&file, e.to_string()))?;
        certs.push(cert);
    }
    Ok(certs)
}

impl EsClient {
    pub fn new(endpoint: Endpoint, http_client: Client) -> Self {
        Self {
            endpoint,
            http_client,
        }
    }

    pub fn get_endpoint(&self) -> &Endpoint {
        &self.endpoint
    }

    async fn call_get(&self, path: &str) -> Result<String, ClientError> {
        let request_builder = self
            .http_client
            .get(format!("{}{}", self.endpoint.get_url(), path));
        let response = inject_auth(request_builder, &self.endpoint).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(ClientError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(text)
    }

    pub async fn server_info(&self) -> Result<ServerInfo, ClientError> {
        let value = self.call_get("/").await?;
        Ok(serde_json::from_str(&value)?)
    }

    /// Retries `server_info` with exponential backoff, `retries` times at most.
    pub async fn wait_until_ready(&self, retries: usize) -> Result<ServerInfo, ClientError> {
        let strategy = ExponentialBackoff::from_millis(10)
            .max_delay(Duration::from_secs(5))
            .map(jitter)
            .take(retries);
        Retry::spawn(strategy, || async {
            self.server_info().await.inspect_err(|err| {
                warn!(url = self.endpoint.get_url(), error = %err, "cluster not ready");
            })
        })
        .await
    }

    pub async fn print_server_info(&self, prefix: &str) {
        match self.server_info().await {
            Ok(server_info) => info!(
                "{}: hostname={}, name={}, uuid={:?}, version={}, lucene={}",
                prefix,
                server_info.get_hostname(),
                server_info.get_name(),
                server_info.get_uuid(),
                server_info.get_version(),
                server_info.get_lucene_version()
            ),
            Err(err) => warn!("{}: server info unavailable: {}", prefix, err),
        }
    }

    /// `POST /_bulk` with an NDJSON body.
    pub async fn post_bulk(
        &self,
        body: String,
        refresh: Option<Refresh>,
    ) -> Result<BulkResponse, SubmissionError> {
        let mut url = format!("{}/_bulk", self.endpoint.get_url());
        if let Some(refresh) = refresh {
            url.push_str("?refresh=");
            url.push_str(refresh.as_str());
        }
        let request_builder = self
            .http_client
            .post(url)
            .header(CONTENT_TYPE, NDJSON)
            .body(body);
        let response = inject_auth(request_builder, &self.endpoint).send().await?;
        let status = response.status();
        let text = response.text().await?;
        if !status.is_success() {
            return Err(SubmissionError::Status {
                status: status.as_u16(),
                body: text,
            });
        }
        Ok(serde_json::from_str(&text)?)
    }
}

/// Sends batches to the Elasticsearch `_bulk` endpoint.
#[derive(Clone)]
pub struct EsBulkExecutor {
    client: Arc<EsClient>,
    include_doc_type: bool,
    refresh: Option<Refresh>,
    audit: Option<Arc<Mutex<AuditTrail>>>,
}

impl EsBulkExecutor {
    pub fn new(client: EsClient) -> Self {
        Self {
            client: Arc::new(client),
            include_doc_type: false,
            refresh: None,
            audit: None,
        }
    }

    /// Writes `_type` only when the cluster is older than 7.
    pub fn for_server(client: EsClient, server_info: &ServerInfo) -> Result<Self, ClientError> {
        let include_doc_type = server_info.uses_doc_types()?;
        Ok(Self::new(client).with_doc_type(include_doc_type))
    }

    pub fn with_doc_type(mut self, include_doc_type: bool) -> Self {
        self.include_doc_type = include_doc_type;
        self
    }

    pub fn with_refresh(mut self, refresh: Option<Refresh>) -> Self {
        self.refresh = refresh;
        self
    }

    pub fn with_audit(mut self, audit: AuditTrail) -> Self {
        self.audit = Some(Arc::new(Mutex::new(audit)));
        self
    }

    pub fn get_client(&self) -> &EsClient {
        &self.client
    }
}

pub struct EsBulkBatch {
    client: Arc<EsClient>,
    include_doc_type: bool,
    refresh: Option<Refresh>,
    audit: Option<Arc<Mutex<AuditTrail>>>,
    body: String,
    items: usize,
}

impl BulkExecutor for EsBulkExecutor {
    type Batch = EsBulkBatch;

    fn open_batch(&self) -> EsBulkBatch {
        EsBulkBatch {
            client: Arc::clone(&self.client),
            include_doc_type: self.include_doc_type,
            refresh: self.refresh,
            audit: self.audit.clone(),
            body: String::new(),
            items: 0,
        }
    }
}

async fn write_audit(
    audit: &Option<Arc<Mutex<AuditTrail>>>,
    what: What,
    items: usize,
    detail: serde_json::Value,
) {
    if let Some(audit) = audit {
        if let Err(err) = audit.lock().await.record(what, items, detail).await {
            warn!(error = %err, "failed to write audit record");
        }
    }
}

#[async_trait]
impl BulkBatch for EsBulkBatch {
    fn append(&mut self, operation: Operation) {
        write_bulk_lines(&mut self.body, &operation, self.include_doc_type);
        self.items += 1;
    }

    fn len(&self) -> usize {
        self.items
    }

    async fn submit(self) -> Result<BulkAck, SubmissionError> {
        let EsBulkBatch {
            client,
            refresh,
            audit,
            body,
            items,
            ..
        } = self;
        if items == 0 {
            return Ok(BulkAck::default());
        }

        let size = body.len();
        debug!(items, size = %human_bytes(size as f64), "sending bulk request");
        write_audit(&audit, What::BulkRequest, items, json!({ "bytes": size })).await;

        let result = client
            .post_bulk(body, refresh)
            .await
            .and_then(|response| response.into_ack(items));

        match &result {
            Ok(ack) => {
                write_audit(&audit, What::BulkResponseOk, ack.items, json!({ "took": ack.took_ms }))
                    .await
            }
            Err(err) => {
                write_audit(
                    &audit,
                    What::BulkResponseErr,
                    items,
                    json!({ "error": err.to_string() }),
                )
                .await
            }
        }
        result
    }
}
