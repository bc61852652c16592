use std::path::Path;

use chrono::Utc;
use serde_json::{json, Value};
use tokio::{
    fs::{self, File, OpenOptions},
    io::AsyncWriteExt,
};

pub enum What {
    BulkRequest,
    BulkResponseOk,
    BulkResponseErr,
}

impl What {
    pub fn as_str(&self) -> &'static str {
        match self {
            What::BulkRequest => "BulkRequest",
            What::BulkResponseOk => "BulkResponseOk",
            What::BulkResponseErr => "BulkResponseErr",
        }
    }
}

/// Append-only NDJSON record of bulk requests and their outcome.
pub struct AuditTrail {
    file_handler: File,
}

impl AuditTrail {
    /// Opens (or creates) the audit file and its parent directories.
    pub async fn open(file_name: &Path) -> std::io::Result<Self> {
        if let Some(parent) = file_name.parent() {
            if !parent.as_os_str().is_empty() {
                fs::create_dir_all(parent).await?;
            }
        }

        let file_handler = OpenOptions::new()
            .create(true)
            .append(true)
            .open(file_name)
            .await?;

        Ok(Self { file_handler })
    }

    pub async fn record(&mut self, what: What, items: usize, detail: Value) -> std::io::Result<()> {
        let line = json!({
            "at": Utc::now().to_rfc3339(),
            "what": what.as_str(),
            "items": items,
            "detail": detail,
        });
        self.append_to_file(&format!("{}\n", line)).await
    }

    async fn append_to_file(&mut self, data: &str) -> std::io::Result<()> {
        self.file_handler.write_all(data.as_bytes()).await?;
        self.file_handler.flush().await
    }
}
