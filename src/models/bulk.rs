use std::collections::HashMap;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::error::SubmissionError;
use crate::models::operation::Operation;

/// Acknowledgement of one submitted batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct BulkAck {
    pub items: usize,
    pub took_ms: Option<u64>,
}

/// Appends the two NDJSON lines of `operation` to `body`.
///
/// `_type` is only written when `include_doc_type` is set, clusters from 7 on
/// reject or deprecate it.
pub fn write_bulk_lines(body: &mut String, operation: &Operation, include_doc_type: bool) {
    let mut meta = Map::new();
    meta.insert("_index".to_string(), json!(operation.get_index()));
    if include_doc_type {
        if let Some(doc_type) = operation.get_doc_type() {
            meta.insert("_type".to_string(), json!(doc_type));
        }
    }
    if let Some(id) = operation.get_id() {
        meta.insert("_id".to_string(), json!(id));
    }

    let mut action = Map::new();
    action.insert(operation.kind().to_string(), Value::Object(meta));
    body.push_str(&Value::Object(action).to_string());
    body.push('\n');

    let source = match operation {
        Operation::Index { document, .. } => document.to_string(),
        Operation::PartialUpdate { patch, .. } => json!({ "doc": patch }).to_string(),
    };
    body.push_str(&source);
    body.push('\n');
}

#[derive(Debug, Deserialize)]
pub struct BulkResponse {
    #[serde(default)]
    took: Option<u64>,
    #[serde(default)]
    errors: bool,
    #[serde(default)]
    items: Vec<HashMap<String, BulkItem>>,
}

#[derive(Debug, Deserialize)]
pub struct BulkItem {
    #[serde(rename = "_id", default)]
    id: Option<String>,
    #[serde(default)]
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

impl BulkItem {
    pub fn get_id(&self) -> Option<&str> {
        self.id.as_deref()
    }

    pub fn is_failed(&self) -> bool {
        self.error.is_some() || self.status >= 300
    }

    fn reason(&self) -> String {
        match &self.error {
            Some(Value::Object(error)) => {
                let kind = error.get("type").and_then(Value::as_str).unwrap_or("error");
                let reason = error.get("reason").and_then(Value::as_str).unwrap_or("");
                format!("{}: {}", kind, reason)
            }
            Some(other) => other.to_string(),
            None => format!("status {}", self.status),
        }
    }
}

impl BulkResponse {
    pub fn get_took(&self) -> Option<u64> {
        self.took
    }

    pub fn has_errors(&self) -> bool {
        self.errors
    }

    pub fn get_items(&self) -> impl Iterator<Item = &BulkItem> {
        self.items.iter().flat_map(|item| item.values())
    }

    /// Turns the response into an ack, or into `Rejected` when any item failed.
    ///
    /// `sent` is the number of operations in the request; it is used when the
    /// cluster omits the item list.
    pub fn into_ack(self, sent: usize) -> Result<BulkAck, SubmissionError> {
        let total = if self.items.is_empty() {
            sent
        } else {
            self.items.len()
        };
        if self.errors {
            let failed: Vec<&BulkItem> = self.get_items().filter(|item| item.is_failed()).collect();
            let reason = failed
                .first()
                .map(|item| item.reason())
                .unwrap_or_else(|| "unknown".to_string());
            return Err(SubmissionError::Rejected {
                failed: failed.len().max(1),
                total,
                reason,
            });
        }
        Ok(BulkAck {
            items: total,
            took_ms: self.took,
        })
    }
}
