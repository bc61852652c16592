use serde_json::Value;

pub const BULK_OPER_INDEX: &str = "index";
pub const BULK_OPER_UPDATE: &str = "update";

/// One pending write waiting to be batched.
#[derive(Debug, Clone, PartialEq)]
pub enum Operation {
    /// Index (create or replace) a whole document.
    Index {
        index: String,
        doc_type: Option<String>,
        id: Option<String>,
        document: Value,
    },
    /// Merge `patch` into an existing document.
    PartialUpdate {
        index: String,
        doc_type: Option<String>,
        id: String,
        patch: Value,
    },
}

impl Operation {
    pub fn index(index: impl Into<String>, id: Option<String>, document: Value) -> Self {
        Operation::Index {
            index: index.into(),
            doc_type: None,
            id,
            document,
        }
    }

    pub fn partial_update(index: impl Into<String>, id: impl Into<String>, patch: Value) -> Self {
        Operation::PartialUpdate {
            index: index.into(),
            doc_type: None,
            id: id.into(),
            patch,
        }
    }

    pub fn with_doc_type(self, value: Option<String>) -> Self {
        match self {
            Operation::Index {
                index,
                id,
                document,
                ..
            } => Operation::Index {
                index,
                doc_type: value,
                id,
                document,
            },
            Operation::PartialUpdate {
                index, id, patch, ..
            } => Operation::PartialUpdate {
                index,
                doc_type: value,
                id,
                patch,
            },
        }
    }

    /// Bulk action name of this operation.
    pub fn kind(&self) -> &'static str {
        match self {
            Operation::Index { .. } => BULK_OPER_INDEX,
            Operation::PartialUpdate { .. } => BULK_OPER_UPDATE,
        }
    }

    pub fn get_index(&self) -> &str {
        match self {
            Operation::Index { index, .. } | Operation::PartialUpdate { index, .. } => index,
        }
    }

    pub fn get_doc_type(&self) -> Option<&str> {
        match self {
            Operation::Index { doc_type, .. } | Operation::PartialUpdate { doc_type, .. } => {
                doc_type.as_deref()
            }
        }
    }

    pub fn get_id(&self) -> Option<&str> {
        match self {
            Operation::Index { id, .. } => id.as_deref(),
            Operation::PartialUpdate { id, .. } => Some(id),
        }
    }
}

/// What travels through the operation queue.
#[derive(Debug, Clone, PartialEq)]
pub enum QueueItem {
    Operation(Operation),
    /// Sentinel: no more real operations will arrive.
    Shutdown,
}

impl From<Operation> for QueueItem {
    fn from(operation: Operation) -> Self {
        QueueItem::Operation(operation)
    }
}
