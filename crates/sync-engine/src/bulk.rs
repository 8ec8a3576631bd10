//! Bulk request and response model.
//!
//! A bulk request is an ordered list of operations; the response carries one
//! status per operation, in request order.

use serde_json::{json, Value};

/// Kind of bulk operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BulkOpKind {
    Index,
    Delete,
}

impl BulkOpKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            BulkOpKind::Index => "index",
            BulkOpKind::Delete => "delete",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "index" => Some(BulkOpKind::Index),
            "delete" => Some(BulkOpKind::Delete),
            _ => None,
        }
    }
}

impl std::fmt::Display for BulkOpKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One operation inside a bulk request.
#[derive(Debug, Clone, PartialEq)]
pub enum BulkOperation {
    /// Full replace (create or overwrite). Keys missing from the body are
    /// dropped from the stored document.
    Index { index: String, id: String, body: Value },
    Delete { index: String, id: String },
}

impl BulkOperation {
    pub fn index(index: impl Into<String>, id: impl Into<String>, body: Value) -> Self {
        BulkOperation::Index {
            index: index.into(),
            id: id.into(),
            body,
        }
    }

    pub fn delete(index: impl Into<String>, id: impl Into<String>) -> Self {
        BulkOperation::Delete {
            index: index.into(),
            id: id.into(),
        }
    }

    pub fn kind(&self) -> BulkOpKind {
        match self {
            BulkOperation::Index { .. } => BulkOpKind::Index,
            BulkOperation::Delete { .. } => BulkOpKind::Delete,
        }
    }

    pub fn index_name(&self) -> &str {
        match self {
            BulkOperation::Index { index, .. } | BulkOperation::Delete { index, .. } => index,
        }
    }

    pub fn id(&self) -> &str {
        match self {
            BulkOperation::Index { id, .. } | BulkOperation::Delete { id, .. } => id,
        }
    }

    /// Append this operation in Elasticsearch NDJSON bulk format.
    pub fn write_ndjson(&self, out: &mut String) -> Result<(), serde_json::Error> {
        let action = json!({
            self.kind().as_str(): { "_index": self.index_name(), "_id": self.id() }
        });
        out.push_str(&serde_json::to_string(&action)?);
        out.push('\n');

        if let BulkOperation::Index { body, .. } = self {
            out.push_str(&serde_json::to_string(body)?);
            out.push('\n');
        }
        Ok(())
    }
}

/// Outcome of one bulk operation.
#[derive(Debug, Clone, PartialEq)]
pub struct BulkItemStatus {
    pub kind: BulkOpKind,
    pub index: String,
    pub id: String,
    /// HTTP-style status code
    pub status: u16,
    /// Engine-provided failure reason
    pub error: Option<String>,
}

impl BulkItemStatus {
    pub fn ok(op: &BulkOperation, status: u16) -> Self {
        Self {
            kind: op.kind(),
            index: op.index_name().to_string(),
            id: op.id().to_string(),
            status,
            error: None,
        }
    }

    pub fn failed(op: &BulkOperation, status: u16, error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::ok(op, status)
        }
    }

    /// Whether the operation took effect. Deleting an absent document
    /// counts as success.
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
            || (self.kind == BulkOpKind::Delete && self.status == 404)
    }

    /// Whether a failed item may succeed when resent unchanged: throttling
    /// or a server-side fault on the engine.
    pub fn is_transient(&self) -> bool {
        !self.is_success() && (self.status == 429 || self.status >= 500)
    }
}

/// Per-item results of a bulk request, in request order.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BulkResponse {
    pub took_ms: u64,
    pub items: Vec<BulkItemStatus>,
}

impl BulkResponse {
    pub fn has_failures(&self) -> bool {
        self.items.iter().any(|item| !item.is_success())
    }

    /// Request positions of failed operations.
    pub fn failed_positions(&self) -> Vec<usize> {
        self.items
            .iter()
            .enumerate()
            .filter(|(_, item)| !item.is_success())
            .map(|(i, _)| i)
            .collect()
    }

    pub fn succeeded(&self) -> usize {
        self.items.iter().filter(|item| item.is_success()).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_ndjson_format() {
        let mut out = String::new();
        BulkOperation::index("node", "n-1", json!({"uuid": "n-1"}))
            .write_ndjson(&mut out)
            .unwrap();
        BulkOperation::index("node", "n-2", json!({"uuid": "n-2"}))
            .write_ndjson(&mut out)
            .unwrap();
        BulkOperation::delete("user", "u-1")
            .write_ndjson(&mut out)
            .unwrap();

        let lines: Vec<Value> = out
            .lines()
            .map(|l| serde_json::from_str(l).unwrap())
            .collect();
        assert_eq!(lines.len(), 5);
        assert_eq!(lines[0], json!({"index": {"_index": "node", "_id": "n-1"}}));
        assert_eq!(lines[1], json!({"uuid": "n-1"}));
        assert_eq!(lines[2]["index"]["_id"], "n-2");
        assert_eq!(lines[3], json!({"uuid": "n-2"}));
        assert_eq!(lines[4], json!({"delete": {"_index": "user", "_id": "u-1"}}));
        assert!(out.ends_with('\n'));
    }

    #[test]
    fn test_delete_of_missing_document_succeeds() {
        let delete = BulkOperation::delete("user", "u-1");
        assert!(BulkItemStatus::ok(&delete, 404).is_success());

        let index = BulkOperation::index("user", "u-1", json!({}));
        assert!(!BulkItemStatus::ok(&index, 404).is_success());
    }

    #[test]
    fn test_transient_item_statuses() {
        let op = BulkOperation::index("node", "n-1", json!({}));
        assert!(BulkItemStatus::failed(&op, 429, "es_rejected_execution_exception").is_transient());
        assert!(BulkItemStatus::failed(&op, 503, "unavailable_shards_exception").is_transient());
        assert!(!BulkItemStatus::failed(&op, 400, "mapper_parsing_exception").is_transient());
        assert!(!BulkItemStatus::ok(&op, 201).is_transient());
    }

    #[test]
    fn test_failed_positions() {
        let op = BulkOperation::index("tag", "t-1", json!({}));
        let response = BulkResponse {
            took_ms: 3,
            items: vec![
                BulkItemStatus::ok(&op, 201),
                BulkItemStatus::failed(&op, 400, "mapper_parsing_exception"),
                BulkItemStatus::ok(&op, 200),
            ],
        };
        assert!(response.has_failures());
        assert_eq!(response.failed_positions(), vec![1]);
        assert_eq!(response.succeeded(), 2);
    }
}
