//! Elasticsearch client over the REST API.

use std::collections::HashMap;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::{Client, Response, StatusCode};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::{debug, info, warn};

use crate::bulk::{BulkItemStatus, BulkOpKind, BulkOperation, BulkResponse};
use crate::engine::SearchEngine;
use crate::error::EngineError;

/// Elasticsearch connection settings.
#[derive(Debug, Clone)]
pub struct ElasticsearchConfig {
    /// Cluster base URL (e.g., "http://localhost:9200")
    pub base_url: String,
    /// Per-request timeout
    pub timeout: Duration,
}

impl ElasticsearchConfig {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into().trim_end_matches('/').to_string(),
            timeout: Duration::from_secs(30),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }
}

#[derive(Debug, Deserialize)]
struct RawBulkResponse {
    #[serde(default)]
    took: u64,
    items: Vec<HashMap<String, RawBulkItem>>,
}

#[derive(Debug, Deserialize)]
struct RawBulkItem {
    #[serde(rename = "_index")]
    index: String,
    #[serde(rename = "_id", default)]
    id: Option<String>,
    status: u16,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Debug, Deserialize)]
struct CatIndex {
    index: String,
}

/// Search engine client for a remote Elasticsearch cluster.
pub struct ElasticsearchClient {
    client: Client,
    config: ElasticsearchConfig,
}

impl ElasticsearchClient {
    pub fn new(config: ElasticsearchConfig) -> Result<Self, EngineError> {
        let client = Client::builder()
            .timeout(config.timeout)
            .build()
            .map_err(|e| EngineError::Config(e.to_string()))?;
        Ok(Self { client, config })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.config.base_url, path)
    }

    /// Turn a non-success response into an error, keeping its body.
    async fn check(response: Response) -> Result<Response, EngineError> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status().as_u16();
        let body = response.text().await.unwrap_or_default();
        Err(EngineError::Http { status, body })
    }

    async fn delete_index(&self, index: &str) -> Result<(), EngineError> {
        let response = self.client.delete(self.url(index)).send().await?;
        if response.status() == StatusCode::NOT_FOUND {
            debug!(index, "Index already absent");
            return Ok(());
        }
        Self::check(response).await?;
        info!(index, "Deleted index");
        Ok(())
    }

    /// Names of all non-system indices in the cluster.
    async fn list_indices(&self) -> Result<Vec<String>, EngineError> {
        let response = self
            .client
            .get(self.url("_cat/indices"))
            .query(&[("format", "json"), ("h", "index")])
            .send()
            .await?;
        let indices: Vec<CatIndex> = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| EngineError::Protocol(e.to_string()))?;
        Ok(indices
            .into_iter()
            .map(|i| i.index)
            .filter(|name| !name.starts_with('.'))
            .collect())
    }
}

fn item_status(op: &BulkOperation, raw: &RawBulkItem) -> BulkItemStatus {
    BulkItemStatus {
        kind: op.kind(),
        index: raw.index.clone(),
        id: raw.id.clone().unwrap_or_else(|| op.id().to_string()),
        status: raw.status,
        error: raw.error.as_ref().map(|e| match e.get("reason") {
            Some(Value::String(reason)) => reason.clone(),
            _ => e.to_string(),
        }),
    }
}

#[async_trait]
impl SearchEngine for ElasticsearchClient {
    fn name(&self) -> &'static str {
        "elasticsearch"
    }

    async fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkResponse, EngineError> {
        if operations.is_empty() {
            return Ok(BulkResponse::default());
        }

        let mut body = String::new();
        for op in operations {
            op.write_ndjson(&mut body)?;
        }

        let response = self
            .client
            .post(self.url("_bulk"))
            .header("Content-Type", "application/x-ndjson")
            .body(body)
            .send()
            .await?;
        let raw: RawBulkResponse = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| EngineError::Protocol(e.to_string()))?;

        if raw.items.len() != operations.len() {
            return Err(EngineError::Protocol(format!(
                "bulk response has {} items for {} operations",
                raw.items.len(),
                operations.len()
            )));
        }

        let mut items = Vec::with_capacity(operations.len());
        for (op, entry) in operations.iter().zip(&raw.items) {
            let (kind, raw_item) = entry
                .iter()
                .next()
                .ok_or_else(|| EngineError::Protocol("empty bulk item".to_string()))?;
            if BulkOpKind::parse(kind) != Some(op.kind()) {
                return Err(EngineError::Protocol(format!(
                    "bulk item {} answers '{}' for a '{}' operation",
                    items.len(),
                    kind,
                    op.kind()
                )));
            }
            items.push(item_status(op, raw_item));
        }

        let response = BulkResponse {
            took_ms: raw.took,
            items,
        };
        if response.has_failures() {
            warn!(
                failed = response.failed_positions().len(),
                total = operations.len(),
                "Bulk request had failed items"
            );
        }
        Ok(response)
    }

    async fn put_mapping(&self, index: &str, mapping: &Value) -> Result<(), EngineError> {
        let response = self
            .client
            .put(self.url(index))
            .json(&json!({ "mappings": mapping }))
            .send()
            .await?;

        if response.status() == StatusCode::BAD_REQUEST {
            let body = response.text().await.unwrap_or_default();
            if !body.contains("resource_already_exists_exception") {
                return Err(EngineError::Http { status: 400, body });
            }
            let response = self
                .client
                .put(self.url(&format!("{}/_mapping", index)))
                .json(mapping)
                .send()
                .await?;
            Self::check(response).await?;
            debug!(index, "Updated mapping of existing index");
            return Ok(());
        }

        Self::check(response).await?;
        info!(index, "Created index with mapping");
        Ok(())
    }

    async fn refresh(&self) -> Result<(), EngineError> {
        let response = self.client.post(self.url("_refresh")).send().await?;
        Self::check(response).await?;
        debug!("Refreshed indices");
        Ok(())
    }

    async fn clear(&self, index: Option<&str>) -> Result<(), EngineError> {
        match index {
            Some(name) => self.delete_index(name).await,
            None => {
                let indices = self.list_indices().await?;
                for name in &indices {
                    self.delete_index(name).await?;
                }
                info!(count = indices.len(), "Cleared all indices");
                Ok(())
            }
        }
    }

    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>, EngineError> {
        let response = self
            .client
            .get(self.url(&format!("{}/_doc/{}", index, id)))
            .send()
            .await?;
        if response.status() == StatusCode::NOT_FOUND {
            return Ok(None);
        }
        let body: Value = Self::check(response)
            .await?
            .json()
            .await
            .map_err(|e| EngineError::Protocol(e.to_string()))?;
        Ok(body.get("_source").cloned())
    }
}
