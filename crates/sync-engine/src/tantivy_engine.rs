//! Embedded search engine backed by a Tantivy index.
//!
//! Every document lives in one physical index. The logical index name and
//! document id are combined into a `key` term so upserts and deletes are a
//! single term operation. The JSON body is stored verbatim and its string
//! leaves are flattened into one full-text field.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Mutex, MutexGuard};
use std::time::Instant;

use async_trait::async_trait;
use dashmap::DashMap;
use serde_json::Value;
use tantivy::collector::{Count, TopDocs};
use tantivy::query::{AllQuery, TermQuery};
use tantivy::schema::{Field, IndexRecordOption, Schema, Value as _, STORED, STRING, TEXT};
use tantivy::{doc, Index, IndexReader, IndexWriter, ReloadPolicy, TantivyDocument, Term};
use tracing::{debug, info, warn};

use crate::bulk::{BulkItemStatus, BulkOperation, BulkResponse};
use crate::engine::SearchEngine;
use crate::error::EngineError;

/// Default memory budget for IndexWriter (50MB)
const DEFAULT_WRITER_MEMORY_MB: usize = 50;

/// Tantivy engine configuration
#[derive(Debug, Clone)]
pub struct TantivyEngineConfig {
    /// Path to index directory
    pub index_path: PathBuf,
    /// Memory budget for writer in MB
    pub writer_memory_mb: usize,
}

impl TantivyEngineConfig {
    pub fn new(index_path: impl Into<PathBuf>) -> Self {
        Self {
            index_path: index_path.into(),
            writer_memory_mb: DEFAULT_WRITER_MEMORY_MB,
        }
    }

    pub fn with_memory_mb(mut self, mb: usize) -> Self {
        self.writer_memory_mb = mb;
        self
    }
}

/// Schema field handles
#[derive(Debug, Clone)]
struct EngineSchema {
    schema: Schema,
    /// `{index}/{id}` primary key (STRING | STORED)
    key: Field,
    /// Logical index name (STRING | STORED)
    index: Field,
    /// Document id within the logical index (STRING | STORED)
    doc_id: Field,
    /// JSON body (STORED)
    body: Field,
    /// Flattened string values (TEXT)
    text: Field,
}

impl EngineSchema {
    fn build() -> Self {
        let mut builder = Schema::builder();
        let key = builder.add_text_field("key", STRING | STORED);
        let index = builder.add_text_field("index", STRING | STORED);
        let doc_id = builder.add_text_field("doc_id", STRING | STORED);
        let body = builder.add_text_field("body", STORED);
        let text = builder.add_text_field("text", TEXT);
        Self {
            schema: builder.build(),
            key,
            index,
            doc_id,
            body,
            text,
        }
    }

    fn from_schema(schema: Schema) -> Result<Self, EngineError> {
        let field = |name: &str| {
            schema
                .get_field(name)
                .map_err(|_| EngineError::SchemaMismatch(format!("missing {} field", name)))
        };
        Ok(Self {
            key: field("key")?,
            index: field("index")?,
            doc_id: field("doc_id")?,
            body: field("body")?,
            text: field("text")?,
            schema,
        })
    }
}

fn doc_key(index: &str, id: &str) -> String {
    format!("{}/{}", index, id)
}

/// Concatenate every string leaf of a JSON value.
fn flatten_text(value: &Value, out: &mut Vec<String>) {
    match value {
        Value::String(s) => out.push(s.clone()),
        Value::Array(items) => items.iter().for_each(|v| flatten_text(v, out)),
        Value::Object(map) => map.values().for_each(|v| flatten_text(v, out)),
        _ => {}
    }
}

/// Search engine over an embedded Tantivy index.
pub struct TantivyEngine {
    index: Index,
    schema: EngineSchema,
    writer: Mutex<IndexWriter>,
    reader: IndexReader,
    mappings: DashMap<String, Value>,
    path: Option<PathBuf>,
}

impl TantivyEngine {
    /// Open an existing index or create a new one on disk.
    pub fn open_or_create(config: TantivyEngineConfig) -> Result<Self, EngineError> {
        let path = &config.index_path;
        let index = if path.join("meta.json").exists() {
            debug!(path = ?path, "Opening existing index");
            Index::open_in_dir(path)?
        } else {
            info!(path = ?path, "Creating new index");
            std::fs::create_dir_all(path)?;
            Index::create_in_dir(path, EngineSchema::build().schema)?
        };
        let mut engine = Self::from_index(index, config.writer_memory_mb)?;
        engine.path = Some(config.index_path);
        info!(path = ?engine.path, "Opened search index");
        Ok(engine)
    }

    /// Index held entirely in memory.
    pub fn in_memory() -> Result<Self, EngineError> {
        let index = Index::create_in_ram(EngineSchema::build().schema);
        Self::from_index(index, DEFAULT_WRITER_MEMORY_MB)
    }

    fn from_index(index: Index, writer_memory_mb: usize) -> Result<Self, EngineError> {
        let schema = EngineSchema::from_schema(index.schema())?;
        let writer = index.writer(writer_memory_mb * 1024 * 1024)?;
        let reader = index
            .reader_builder()
            .reload_policy(ReloadPolicy::Manual)
            .try_into()?;
        debug!(memory_mb = writer_memory_mb, "Created index writer");

        Ok(Self {
            index,
            schema,
            writer: Mutex::new(writer),
            reader,
            mappings: DashMap::new(),
            path: None,
        })
    }

    /// Index directory, if on disk.
    pub fn path(&self) -> Option<&Path> {
        self.path.as_deref()
    }

    /// Mapping last registered for the index.
    pub fn mapping(&self, index: &str) -> Option<Value> {
        self.mappings.get(index).map(|m| m.clone())
    }

    /// Number of visible documents in one index, or in all of them.
    pub fn count(&self, index: Option<&str>) -> Result<usize, EngineError> {
        let searcher = self.reader.searcher();
        let count = match index {
            Some(name) => {
                let term = Term::from_field_text(self.schema.index, name);
                searcher.search(&TermQuery::new(term, IndexRecordOption::Basic), &Count)?
            }
            None => searcher.search(&AllQuery, &Count)?,
        };
        Ok(count)
    }

    fn lock_writer(&self) -> Result<MutexGuard<'_, IndexWriter>, EngineError> {
        self.writer
            .lock()
            .map_err(|e| EngineError::IndexLocked(e.to_string()))
    }

    fn find(&self, index: &str, id: &str) -> Result<Option<Value>, EngineError> {
        let searcher = self.reader.searcher();
        let term = Term::from_field_text(self.schema.key, &doc_key(index, id));
        let query = TermQuery::new(term, IndexRecordOption::Basic);
        let top_docs = searcher.search(&query, &TopDocs::with_limit(1))?;

        let Some((_, address)) = top_docs.into_iter().next() else {
            return Ok(None);
        };
        let doc: TantivyDocument = searcher.doc(address)?;
        let body = doc
            .get_first(self.schema.body)
            .and_then(|v| v.as_str())
            .ok_or_else(|| EngineError::Protocol(format!("document {} has no body", id)))?;
        Ok(Some(serde_json::from_str(body)?))
    }

    fn to_doc(&self, index: &str, id: &str, body: &Value) -> Result<TantivyDocument, EngineError> {
        let mut text = Vec::new();
        flatten_text(body, &mut text);
        Ok(doc!(
            self.schema.key => doc_key(index, id),
            self.schema.index => index,
            self.schema.doc_id => id,
            self.schema.body => serde_json::to_string(body)?,
            self.schema.text => text.join(" ")
        ))
    }

    fn write(
        &self,
        writer: &IndexWriter,
        op: &BulkOperation,
        body: &Value,
        status: u16,
    ) -> Result<BulkItemStatus, EngineError> {
        let doc = self.to_doc(op.index_name(), op.id(), body)?;
        writer.delete_term(Term::from_field_text(
            self.schema.key,
            &doc_key(op.index_name(), op.id()),
        ));
        writer.add_document(doc)?;
        Ok(BulkItemStatus::ok(op, status))
    }

    /// Stage every operation on the writer without committing.
    fn apply(
        &self,
        writer: &IndexWriter,
        operations: &[BulkOperation],
    ) -> Result<Vec<BulkItemStatus>, EngineError> {
        // Presence after earlier operations of this request.
        let mut pending: HashMap<String, bool> = HashMap::new();
        let mut items = Vec::with_capacity(operations.len());

        for op in operations {
            let key = doc_key(op.index_name(), op.id());
            let exists = match pending.get(&key) {
                Some(present) => *present,
                None => self.find(op.index_name(), op.id())?.is_some(),
            };

            let item = match op {
                BulkOperation::Index { body, .. } if body.is_object() => {
                    let status = if exists { 200 } else { 201 };
                    let item = self.write(writer, op, body, status)?;
                    pending.insert(key, true);
                    item
                }
                BulkOperation::Index { .. } => {
                    BulkItemStatus::failed(op, 400, "document body must be a JSON object")
                }
                BulkOperation::Delete { .. } => {
                    writer.delete_term(Term::from_field_text(self.schema.key, &key));
                    pending.insert(key, false);
                    BulkItemStatus::ok(op, if exists { 200 } else { 404 })
                }
            };
            items.push(item);
        }
        Ok(items)
    }

    /// Drop staged changes so a failed request leaves nothing behind for
    /// the next commit.
    fn rollback(&self, writer: &mut IndexWriter, cause: &EngineError) {
        match writer.rollback() {
            Ok(_) => warn!(error = %cause, "Rolled back bulk request"),
            Err(e) => warn!(error = %e, cause = %cause, "Failed to roll back bulk request"),
        }
    }

    fn commit_and_reload(&self, writer: &mut IndexWriter) -> Result<(), EngineError> {
        let opstamp = writer.commit()?;
        self.reader.reload()?;
        debug!(opstamp, "Committed index changes");
        Ok(())
    }
}

#[async_trait]
impl SearchEngine for TantivyEngine {
    fn name(&self) -> &'static str {
        "tantivy"
    }

    async fn bulk(&self, operations: &[BulkOperation]) -> Result<BulkResponse, EngineError> {
        let started = Instant::now();
        let mut writer = self.lock_writer()?;

        let staged = self
            .apply(&writer, operations)
            .and_then(|items| self.commit_and_reload(&mut writer).map(|()| items));
        let items = match staged {
            Ok(items) => items,
            Err(e) => {
                self.rollback(&mut writer, &e);
                return Err(e);
            }
        };

        let response = BulkResponse {
            took_ms: started.elapsed().as_millis() as u64,
            items,
        };
        debug!(
            operations = operations.len(),
            succeeded = response.succeeded(),
            "Applied bulk request"
        );
        Ok(response)
    }

    async fn put_mapping(&self, index: &str, mapping: &Value) -> Result<(), EngineError> {
        self.mappings.insert(index.to_string(), mapping.clone());
        debug!(index, "Registered mapping");
        Ok(())
    }

    async fn refresh(&self) -> Result<(), EngineError> {
        let mut writer = self.lock_writer()?;
        self.commit_and_reload(&mut writer)
    }

    async fn clear(&self, index: Option<&str>) -> Result<(), EngineError> {
        let mut writer = self.lock_writer()?;
        match index {
            Some(name) => {
                writer.delete_term(Term::from_field_text(self.schema.index, name));
                self.mappings.remove(name);
                info!(index = name, "Cleared index");
            }
            None => {
                writer.delete_all_documents()?;
                self.mappings.clear();
                info!("Cleared all indices");
            }
        }
        self.commit_and_reload(&mut writer)
    }

    async fn get_document(&self, index: &str, id: &str) -> Result<Option<Value>, EngineError> {
        self.find(index, id)
    }
}
