//! Entity to index document conversion.
//!
//! Documents are transient: they are built when an entry is sent and never
//! persisted by the sync pipeline.

use std::sync::Arc;

use chrono::{DateTime, SecondsFormat, Utc};
use serde_json::{json, Map, Value};
use sync_types::{Entity, FieldValue, NamedRef, Schema};

use crate::codec::encode_fields;
use crate::error::TransformError;
use crate::mapping::{build_basic_mapping, MappingCache, MappingDescriptor};

/// Build the index document for a schema-typed entity.
///
/// The entity must reference exactly the supplied schema version.
pub fn build_document(entity: &Entity, schema: &Schema) -> Result<Value, TransformError> {
    let entity_schema = entity
        .schema
        .as_ref()
        .ok_or_else(|| TransformError::MissingSchema(entity.uuid.clone()))?;
    if entity_schema.uuid != schema.uuid || entity_schema.version != schema.version {
        return Err(TransformError::SchemaMismatch {
            uuid: entity.uuid.clone(),
            expected: format!("{}@{}", schema.name, schema.version),
            actual: format!("{}@{}", entity_schema.name, entity_schema.version),
        });
    }

    let mut doc = base_document(entity);
    if let Some(parent) = &entity.parent {
        doc.insert("parentNode".to_string(), json!({ "uuid": parent }));
    }
    if let Some(language) = &entity.language {
        doc.insert("language".to_string(), json!(language));
    }
    if !entity.tags.is_empty() {
        let tags: Vec<Value> = entity.tags.iter().map(named_ref).collect();
        doc.insert("tags".to_string(), Value::Array(tags));
    }
    doc.insert(
        "schema".to_string(),
        json!({
            "name": schema.name,
            "uuid": schema.uuid,
            "version": schema.version,
        }),
    );
    doc.insert(
        "fields".to_string(),
        Value::Object(encode_fields(schema, &entity.fields)?),
    );

    if let Some(key) = &schema.display_field {
        let mut display = Map::new();
        display.insert("key".to_string(), json!(key));
        if let Some(FieldValue::String(value)) = entity.field(key) {
            display.insert("value".to_string(), json!(value));
        }
        doc.insert("displayField".to_string(), Value::Object(display));
    }

    Ok(Value::Object(doc))
}

/// Build the index document for an entity without a schema.
pub fn build_basic_document(entity: &Entity) -> Value {
    Value::Object(base_document(entity))
}

/// Fields shared by every document type.
fn base_document(entity: &Entity) -> Map<String, Value> {
    let mut doc = Map::new();
    doc.insert("uuid".to_string(), json!(entity.uuid));
    if let Some(name) = &entity.name {
        doc.insert("name".to_string(), json!(name));
    }
    if let Some(editor) = &entity.editor {
        doc.insert("editor".to_string(), json!({ "uuid": editor }));
    }
    if let Some(edited) = &entity.edited {
        doc.insert("edited".to_string(), json!(iso8601(edited)));
    }
    if let Some(creator) = &entity.creator {
        doc.insert("creator".to_string(), json!({ "uuid": creator }));
    }
    if let Some(created) = &entity.created {
        doc.insert("created".to_string(), json!(iso8601(created)));
    }
    if let Some(project) = &entity.project {
        doc.insert("project".to_string(), named_ref(project));
    }
    doc
}

fn named_ref(r: &NamedRef) -> Value {
    match &r.name {
        Some(name) => json!({ "uuid": r.uuid, "name": name }),
        None => json!({ "uuid": r.uuid }),
    }
}

fn iso8601(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

/// Document builder with a shared mapping cache.
#[derive(Debug, Default)]
pub struct DocumentTransformer {
    mappings: MappingCache,
}

impl DocumentTransformer {
    pub fn new() -> Self {
        Self::default()
    }

    /// Build the document for an entity, schema-typed or not.
    pub fn document(&self, entity: &Entity, schema: Option<&Schema>) -> Result<Value, TransformError> {
        match schema {
            Some(schema) => build_document(entity, schema),
            None if entity.schema.is_some() => {
                Err(TransformError::MissingSchema(entity.uuid.clone()))
            }
            None => Ok(build_basic_document(entity)),
        }
    }

    /// Mapping for documents produced from the given schema, if any.
    pub fn mapping(&self, schema: Option<&Schema>) -> Arc<MappingDescriptor> {
        match schema {
            Some(schema) => self.mappings.get_or_build(schema),
            None => Arc::new(build_basic_mapping()),
        }
    }

    /// Number of cached schema mappings.
    pub fn cached_mappings(&self) -> usize {
        self.mappings.len()
    }
}
