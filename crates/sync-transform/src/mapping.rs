//! Index mapping derivation.
//!
//! A mapping is a pure function of a schema version. Published versions are
//! immutable, so descriptors are cached per (schema name, version) and never
//! invalidated.

use std::sync::Arc;

use dashmap::DashMap;
use serde_json::{json, Map, Value};
use sync_types::{Schema, SchemaVersionRef};
use tracing::debug;

use crate::codec::encode_mapping;

/// Engine-side type descriptor for the documents of one schema version.
#[derive(Debug, Clone, PartialEq)]
pub struct MappingDescriptor {
    /// Schema version the mapping was derived from; None for schema-less
    /// entity indices
    pub schema: Option<SchemaVersionRef>,
    /// Mapping body, `{"properties": {...}}`
    pub body: Value,
}

/// Build the mapping for documents of the given schema version.
pub fn build_mapping(schema: &Schema) -> MappingDescriptor {
    let mut field_props = Map::new();
    for field in &schema.fields {
        field_props.insert(field.name.clone(), encode_mapping(field.field_type));
    }

    let mut properties = node_base_properties();
    properties.insert("fields".to_string(), json!({ "properties": field_props }));

    MappingDescriptor {
        schema: Some(schema.version_ref()),
        body: json!({ "properties": properties }),
    }
}

/// Mapping for indices of schema-less entities (users, roles, groups, ...).
pub fn build_basic_mapping() -> MappingDescriptor {
    MappingDescriptor {
        schema: None,
        body: json!({ "properties": basic_properties() }),
    }
}

fn basic_properties() -> Map<String, Value> {
    let keyword = json!({ "type": "keyword" });
    let user_ref = json!({ "properties": { "uuid": keyword } });

    let mut props = Map::new();
    props.insert("uuid".to_string(), keyword.clone());
    props.insert(
        "name".to_string(),
        json!({ "type": "text", "fields": { "raw": { "type": "keyword" } } }),
    );
    props.insert("editor".to_string(), user_ref.clone());
    props.insert("edited".to_string(), json!({ "type": "date" }));
    props.insert("creator".to_string(), user_ref);
    props.insert("created".to_string(), json!({ "type": "date" }));
    props.insert(
        "project".to_string(),
        json!({ "properties": { "uuid": keyword, "name": keyword } }),
    );
    props
}

fn node_base_properties() -> Map<String, Value> {
    let keyword = json!({ "type": "keyword" });

    let mut props = basic_properties();
    props.insert("language".to_string(), keyword.clone());
    props.insert(
        "schema".to_string(),
        json!({ "properties": {
            "name": keyword,
            "uuid": keyword,
            "version": { "type": "long" }
        } }),
    );
    props.insert(
        "parentNode".to_string(),
        json!({ "properties": { "uuid": keyword } }),
    );
    props.insert(
        "tags".to_string(),
        json!({ "properties": { "uuid": keyword, "name": keyword } }),
    );
    props.insert(
        "displayField".to_string(),
        json!({ "properties": { "key": keyword, "value": { "type": "text" } } }),
    );
    props
}

/// Concurrent cache of mapping descriptors keyed by (schema name, version).
#[derive(Debug, Default)]
pub struct MappingCache {
    entries: DashMap<(String, u32), Arc<MappingDescriptor>>,
}

impl MappingCache {
    pub fn new() -> Self {
        Self::default()
    }

    /// Cached mapping for the schema version, building it on first use.
    pub fn get_or_build(&self, schema: &Schema) -> Arc<MappingDescriptor> {
        let key = (schema.name.clone(), schema.version);
        if let Some(existing) = self.entries.get(&key) {
            return existing.clone();
        }

        debug!(schema = %schema.name, version = schema.version, "Building mapping");
        self.entries
            .entry(key)
            .or_insert_with(|| Arc::new(build_mapping(schema)))
            .clone()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use sync_types::{FieldType, ListElementType};

    fn article(version: u32) -> Schema {
        Schema::new("article", "s-1", version)
            .with_field("title", FieldType::String)
            .with_field("tags", FieldType::List(ListElementType::String))
    }

    #[test]
    fn test_title_tags_mapping() {
        let mapping = build_mapping(&article(1));
        let fields = &mapping.body["properties"]["fields"]["properties"];

        assert_eq!(fields["title"]["type"], "text");
        assert_eq!(fields["title"]["fields"]["raw"]["type"], "keyword");
        assert_eq!(fields["tags"], json!({ "type": "nested" }));
        assert_eq!(fields.as_object().unwrap().len(), 2);
        assert_eq!(mapping.schema, Some(SchemaVersionRef::new("article", "s-1", 1)));
    }

    #[test]
    fn test_build_mapping_is_pure() {
        let schema = article(3);
        assert_eq!(build_mapping(&schema), build_mapping(&schema));
    }

    #[test]
    fn test_base_properties_present() {
        let mapping = build_mapping(&Schema::new("empty", "s-0", 1));
        let props = mapping.body["properties"].as_object().unwrap();
        for key in ["uuid", "language", "schema", "parentNode", "tags", "displayField"] {
            assert!(props.contains_key(key), "missing {}", key);
        }
        assert_eq!(mapping.body["properties"]["fields"], json!({ "properties": {} }));
    }

    #[test]
    fn test_basic_mapping() {
        let mapping = build_basic_mapping();
        assert!(mapping.schema.is_none());
        assert_eq!(mapping.body["properties"]["uuid"]["type"], "keyword");
        assert!(mapping.body["properties"].get("fields").is_none());
    }

    #[test]
    fn test_cache_per_version() {
        let cache = MappingCache::new();
        let first = cache.get_or_build(&article(1));
        let again = cache.get_or_build(&article(1));
        assert!(Arc::ptr_eq(&first, &again));
        assert_eq!(cache.len(), 1);

        let next = cache.get_or_build(&article(2).with_field("summary", FieldType::Html));
        assert!(!Arc::ptr_eq(&first, &next));
        assert_eq!(cache.len(), 2);
        assert!(next.body["properties"]["fields"]["properties"]
            .get("summary")
            .is_some());
    }
}
