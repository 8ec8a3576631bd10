//! Per-field-type value and mapping codecs.
//!
//! Each [`FieldType`] has exactly one document encoding and one mapping
//! fragment. Both are exhaustive matches over the closed type set, so a new
//! field type cannot be added without handling it here.

use std::collections::BTreeMap;

use serde_json::{json, Map, Number, Value};
use sync_types::{BinaryInfo, FieldType, FieldValue, ListElementType, Micronode, Schema};
use tracing::debug;

use crate::error::TransformError;

/// Encode one field value as it appears under the document's `fields` object.
pub fn encode_value(
    field: &str,
    field_type: FieldType,
    value: &FieldValue,
) -> Result<Value, TransformError> {
    match (field_type, value) {
        (FieldType::String, FieldValue::String(s)) => Ok(Value::String(s.clone())),
        (FieldType::Html, FieldValue::Html(s)) => Ok(Value::String(s.clone())),
        (FieldType::Boolean, FieldValue::Boolean(b)) => Ok(Value::Bool(*b)),
        (FieldType::Date, FieldValue::Date(millis)) => Ok(Value::from(*millis)),
        (FieldType::Number, FieldValue::Number(n)) => encode_number(field, n),
        (FieldType::Binary, FieldValue::Binary(info)) => Ok(encode_binary(info)),
        (FieldType::Node, FieldValue::Node(uuid)) => Ok(Value::String(uuid.clone())),
        (FieldType::Micronode, FieldValue::Micronode(micronode)) => encode_micronode(micronode),
        (FieldType::List(element), FieldValue::List(items)) => encode_list(field, element, items),
        (expected, actual) => Err(mismatch(field, expected, actual)),
    }
}

/// Encode every schema field the value map carries, in schema order.
///
/// Fields absent from `values` are omitted; values without a matching field
/// definition are ignored.
pub fn encode_fields(
    schema: &Schema,
    values: &BTreeMap<String, FieldValue>,
) -> Result<Map<String, Value>, TransformError> {
    let mut encoded = Map::new();
    for field in &schema.fields {
        if let Some(value) = values.get(&field.name) {
            encoded.insert(
                field.name.clone(),
                encode_value(&field.name, field.field_type, value)?,
            );
        }
    }

    if encoded.len() < values.len() {
        for name in values.keys().filter(|name| schema.field(name).is_none()) {
            debug!(schema = %schema.name, field = %name, "Ignoring value without field definition");
        }
    }
    Ok(encoded)
}

/// Mapping fragment for a field of the given type.
pub fn encode_mapping(field_type: FieldType) -> Value {
    match field_type {
        FieldType::String | FieldType::Html => json!({
            "type": "text",
            "fields": { "raw": { "type": "keyword" } }
        }),
        FieldType::Boolean => json!({ "type": "boolean" }),
        FieldType::Date => json!({ "type": "date" }),
        FieldType::Number => json!({ "type": "double" }),
        FieldType::Node => json!({ "type": "keyword" }),
        FieldType::Binary => json!({
            "type": "object",
            "properties": {
                "filename": { "type": "keyword" },
                "filesize": { "type": "long" },
                "width": { "type": "long" },
                "height": { "type": "long" },
                "mimeType": { "type": "keyword" },
                "dominantColor": { "type": "keyword" }
            }
        }),
        FieldType::Micronode => json!({ "type": "object" }),
        // Keeps compound queries scoped to a single list element.
        FieldType::List(_) => json!({ "type": "nested" }),
    }
}

/// Numbers are stored as 64-bit floats; wider values lose precision.
fn encode_number(field: &str, n: &Number) -> Result<Value, TransformError> {
    n.as_f64()
        .and_then(Number::from_f64)
        .map(Value::Number)
        .ok_or_else(|| TransformError::InvalidNumber(field.to_string()))
}

fn encode_binary(info: &BinaryInfo) -> Value {
    let mut obj = Map::new();
    if let Some(filename) = &info.filename {
        obj.insert("filename".to_string(), json!(filename));
    }
    if let Some(filesize) = info.filesize {
        obj.insert("filesize".to_string(), json!(filesize));
    }
    if let Some(width) = info.width {
        obj.insert("width".to_string(), json!(width));
    }
    if let Some(height) = info.height {
        obj.insert("height".to_string(), json!(height));
    }
    if let Some(mime_type) = &info.mime_type {
        obj.insert("mimeType".to_string(), json!(mime_type));
    }
    if let Some(color) = &info.dominant_color {
        obj.insert("dominantColor".to_string(), json!(color));
    }
    Value::Object(obj)
}

fn encode_micronode(micronode: &Micronode) -> Result<Value, TransformError> {
    let schema = &micronode.microschema;
    Ok(json!({
        "microschema": {
            "name": schema.name,
            "uuid": schema.uuid,
            "version": schema.version,
        },
        "fields": encode_fields(schema, &micronode.fields)?,
    }))
}

fn encode_list(
    field: &str,
    element: ListElementType,
    items: &[FieldValue],
) -> Result<Value, TransformError> {
    let mut encoded = Vec::with_capacity(items.len());
    for (i, item) in items.iter().enumerate() {
        let value = match (element, item) {
            // Boolean list items are indexed as "true"/"false".
            (ListElementType::Boolean, FieldValue::Boolean(b)) => Value::String(b.to_string()),
            _ => encode_value(&format!("{}[{}]", field, i), element.into(), item)?,
        };
        encoded.push(value);
    }
    Ok(Value::Array(encoded))
}

fn mismatch(field: &str, expected: FieldType, actual: &FieldValue) -> TransformError {
    TransformError::TypeMismatch {
        field: field.to_string(),
        expected: expected.to_string(),
        actual: actual.kind(),
    }
}
