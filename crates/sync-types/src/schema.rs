//! Content schema definitions.
//!
//! A [`Schema`] is a named, versioned list of [`FieldSchema`]s. Published
//! versions are immutable; an edit produces a new version. The same
//! `FieldSchema` drives both the index document and the index mapping.
//!
//! Field types form a closed set. Schema JSON uses string tags
//! (`"string"`, `"list"` + `"listType"`, ...) and an unknown tag is rejected
//! while deserializing, so nothing downstream has to handle "unknown".

use serde::{Deserialize, Serialize};

use crate::error::TypesError;

/// Element type of a list field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ListElementType {
    String,
    Html,
    Boolean,
    Date,
    Number,
    Node,
    Micronode,
}

impl ListElementType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListElementType::String => "string",
            ListElementType::Html => "html",
            ListElementType::Boolean => "boolean",
            ListElementType::Date => "date",
            ListElementType::Number => "number",
            ListElementType::Node => "node",
            ListElementType::Micronode => "micronode",
        }
    }

    /// Parse from string, returning None for types that cannot be list elements.
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "string" => Some(ListElementType::String),
            "html" => Some(ListElementType::Html),
            "boolean" => Some(ListElementType::Boolean),
            "date" => Some(ListElementType::Date),
            "number" => Some(ListElementType::Number),
            "node" => Some(ListElementType::Node),
            "micronode" => Some(ListElementType::Micronode),
            _ => None,
        }
    }
}

impl std::fmt::Display for ListElementType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Type of a schema field.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FieldType {
    String,
    Html,
    Boolean,
    Date,
    Number,
    Binary,
    Node,
    Micronode,
    List(ListElementType),
}

impl FieldType {
    /// The type tag used in schema JSON. Lists report `"list"`.
    pub fn tag(&self) -> &'static str {
        match self {
            FieldType::String => "string",
            FieldType::Html => "html",
            FieldType::Boolean => "boolean",
            FieldType::Date => "date",
            FieldType::Number => "number",
            FieldType::Binary => "binary",
            FieldType::Node => "node",
            FieldType::Micronode => "micronode",
            FieldType::List(_) => "list",
        }
    }

    /// Resolve a type tag (plus list element tag) for the named field.
    pub fn parse(field: &str, tag: &str, list_type: Option<&str>) -> Result<Self, TypesError> {
        let field_type = match tag {
            "string" => FieldType::String,
            "html" => FieldType::Html,
            "boolean" => FieldType::Boolean,
            "date" => FieldType::Date,
            "number" => FieldType::Number,
            "binary" => FieldType::Binary,
            "node" => FieldType::Node,
            "micronode" => FieldType::Micronode,
            "list" => {
                let element = list_type.ok_or_else(|| TypesError::UnsupportedListType {
                    field: field.to_string(),
                    element: "<missing>".to_string(),
                })?;
                let element = ListElementType::parse(element).ok_or_else(|| {
                    TypesError::UnsupportedListType {
                        field: field.to_string(),
                        element: element.to_string(),
                    }
                })?;
                FieldType::List(element)
            }
            other => return Err(TypesError::UnknownFieldType(other.to_string())),
        };
        Ok(field_type)
    }

    /// Element type for list fields.
    pub fn list_element(&self) -> Option<ListElementType> {
        match self {
            FieldType::List(element) => Some(*element),
            _ => None,
        }
    }
}

impl From<ListElementType> for FieldType {
    fn from(element: ListElementType) -> Self {
        match element {
            ListElementType::String => FieldType::String,
            ListElementType::Html => FieldType::Html,
            ListElementType::Boolean => FieldType::Boolean,
            ListElementType::Date => FieldType::Date,
            ListElementType::Number => FieldType::Number,
            ListElementType::Node => FieldType::Node,
            ListElementType::Micronode => FieldType::Micronode,
        }
    }
}

impl std::fmt::Display for FieldType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            FieldType::List(element) => write!(f, "list<{}>", element),
            other => f.write_str(other.tag()),
        }
    }
}

/// Wire form of a field schema.
#[derive(Debug, Clone, Serialize, Deserialize)]
struct RawFieldSchema {
    name: String,
    #[serde(rename = "type")]
    field_type: String,
    #[serde(rename = "listType", default, skip_serializing_if = "Option::is_none")]
    list_type: Option<String>,
}

impl TryFrom<RawFieldSchema> for FieldSchema {
    type Error = TypesError;

    fn try_from(raw: RawFieldSchema) -> Result<Self, Self::Error> {
        let field_type = FieldType::parse(&raw.name, &raw.field_type, raw.list_type.as_deref())?;
        Ok(FieldSchema {
            name: raw.name,
            field_type,
        })
    }
}

impl From<FieldSchema> for RawFieldSchema {
    fn from(field: FieldSchema) -> Self {
        RawFieldSchema {
            list_type: field
                .field_type
                .list_element()
                .map(|e| e.as_str().to_string()),
            field_type: field.field_type.tag().to_string(),
            name: field.name,
        }
    }
}

/// A single field definition within a schema.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawFieldSchema", into = "RawFieldSchema")]
pub struct FieldSchema {
    pub name: String,
    pub field_type: FieldType,
}

impl FieldSchema {
    pub fn new(name: impl Into<String>, field_type: FieldType) -> Self {
        Self {
            name: name.into(),
            field_type,
        }
    }
}

/// Reference to a published schema version.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SchemaVersionRef {
    pub name: String,
    pub uuid: String,
    pub version: u32,
}

impl SchemaVersionRef {
    pub fn new(name: impl Into<String>, uuid: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            uuid: uuid.into(),
            version,
        }
    }
}

/// A published schema (or microschema) version.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Schema {
    pub name: String,
    pub uuid: String,
    pub version: u32,
    /// Name of the string field rendered in default list views
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub display_field: Option<String>,
    #[serde(default)]
    pub fields: Vec<FieldSchema>,
}

impl Schema {
    pub fn new(name: impl Into<String>, uuid: impl Into<String>, version: u32) -> Self {
        Self {
            name: name.into(),
            uuid: uuid.into(),
            version,
            display_field: None,
            fields: Vec::new(),
        }
    }

    /// Append a field definition.
    pub fn with_field(mut self, name: impl Into<String>, field_type: FieldType) -> Self {
        self.fields.push(FieldSchema::new(name, field_type));
        self
    }

    pub fn with_display_field(mut self, name: impl Into<String>) -> Self {
        self.display_field = Some(name.into());
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldSchema> {
        self.fields.iter().find(|f| f.name == name)
    }

    pub fn version_ref(&self) -> SchemaVersionRef {
        SchemaVersionRef::new(self.name.clone(), self.uuid.clone(), self.version)
    }
}
