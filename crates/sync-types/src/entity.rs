//! Content entities as read from the content store.
//!
//! The core never mutates an entity; it reads one when a queued entry is
//! sent and derives the index document from it.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::schema::{Schema, SchemaVersionRef};

/// Kind of addressable content object.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EntityType {
    Node,
    Project,
    User,
    Role,
    Group,
    Tag,
    TagFamily,
    Schema,
    Microschema,
}

impl EntityType {
    /// Every root collection, in the order a full resync enumerates them.
    pub const ALL: [EntityType; 9] = [
        EntityType::Node,
        EntityType::Project,
        EntityType::User,
        EntityType::Role,
        EntityType::Group,
        EntityType::Tag,
        EntityType::TagFamily,
        EntityType::Schema,
        EntityType::Microschema,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Node => "node",
            EntityType::Project => "project",
            EntityType::User => "user",
            EntityType::Role => "role",
            EntityType::Group => "group",
            EntityType::Tag => "tag",
            EntityType::TagFamily => "tag_family",
            EntityType::Schema => "schema",
            EntityType::Microschema => "microschema",
        }
    }

    /// Parse from string, returning None for unknown types.
    pub fn parse(s: &str) -> Option<Self> {
        Self::ALL.iter().copied().find(|t| t.as_str() == s)
    }

    /// Index that receives documents of this type unless an event names one.
    pub fn default_index_name(&self) -> &'static str {
        match self {
            EntityType::Node => "node",
            EntityType::Project => "project",
            EntityType::User => "user",
            EntityType::Role => "role",
            EntityType::Group => "group",
            EntityType::Tag => "tag",
            EntityType::TagFamily => "tag-family",
            EntityType::Schema => "schema",
            EntityType::Microschema => "microschema",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for EntityType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s).ok_or_else(|| format!("unknown entity type: {}", s))
    }
}

/// Binary field metadata. Every sub-value is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BinaryInfo {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filename: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub filesize: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub mime_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub dominant_color: Option<String>,
}

/// A micronode: an embedded field container typed by its own microschema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Micronode {
    pub microschema: Schema,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
}

/// Value of a single entity field.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "value", rename_all = "snake_case")]
pub enum FieldValue {
    String(String),
    Html(String),
    Boolean(bool),
    /// Milliseconds since the Unix epoch
    Date(i64),
    Number(serde_json::Number),
    Binary(BinaryInfo),
    /// UUID of the referenced node
    Node(String),
    Micronode(Box<Micronode>),
    List(Vec<FieldValue>),
}

impl FieldValue {
    /// Short name of the variant, used in error messages.
    pub fn kind(&self) -> &'static str {
        match self {
            FieldValue::String(_) => "string",
            FieldValue::Html(_) => "html",
            FieldValue::Boolean(_) => "boolean",
            FieldValue::Date(_) => "date",
            FieldValue::Number(_) => "number",
            FieldValue::Binary(_) => "binary",
            FieldValue::Node(_) => "node",
            FieldValue::Micronode(_) => "micronode",
            FieldValue::List(_) => "list",
        }
    }

    /// Convenience constructor for float numbers; non-finite values have no
    /// JSON representation and yield None.
    pub fn number(value: f64) -> Option<Self> {
        serde_json::Number::from_f64(value).map(FieldValue::Number)
    }
}

/// Index holding the nodes of one project in one language.
pub fn node_index_name(project: &str, language: &str) -> String {
    format!("node-{}-{}", project, language)
}

/// `{uuid, name}` projection of a related entity.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NamedRef {
    pub uuid: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

impl NamedRef {
    pub fn new(uuid: impl Into<String>, name: Option<&str>) -> Self {
        Self {
            uuid: uuid.into(),
            name: name.map(str::to_string),
        }
    }
}

/// An addressable content object.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Entity {
    pub uuid: String,
    pub entity_type: EntityType,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
    #[serde(default)]
    pub fields: BTreeMap<String, FieldValue>,
    /// UUID of the last editor
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub editor: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub edited: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub creator: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created: Option<DateTime<Utc>>,
    /// Schema version for node-type entities
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub schema: Option<SchemaVersionRef>,
    /// Parent node UUID; absent for root/base nodes
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub project: Option<NamedRef>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<NamedRef>,
}

impl Entity {
    /// Create an entity with no field values or metadata.
    pub fn new(entity_type: EntityType, uuid: impl Into<String>) -> Self {
        Self {
            uuid: uuid.into(),
            entity_type,
            name: None,
            fields: BTreeMap::new(),
            editor: None,
            edited: None,
            creator: None,
            created: None,
            schema: None,
            parent: None,
            language: None,
            project: None,
            tags: Vec::new(),
        }
    }

    /// Create a node bound to the given schema version.
    pub fn node(uuid: impl Into<String>, schema: &Schema, language: impl Into<String>) -> Self {
        let mut entity = Self::new(EntityType::Node, uuid);
        entity.schema = Some(schema.version_ref());
        entity.language = Some(language.into());
        entity
    }

    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = Some(name.into());
        self
    }

    pub fn with_field(mut self, name: impl Into<String>, value: FieldValue) -> Self {
        self.fields.insert(name.into(), value);
        self
    }

    pub fn with_parent(mut self, parent: impl Into<String>) -> Self {
        self.parent = Some(parent.into());
        self
    }

    pub fn with_editor(mut self, editor: impl Into<String>, edited: DateTime<Utc>) -> Self {
        self.editor = Some(editor.into());
        self.edited = Some(edited);
        self
    }

    pub fn with_creator(mut self, creator: impl Into<String>, created: DateTime<Utc>) -> Self {
        self.creator = Some(creator.into());
        self.created = Some(created);
        self
    }

    pub fn field(&self, name: &str) -> Option<&FieldValue> {
        self.fields.get(name)
    }

    /// Index that holds this entity's document.
    ///
    /// Nodes with a project and a language go to that project's language
    /// index, named after the project (its UUID when unnamed). Everything
    /// else goes to the type's default index.
    pub fn index_name(&self) -> String {
        match (self.entity_type, &self.project, &self.language) {
            (EntityType::Node, Some(project), Some(language)) => {
                node_index_name(project.name.as_deref().unwrap_or(&project.uuid), language)
            }
            _ => self.entity_type.default_index_name().to_string(),
        }
    }
}
