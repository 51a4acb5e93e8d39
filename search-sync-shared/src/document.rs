//! Schema-less document type.
//!
//! Captured rows carry arbitrary columns, so a document is an open mapping
//! from field name to a dynamically typed [`Value`]. Accessors return
//! `Option` when a field is absent or has the wrong shape.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Primary key field written into every document sent to the index.
pub const ID_FIELD: &str = "id";
/// Tenant component of the routing key.
pub const APP_NAME_FIELD: &str = "app_name";
/// Collection component of the routing key.
pub const COLLECTION_FIELD: &str = "collection";
/// Soft-delete flag.
pub const IS_DELETE_FIELD: &str = "is_delete";

/// Routing and soft-delete metadata that never reaches the search index.
pub const METADATA_FIELDS: [&str; 3] = [IS_DELETE_FIELD, APP_NAME_FIELD, COLLECTION_FIELD];

/// Convert any value to its canonical string form.
///
/// This is the only coercion used for ids, routing components and the
/// soft-delete flag:
///
/// | value  | canonical form                 |
/// |--------|--------------------------------|
/// | string | the string itself              |
/// | number | JSON text (`42`, `4.5`)        |
/// | bool   | `true` / `false`               |
/// | null   | empty string                   |
/// | array / object | compact JSON text      |
pub fn canonical_string(value: &Value) -> String {
    match value {
        Value::Null => String::new(),
        Value::String(s) => s.clone(),
        Value::Bool(b) => b.to_string(),
        Value::Number(n) => n.to_string(),
        Value::Array(_) | Value::Object(_) => value.to_string(),
    }
}

/// A flat document: field name to dynamically typed value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Document(Map<String, Value>);

impl Document {
    /// Create an empty document.
    pub fn new() -> Self {
        Self(Map::new())
    }

    /// Get a field's raw value.
    pub fn get(&self, field: &str) -> Option<&Value> {
        self.0.get(field)
    }

    /// Get a field only if it holds a string.
    pub fn get_str(&self, field: &str) -> Option<&str> {
        self.0.get(field).and_then(Value::as_str)
    }

    /// Get a field only if it holds a nested mapping.
    pub fn get_object(&self, field: &str) -> Option<&Map<String, Value>> {
        self.0.get(field).and_then(Value::as_object)
    }

    /// Canonical string form of a field, `None` if absent.
    pub fn field_string(&self, field: &str) -> Option<String> {
        self.0.get(field).map(canonical_string)
    }

    /// Canonical string form of a field, empty if absent.
    pub fn field_string_or_empty(&self, field: &str) -> String {
        self.field_string(field).unwrap_or_default()
    }

    /// Set a field, replacing any previous value.
    pub fn insert(&mut self, field: impl Into<String>, value: impl Into<Value>) -> Option<Value> {
        self.0.insert(field.into(), value.into())
    }

    /// Remove a field.
    pub fn remove(&mut self, field: &str) -> Option<Value> {
        self.0.remove(field)
    }

    /// The document's `id` in canonical form, empty if absent.
    pub fn id(&self) -> String {
        self.field_string_or_empty(ID_FIELD)
    }

    /// Whether the soft-delete flag is set.
    ///
    /// Boolean `true`, or a value whose canonical form is `"true"` or `"1"`,
    /// marks the row as deleted. Anything else, including absence, does not.
    pub fn is_soft_deleted(&self) -> bool {
        match self.0.get(IS_DELETE_FIELD) {
            None => false,
            Some(Value::Bool(b)) => *b,
            Some(other) => {
                let s = canonical_string(other);
                s == "true" || s == "1"
            }
        }
    }

    /// Drop the routing and soft-delete metadata fields.
    pub fn strip_metadata(&mut self) {
        for field in METADATA_FIELDS {
            self.0.remove(field);
        }
    }

    /// Number of fields.
    pub fn len(&self) -> usize {
        self.0.len()
    }

    /// Whether the document has no fields.
    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl From<Map<String, Value>> for Document {
    fn from(map: Map<String, Value>) -> Self {
        Self(map)
    }
}

impl From<Document> for Value {
    fn from(doc: Document) -> Self {
        Value::Object(doc.0)
    }
}

impl TryFrom<Value> for Document {
    type Error = Value;

    /// Succeeds only for JSON objects; any other value is handed back.
    fn try_from(value: Value) -> Result<Self, Self::Error> {
        match value {
            Value::Object(map) => Ok(Self(map)),
            other => Err(other),
        }
    }
}
