//! Destination index naming.

use std::fmt;

use crate::document::{Document, APP_NAME_FIELD, COLLECTION_FIELD};

/// Tenant and collection read from a document's metadata fields.
///
/// Either component may be empty; such a key cannot be routed.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RoutingKey {
    /// Owning application (tenant).
    pub app_name: String,
    /// Collection within the application.
    pub collection: String,
}

impl RoutingKey {
    /// Create a routing key from its two components.
    pub fn new(app_name: impl Into<String>, collection: impl Into<String>) -> Self {
        Self {
            app_name: app_name.into(),
            collection: collection.into(),
        }
    }

    /// Read both components from a document using canonical stringification.
    pub fn from_document(doc: &Document) -> Self {
        Self {
            app_name: doc.field_string_or_empty(APP_NAME_FIELD),
            collection: doc.field_string_or_empty(COLLECTION_FIELD),
        }
    }

    /// Whether both components are non-empty.
    pub fn is_complete(&self) -> bool {
        !self.app_name.is_empty() && !self.collection.is_empty()
    }

    /// The index this key routes to, if both components are present.
    pub fn index_name(&self) -> Option<IndexName> {
        self.is_complete()
            .then(|| IndexName(format!("{}_{}", self.app_name, self.collection)))
    }
}

/// Name of a search index: `{app_name}_{collection}`, with no escaping.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct IndexName(String);

impl IndexName {
    /// Borrow the name.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for IndexName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for IndexName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_index_name_is_plain_concatenation() {
        let key = RoutingKey::new("Acme Corp", "docs_v2");
        assert_eq!(key.index_name().unwrap().as_str(), "Acme Corp_docs_v2");
    }

    #[test]
    fn test_incomplete_key_has_no_index() {
        assert!(RoutingKey::new("", "docs").index_name().is_none());
        assert!(RoutingKey::new("acme", "").index_name().is_none());
        assert!(RoutingKey::default().index_name().is_none());
    }

    #[test]
    fn test_from_document_stringifies() {
        let doc = Document::try_from(json!({"app_name": 7, "collection": true})).unwrap();
        let key = RoutingKey::from_document(&doc);
        assert_eq!(key, RoutingKey::new("7", "true"));
    }
}
