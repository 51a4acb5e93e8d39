//! Index router.
//!
//! Derives the destination index from the `app_name` and `collection`
//! fields of an extracted document. Pure: no caching, no character-set
//! checks, no existence check against the search engine.

use crate::errors::RecordError;
use search_sync_shared::{Document, IndexName, RoutingKey};

/// Resolve the destination index, `None` if either component is empty.
pub fn resolve_index(document: &Document) -> Option<IndexName> {
    RoutingKey::from_document(document).index_name()
}

/// Resolve the destination index, or explain why the document cannot be routed.
pub fn route(document: &Document) -> Result<IndexName, RecordError> {
    let key = RoutingKey::from_document(document);
    key.index_name().ok_or_else(|| RecordError::Unroutable {
        app_name: key.app_name,
        collection: key.collection,
        document: serde_json::to_string(document).unwrap_or_default(),
    })
}
