//! Document extractor implementation.
//!
//! Transforms change events into flat documents keyed by a primary key.

use serde_json::Value;
use tracing::debug;

use crate::errors::RecordError;
use search_sync_shared::{canonical_string, ChangeEvent, Document, Op, ID_FIELD, METADATA_FIELDS};

/// After-image field that may hold the business document (string or object).
const PAYLOAD_FIELD: &str = "payload";

/// After-image field that may hold the business document as an object.
const DOC_FIELD: &str = "doc";

/// A change event reduced to what routing and apply need.
#[derive(Debug, Clone, PartialEq)]
pub struct ExtractedRecord {
    /// The validated operation.
    pub op: Op,
    /// The document, carrying `id` and any routing metadata.
    pub document: Document,
    /// Primary key; equal to the canonical form of `document.id`.
    pub primary_key: String,
}

/// Extracts documents from change events.
///
/// The capture tool can encode the row in several ways depending on how
/// JSON columns are serialised. For create, read and update events the
/// business document is looked up in the after-image in this order:
///
/// 1. `after.payload` holding a JSON string, parsed as nested JSON
/// 2. `after.payload` holding an object
/// 3. `after.doc` holding an object
/// 4. the after-image itself (flat row), minus any unusable `payload` field
///
/// Deletes use the before-image as is.
pub struct DocumentExtractor {}

impl DocumentExtractor {
    /// Create a new document extractor.
    pub fn new() -> Self {
        Self {}
    }

    /// Extract the document and primary key from a change event.
    pub fn extract(&self, event: ChangeEvent) -> Result<ExtractedRecord, RecordError> {
        match event.op {
            Op::Create | Op::Read | Op::Update => {
                let after = event.after.ok_or(RecordError::AfterMissing)?;
                let (document, primary_key) = self.extract_upsert(&after)?;
                Ok(ExtractedRecord {
                    op: event.op,
                    document,
                    primary_key,
                })
            }
            Op::Delete => {
                let mut before = event.before.ok_or(RecordError::DeleteWithoutBefore)?;
                let primary_key = before.id();
                if primary_key.is_empty() {
                    return Err(RecordError::EmptyDeleteId);
                }
                before.insert(ID_FIELD, primary_key.clone());
                Ok(ExtractedRecord {
                    op: Op::Delete,
                    document: before,
                    primary_key,
                })
            }
            Op::Unknown(code) => Err(RecordError::UnknownOp(code)),
        }
    }

    fn extract_upsert(&self, after: &Document) -> Result<(Document, String), RecordError> {
        let mut document = Self::locate_document(after)?;

        // A present inner id is authoritative, even when empty
        let primary_key = match document.get(ID_FIELD) {
            Some(id) => canonical_string(id),
            None => after.field_string_or_empty(ID_FIELD),
        };
        if primary_key.is_empty() {
            return Err(RecordError::EmptyUpsertId);
        }
        document.insert(ID_FIELD, primary_key.clone());

        // Router and loader read metadata from the document whatever the encoding
        for field in METADATA_FIELDS {
            if let Some(value) = after.get(field) {
                document.insert(field, value.clone());
            }
        }

        debug!(id = %primary_key, fields = document.len(), "Extracted document");
        Ok((document, primary_key))
    }

    fn locate_document(after: &Document) -> Result<Document, RecordError> {
        match after.get(PAYLOAD_FIELD) {
            Some(Value::String(raw)) => {
                let inner: Value = serde_json::from_str(raw)
                    .map_err(|e| RecordError::InnerPayload(e.to_string()))?;
                Document::try_from(inner)
                    .map_err(|_| RecordError::InnerPayload("not a JSON object".to_string()))
            }
            Some(Value::Object(map)) => Ok(Document::from(map.clone())),
            _ => match after.get_object(DOC_FIELD) {
                Some(map) => Ok(Document::from(map.clone())),
                None => {
                    let mut row = after.clone();
                    row.remove(PAYLOAD_FIELD);
                    Ok(row)
                }
            },
        }
    }
}

impl Default for DocumentExtractor {
    fn default() -> Self {
        Self::new()
    }
}
