//! Decoder for change-data-capture envelopes.
//!
//! Turns one raw log-record value into a [`ChangeEvent`]. Empty and literal
//! `null` values are tombstones or heartbeats and decode to
//! [`Decoded::Skip`] rather than an error.
//!
//! Envelope shape:
//!
//! ```text
//! { "payload": { "before": {..}|null, "after": {..}|null, "op": "c"|"r"|"u"|"d" } }
//! ```

use serde::Deserialize;
use serde_json::{Map, Value};

use crate::errors::RecordError;
use search_sync_shared::{ChangeEvent, Document, Op};

/// Result of decoding one record value.
#[derive(Debug, Clone, PartialEq)]
pub enum Decoded {
    /// Empty, whitespace-only or `null` value. Ignore silently.
    Skip,
    /// A change event whose `op` has not been validated yet.
    Event(ChangeEvent),
}

#[derive(Debug, Deserialize)]
struct Envelope {
    #[serde(default)]
    payload: Option<EnvelopePayload>,
}

#[derive(Debug, Default, Deserialize)]
struct EnvelopePayload {
    #[serde(default)]
    before: Option<Map<String, Value>>,
    #[serde(default)]
    after: Option<Map<String, Value>>,
    #[serde(default)]
    op: Option<String>,
}

/// Decode a record value.
///
/// `None` is a record without any value (a transport-level tombstone).
pub fn decode(value: Option<&[u8]>) -> Result<Decoded, RecordError> {
    let Some(value) = value else {
        return Ok(Decoded::Skip);
    };

    let trimmed = value.trim_ascii();
    if trimmed.is_empty() || trimmed == b"null" {
        return Ok(Decoded::Skip);
    }

    let envelope: Envelope =
        serde_json::from_slice(trimmed).map_err(|e| RecordError::Decode(e.to_string()))?;

    let payload = envelope.payload.unwrap_or_default();
    let op = Op::from_code(payload.op.as_deref().unwrap_or_default());

    Ok(Decoded::Event(ChangeEvent::new(
        op,
        payload.before.map(Document::from),
        payload.after.map(Document::from),
    )))
}
