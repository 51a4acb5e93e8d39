//! # Search Sync Shared
//!
//! Types shared by every stage of the change-data-capture sync service:
//! the schema-less [`Document`], the decoded [`ChangeEvent`], and the
//! routing types that name a destination index.

pub mod document;
pub mod event;
pub mod index;

pub use document::{canonical_string, Document, APP_NAME_FIELD, COLLECTION_FIELD, ID_FIELD, IS_DELETE_FIELD, METADATA_FIELDS};
pub use event::{ChangeEvent, Op};
pub use index::{IndexName, RoutingKey};

/// Re-exported so downstream crates build fixtures with the same value type.
pub use serde_json::{Map, Value};
