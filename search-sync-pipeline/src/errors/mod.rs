//! Error types for the search sync pipeline.
//!
//! Two levels of failure are kept apart:
//!
//! - [`PipelineError`]: batch-level (fetch, commit, cancellation).
//! - [`RecordError`]: one log record could not be decoded, extracted,
//!   routed or applied. Always logged and skipped, never fatal.

use search_sync_repository::SearchError;
use search_sync_shared::IndexName;
use thiserror::Error;

/// Errors that can occur at the batch level of the pipeline.
#[derive(Error, Debug)]
pub enum PipelineError {
    /// Kafka-related error.
    #[error("Kafka error: {0}")]
    KafkaError(String),

    /// The pipeline was cancelled.
    #[error("Pipeline cancelled")]
    Cancelled,
}

impl PipelineError {
    /// Create a Kafka error.
    pub fn kafka(msg: impl Into<String>) -> Self {
        Self::KafkaError(msg.into())
    }
}

impl From<rdkafka::error::KafkaError> for PipelineError {
    fn from(err: rdkafka::error::KafkaError) -> Self {
        Self::KafkaError(err.to_string())
    }
}

/// Why a single record was skipped.
#[derive(Error, Debug)]
pub enum RecordError {
    /// The record value is not a valid change envelope.
    #[error("decode change event: {0}")]
    Decode(String),

    /// A create/read/update event without an after-image.
    #[error("after payload missing")]
    AfterMissing,

    /// The after-image's string `payload` is not a JSON object.
    #[error("decode inner payload string: {0}")]
    InnerPayload(String),

    /// No primary key in either the document or the after-image.
    #[error("empty id in upsert document")]
    EmptyUpsertId,

    /// A delete event without a before-image.
    #[error("delete without before payload")]
    DeleteWithoutBefore,

    /// A delete event whose before-image has no id.
    #[error("empty id in delete payload")]
    EmptyDeleteId,

    /// Operation code outside `c`/`r`/`u`/`d`.
    #[error("unknown op {0:?}")]
    UnknownOp(String),

    /// `app_name` or `collection` is empty.
    #[error("app_name or collection is empty (app_name={app_name:?}, collection={collection:?}, doc={document})")]
    Unroutable {
        app_name: String,
        collection: String,
        document: String,
    },

    /// The search engine rejected the write.
    #[error("apply to index {index} failed for id {id}: {source}")]
    Apply {
        index: IndexName,
        id: String,
        #[source]
        source: SearchError,
    },
}

impl RecordError {
    /// Pipeline stage that produced the error, for log context.
    pub fn stage(&self) -> &'static str {
        match self {
            Self::Decode(_) => "decode",
            Self::AfterMissing
            | Self::InnerPayload(_)
            | Self::EmptyUpsertId
            | Self::DeleteWithoutBefore
            | Self::EmptyDeleteId
            | Self::UnknownOp(_) => "extract",
            Self::Unroutable { .. } => "route",
            Self::Apply { .. } => "apply",
        }
    }
}
