//! Loader module for the search sync pipeline.
//!
//! Decides between upsert, soft-delete and hard-delete for an extracted
//! record and issues the single corresponding write to the search index.
//!
//! | op        | `is_delete` | action                                      |
//! |-----------|-------------|---------------------------------------------|
//! | c / r / u | false       | strip metadata, upsert document by `id`     |
//! | c / r / u | true        | delete-by-id (soft delete removes the doc)  |
//! | d         | n/a         | delete-by-id from the before-image          |

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

use crate::errors::RecordError;
use crate::processor::ExtractedRecord;
use search_sync_repository::{SearchEngineClient, SearchError};
use search_sync_shared::{Document, IndexName, Op};

/// Configuration for the search loader.
///
/// With the default `max_retries = 0` a failed write is attempted exactly
/// once and the record is dropped; redelivery is left to the log.
#[derive(Debug, Clone)]
pub struct LoaderConfig {
    /// Maximum number of retry attempts for transient failures.
    pub max_retries: u32,
    /// Initial retry delay in milliseconds.
    pub initial_retry_delay_ms: u64,
    /// Maximum retry delay in milliseconds.
    pub max_retry_delay_ms: u64,
}

impl Default for LoaderConfig {
    fn default() -> Self {
        Self {
            max_retries: 0,
            initial_retry_delay_ms: 100,
            max_retry_delay_ms: 5000,
        }
    }
}

/// Why a delete is issued.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteReason {
    /// Soft-delete flag set on a create/read/update.
    Flag,
    /// Row removed in the source database.
    Row,
}

/// The write to perform for one record.
#[derive(Debug, Clone, PartialEq)]
pub enum ApplyAction {
    /// Insert or replace the document (metadata already stripped).
    Upsert { document: Document },
    /// Remove the document with this id.
    Delete { id: String, reason: DeleteReason },
}

impl ApplyAction {
    /// Decide the write for an extracted record.
    pub fn plan(record: ExtractedRecord) -> Result<Self, RecordError> {
        let ExtractedRecord {
            op,
            mut document,
            primary_key,
        } = record;

        match op {
            Op::Create | Op::Read | Op::Update => {
                if document.is_soft_deleted() {
                    Ok(Self::Delete {
                        id: primary_key,
                        reason: DeleteReason::Flag,
                    })
                } else {
                    document.strip_metadata();
                    Ok(Self::Upsert { document })
                }
            }
            Op::Delete => Ok(Self::Delete {
                id: primary_key,
                reason: DeleteReason::Row,
            }),
            Op::Unknown(code) => Err(RecordError::UnknownOp(code)),
        }
    }

    /// Id of the document this action touches.
    pub fn id(&self) -> String {
        match self {
            Self::Upsert { document } => document.id(),
            Self::Delete { id, .. } => id.clone(),
        }
    }

    /// Short label for logs.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Upsert { .. } => "upsert",
            Self::Delete {
                reason: DeleteReason::Flag,
                ..
            } => "delete-by-flag",
            Self::Delete {
                reason: DeleteReason::Row,
                ..
            } => "delete",
        }
    }
}

/// Loader that applies actions to the search engine.
///
/// Upserts replace by id and deletes of absent ids succeed, so replaying a
/// record leaves the index unchanged.
pub struct SearchLoader {
    client: Arc<dyn SearchEngineClient>,
    config: LoaderConfig,
}

impl SearchLoader {
    /// Create a new search loader with the given client.
    pub fn new(client: Arc<dyn SearchEngineClient>) -> Self {
        Self {
            client,
            config: LoaderConfig::default(),
        }
    }

    /// Create a new search loader with custom configuration.
    pub fn with_config(client: Arc<dyn SearchEngineClient>, config: LoaderConfig) -> Self {
        Self { client, config }
    }

    /// Apply one action to `index`. Exactly one logical write, possibly retried.
    #[instrument(skip(self, action), fields(index = %index, action = action.label()))]
    pub async fn apply(&self, index: &IndexName, action: &ApplyAction) -> Result<(), SearchError> {
        match action {
            ApplyAction::Upsert { document } => {
                let documents = std::slice::from_ref(document);
                let client = self.client.as_ref();
                self.with_retry(move || client.upsert_documents(index, documents))
                    .await?;
            }
            ApplyAction::Delete { id, .. } => {
                let client = self.client.as_ref();
                let id = id.as_str();
                self.with_retry(move || client.delete_document(index, id))
                    .await?;
            }
        }

        info!(index = %index, id = %action.id(), "[{}] applied", action.label());
        Ok(())
    }

    /// Check if the search engine is healthy.
    pub async fn health_check(&self) -> Result<bool, SearchError> {
        self.client.health_check().await
    }

    /// Run a write with exponential backoff on transient errors.
    async fn with_retry<F, Fut>(&self, mut write: F) -> Result<(), SearchError>
    where
        F: FnMut() -> Fut,
        Fut: Future<Output = Result<(), SearchError>>,
    {
        let mut delay_ms = self.config.initial_retry_delay_ms;
        let mut attempt = 0;

        loop {
            match write().await {
                Ok(()) => {
                    if attempt > 0 {
                        info!(attempt = attempt, "Write succeeded after retry");
                    }
                    return Ok(());
                }
                Err(e) => {
                    if attempt >= self.config.max_retries || !Self::is_retryable_error(&e) {
                        if attempt > 0 {
                            debug!(attempt = attempt, error = %e, "Giving up on write");
                        }
                        return Err(e);
                    }

                    attempt += 1;
                    warn!(
                        attempt = attempt,
                        max_retries = self.config.max_retries,
                        delay_ms = delay_ms,
                        error = %e,
                        "Write failed, retrying"
                    );

                    tokio::time::sleep(Duration::from_millis(delay_ms)).await;
                    delay_ms = std::cmp::min(delay_ms * 2, self.config.max_retry_delay_ms);
                }
            }
        }
    }

    /// Determine if an error is retryable (transient failures).
    fn is_retryable_error(error: &SearchError) -> bool {
        match error {
            SearchError::ConnectionError(_) => true,
            SearchError::ParseError(_) => true,
            SearchError::IndexError(msg)
            | SearchError::BulkIndexError(msg)
            | SearchError::DeleteError(msg) => {
                let msg_lower = msg.to_lowercase();
                msg_lower.contains("rate limit")
                    || msg_lower.contains("timeout")
                    || msg_lower.contains("connection")
                    || msg_lower.contains("503")
                    || msg_lower.contains("429")
            }
            SearchError::ValidationError(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use serde_json::{json, Value};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tokio::sync::Mutex;

    /// Mock search client for testing.
    struct MockSearchClient {
        upserts: Mutex<Vec<(String, Document)>>,
        deletes: Mutex<Vec<(String, String)>>,
        calls: AtomicUsize,
        failures_left: AtomicUsize,
        failure: SearchError,
    }

    impl MockSearchClient {
        fn new() -> Self {
            Self::failing(0, SearchError::connection("refused"))
        }

        fn failing(times: usize, failure: SearchError) -> Self {
            Self {
                upserts: Mutex::new(Vec::new()),
                deletes: Mutex::new(Vec::new()),
                calls: AtomicUsize::new(0),
                failures_left: AtomicUsize::new(times),
                failure,
            }
        }

        fn maybe_fail(&self) -> Result<(), SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            let left = self.failures_left.load(Ordering::SeqCst);
            if left > 0 {
                self.failures_left.store(left - 1, Ordering::SeqCst);
                return Err(self.failure.clone());
            }
            Ok(())
        }
    }

    #[async_trait]
    impl SearchEngineClient for MockSearchClient {
        async fn upsert_documents(
            &self,
            index: &IndexName,
            documents: &[Document],
        ) -> Result<(), SearchError> {
            self.maybe_fail()?;
            let mut upserts = self.upserts.lock().await;
            for doc in documents {
                upserts.push((index.to_string(), doc.clone()));
            }
            Ok(())
        }

        async fn delete_document(&self, index: &IndexName, id: &str) -> Result<(), SearchError> {
            self.maybe_fail()?;
            self.deletes
                .lock()
                .await
                .push((index.to_string(), id.to_string()));
            Ok(())
        }

        async fn health_check(&self) -> Result<bool, SearchError> {
            Ok(true)
        }
    }

    fn record(op: Op, document: Value) -> ExtractedRecord {
        let document = Document::try_from(document).unwrap();
        let primary_key = document.id();
        ExtractedRecord {
            op,
            document,
            primary_key,
        }
    }

    fn index() -> IndexName {
        search_sync_shared::RoutingKey::new("acme", "docs")
            .index_name()
            .unwrap()
    }

    #[test]
    fn test_plan_upsert_strips_metadata() {
        let action = ApplyAction::plan(record(
            Op::Create,
            json!({"id": "1", "title": "x", "app_name": "acme", "collection": "docs", "is_delete": false}),
        ))
        .unwrap();

        assert_eq!(
            action,
            ApplyAction::Upsert {
                document: Document::try_from(json!({"id": "1", "title": "x"})).unwrap()
            }
        );
    }

    #[test]
    fn test_plan_soft_delete_wins_over_body() {
        for flag in [json!(true), json!("true"), json!("1"), json!(1)] {
            for op in [Op::Create, Op::Read, Op::Update] {
                let action = ApplyAction::plan(record(
                    op,
                    json!({"id": "9", "title": "still here", "is_delete": flag}),
                ))
                .unwrap();

                assert_eq!(
                    action,
                    ApplyAction::Delete {
                        id: "9".to_string(),
                        reason: DeleteReason::Flag
                    }
                );
            }
        }
    }

    #[test]
    fn test_plan_hard_delete() {
        let action = ApplyAction::plan(record(Op::Delete, json!({"id": "7", "is_delete": false})))
            .unwrap();

        assert_eq!(action.label(), "delete");
        assert_eq!(action.id(), "7");
    }

    #[test]
    fn test_plan_unknown_op() {
        let result = ApplyAction::plan(record(Op::Unknown("x".into()), json!({"id": "1"})));
        assert!(matches!(result, Err(RecordError::UnknownOp(_))));
    }

    #[tokio::test]
    async fn test_apply_upsert_and_delete() {
        let client = Arc::new(MockSearchClient::new());
        let loader = SearchLoader::new(client.clone());
        let index = index();

        let upsert = ApplyAction::plan(record(Op::Create, json!({"id": "1", "title": "x"}))).unwrap();
        loader.apply(&index, &upsert).await.unwrap();

        let delete = ApplyAction::plan(record(Op::Delete, json!({"id": "1"}))).unwrap();
        loader.apply(&index, &delete).await.unwrap();

        let upserts = client.upserts.lock().await;
        assert_eq!(upserts.len(), 1);
        assert_eq!(upserts[0].0, "acme_docs");
        assert_eq!(upserts[0].1.id(), "1");

        let deletes = client.deletes.lock().await;
        assert_eq!(*deletes, vec![("acme_docs".to_string(), "1".to_string())]);
    }

    #[tokio::test]
    async fn test_default_config_does_not_retry() {
        // A failed write is logged and dropped after one attempt unless retries are configured
        let client = Arc::new(MockSearchClient::failing(1, SearchError::connection("refused")));
        let loader = SearchLoader::new(client.clone());

        let action = ApplyAction::plan(record(Op::Update, json!({"id": "1"}))).unwrap();
        let result = loader.apply(&index(), &action).await;

        assert!(result.is_err());
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
        assert!(client.upserts.lock().await.is_empty());
    }

    #[tokio::test(start_paused = true)]
    async fn test_bounded_retry_on_transient_error() {
        let client = Arc::new(MockSearchClient::failing(2, SearchError::connection("refused")));
        let config = LoaderConfig {
            max_retries: 3,
            ..LoaderConfig::default()
        };
        let loader = SearchLoader::with_config(client.clone(), config);

        let action = ApplyAction::plan(record(Op::Update, json!({"id": "1"}))).unwrap();
        loader.apply(&index(), &action).await.unwrap();

        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
        assert_eq!(client.upserts.lock().await.len(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_gives_up_after_max_retries() {
        let client = Arc::new(MockSearchClient::failing(10, SearchError::index("503 unavailable")));
        let config = LoaderConfig {
            max_retries: 2,
            ..LoaderConfig::default()
        };
        let loader = SearchLoader::with_config(client.clone(), config);

        let action = ApplyAction::plan(record(Op::Delete, json!({"id": "1"}))).unwrap();
        assert!(loader.apply(&index(), &action).await.is_err());
        assert_eq!(client.calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_non_retryable_error_fails_fast() {
        let client = Arc::new(MockSearchClient::failing(
            1,
            SearchError::bulk_index("1: mapper_parsing_exception"),
        ));
        let config = LoaderConfig {
            max_retries: 5,
            ..LoaderConfig::default()
        };
        let loader = SearchLoader::with_config(client.clone(), config);

        let action = ApplyAction::plan(record(Op::Create, json!({"id": "1"}))).unwrap();
        assert!(loader.apply(&index(), &action).await.is_err());
        assert_eq!(client.calls.load(Ordering::SeqCst), 1);
    }
}
