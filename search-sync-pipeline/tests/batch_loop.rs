//! End-to-end batch loop tests against an in-memory log and search index.

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Value};
use tokio::sync::Mutex;

use search_sync_pipeline::consumer::{LogClient, LogRecord};
use search_sync_pipeline::loader::SearchLoader;
use search_sync_pipeline::orchestrator::{
    BatchReport, Orchestrator, OrchestratorConfig, ShutdownHandle,
};
use search_sync_pipeline::processor::DocumentExtractor;
use search_sync_pipeline::PipelineError;
use search_sync_repository::{SearchEngineClient, SearchError};
use search_sync_shared::{Document, IndexName};

/// Log that hands out scripted fetch results, then cancels the orchestrator.
#[derive(Default)]
struct LogState {
    fetches: Mutex<VecDeque<Result<Vec<LogRecord>, PipelineError>>>,
    commits: Mutex<Vec<Vec<LogRecord>>>,
    fetch_count: Mutex<usize>,
    flushes: Mutex<usize>,
    shutdown: Mutex<Option<ShutdownHandle>>,
}

struct ScriptedLog(Arc<LogState>);

#[async_trait]
impl LogClient for ScriptedLog {
    async fn fetch(&self) -> Result<Vec<LogRecord>, PipelineError> {
        *self.0.fetch_count.lock().await += 1;
        let next = self.0.fetches.lock().await.pop_front();
        match next {
            Some(result) => result,
            None => {
                if let Some(handle) = self.0.shutdown.lock().await.as_ref() {
                    handle.shutdown();
                }
                std::future::pending().await
            }
        }
    }

    async fn commit(&self, records: &[LogRecord]) -> Result<(), PipelineError> {
        self.0.commits.lock().await.push(records.to_vec());
        Ok(())
    }

    async fn flush(&self) -> Result<(), PipelineError> {
        *self.0.flushes.lock().await += 1;
        Ok(())
    }
}

/// Log whose fetch fails at the same moment cancellation is requested.
struct FailsWhileCancelling(Arc<LogState>);

#[async_trait]
impl LogClient for FailsWhileCancelling {
    async fn fetch(&self) -> Result<Vec<LogRecord>, PipelineError> {
        *self.0.fetch_count.lock().await += 1;
        if let Some(handle) = self.0.shutdown.lock().await.as_ref() {
            handle.shutdown();
        }
        Err(PipelineError::kafka("broker down"))
    }

    async fn commit(&self, records: &[LogRecord]) -> Result<(), PipelineError> {
        self.0.commits.lock().await.push(records.to_vec());
        Ok(())
    }
}

/// Search index with upsert-replaces and delete-if-present semantics.
#[derive(Default)]
struct MemoryIndex {
    docs: Mutex<BTreeMap<(String, String), Document>>,
    upsert_calls: Mutex<usize>,
    delete_calls: Mutex<Vec<(String, String)>>,
    reject_ids: HashSet<String>,
}

impl MemoryIndex {
    fn rejecting(ids: &[&str]) -> Self {
        Self {
            reject_ids: ids.iter().map(|s| s.to_string()).collect(),
            ..Self::default()
        }
    }

    async fn snapshot(&self) -> BTreeMap<(String, String), Document> {
        self.docs.lock().await.clone()
    }
}

#[async_trait]
impl SearchEngineClient for MemoryIndex {
    async fn upsert_documents(
        &self,
        index: &IndexName,
        documents: &[Document],
    ) -> Result<(), SearchError> {
        *self.upsert_calls.lock().await += 1;
        let mut docs = self.docs.lock().await;
        for doc in documents {
            let id = doc.id();
            if self.reject_ids.contains(&id) {
                return Err(SearchError::index(format!("rejected {}", id)));
            }
            docs.insert((index.to_string(), id), doc.clone());
        }
        Ok(())
    }

    async fn delete_document(&self, index: &IndexName, id: &str) -> Result<(), SearchError> {
        self.delete_calls
            .lock()
            .await
            .push((index.to_string(), id.to_string()));
        self.docs
            .lock()
            .await
            .remove(&(index.to_string(), id.to_string()));
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        Ok(true)
    }
}

fn envelope(op: &str, before: Value, after: Value) -> Option<Vec<u8>> {
    Some(
        json!({"payload": {"before": before, "after": after, "op": op}})
            .to_string()
            .into_bytes(),
    )
}

fn create(id: &str, title: &str) -> Option<Vec<u8>> {
    envelope(
        "c",
        Value::Null,
        json!({"id": id, "title": title, "app_name": "acme", "collection": "docs"}),
    )
}

fn records(values: Vec<Option<Vec<u8>>>) -> Vec<LogRecord> {
    values
        .into_iter()
        .enumerate()
        .map(|(i, value)| LogRecord::new("app.public.documents", 0, i as i64, value))
        .collect()
}

fn key(index: &str, id: &str) -> (String, String) {
    (index.to_string(), id.to_string())
}

fn doc(value: Value) -> Document {
    Document::try_from(value).unwrap()
}

struct Harness {
    log: Arc<LogState>,
    index: Arc<MemoryIndex>,
    orchestrator: Orchestrator,
}

impl Harness {
    async fn new(index: MemoryIndex, fetches: Vec<Result<Vec<LogRecord>, PipelineError>>) -> Self {
        let log = Arc::new(LogState::default());
        log.fetches.lock().await.extend(fetches);

        let index = Arc::new(index);
        let orchestrator = Orchestrator::with_config(
            Box::new(ScriptedLog(log.clone())),
            DocumentExtractor::new(),
            SearchLoader::new(index.clone()),
            OrchestratorConfig {
                fetch_error_backoff_ms: 0,
            },
        );
        *log.shutdown.lock().await = Some(orchestrator.shutdown_handle());

        Self {
            log,
            index,
            orchestrator,
        }
    }

    async fn run_to_cancel(&self) {
        let result = self.orchestrator.run().await;
        assert!(matches!(result, Err(PipelineError::Cancelled)));
        assert_eq!(*self.log.flushes.lock().await, 1);
    }
}

#[tokio::test]
async fn test_string_wrapped_payload_is_upserted() {
    let value = br#"{"payload":{"after":{"payload":"{\"id\":\"42\",\"title\":\"x\"}","app_name":"acme","collection":"docs"},"op":"c"}}"#;
    let batch = vec![LogRecord::new("t", 0, 0, Some(value.to_vec()))];
    let h = Harness::new(MemoryIndex::default(), vec![Ok(batch)]).await;

    h.run_to_cancel().await;

    let docs = h.index.snapshot().await;
    assert_eq!(docs.len(), 1);
    assert_eq!(
        docs[&key("acme_docs", "42")],
        doc(json!({"id": "42", "title": "x"}))
    );
}

#[tokio::test]
async fn test_unroutable_delete_is_skipped_but_committed() {
    let batch = records(vec![Some(br#"{"payload":{"before":{"id":"7"},"op":"d"}}"#.to_vec())]);
    let h = Harness::new(MemoryIndex::default(), vec![Ok(batch.clone())]).await;

    h.run_to_cancel().await;

    assert!(h.index.delete_calls.lock().await.is_empty());
    assert_eq!(*h.index.upsert_calls.lock().await, 0);
    assert_eq!(*h.log.commits.lock().await, vec![batch]);
}

#[tokio::test]
async fn test_malformed_record_does_not_abort_batch() {
    let mut values: Vec<Option<Vec<u8>>> = (0..9)
        .map(|i| create(&i.to_string(), "ok"))
        .collect();
    values.insert(4, Some(b"{this is not json".to_vec()));
    let batch = records(values);

    let h = Harness::new(MemoryIndex::default(), vec![]).await;
    let report = h.orchestrator.process_batch(&batch).await;

    assert_eq!(
        report,
        BatchReport {
            fetched: 10,
            skipped_empty: 0,
            applied: 9,
            failed: 1,
        }
    );
    assert_eq!(h.index.snapshot().await.len(), 9);
}

#[tokio::test]
async fn test_whole_batch_committed_as_one_unit() {
    let mut values: Vec<Option<Vec<u8>>> = (0..9)
        .map(|i| create(&i.to_string(), "ok"))
        .collect();
    values.insert(0, Some(b"not json".to_vec()));
    let batch = records(values);

    let h = Harness::new(MemoryIndex::default(), vec![Ok(batch.clone())]).await;
    h.run_to_cancel().await;

    let commits = h.log.commits.lock().await;
    assert_eq!(commits.len(), 1);
    assert_eq!(commits[0].len(), 10);
    assert_eq!(commits[0], batch);
    assert_eq!(h.index.snapshot().await.len(), 9);
}

#[tokio::test]
async fn test_replayed_batch_is_idempotent() {
    let batch = records(vec![
        create("1", "first"),
        envelope(
            "u",
            Value::Null,
            json!({"id": "1", "title": "second", "app_name": "acme", "collection": "docs"}),
        ),
        create("2", "other"),
    ]);

    let once = Harness::new(MemoryIndex::default(), vec![Ok(batch.clone())]).await;
    once.run_to_cancel().await;

    let twice = Harness::new(
        MemoryIndex::default(),
        vec![Ok(batch.clone()), Ok(batch)],
    )
    .await;
    twice.run_to_cancel().await;

    assert_eq!(once.index.snapshot().await, twice.index.snapshot().await);
    assert_eq!(
        twice.index.snapshot().await[&key("acme_docs", "1")],
        doc(json!({"id": "1", "title": "second"}))
    );
}

#[tokio::test]
async fn test_soft_delete_flag_removes_document() {
    for flag in [json!(true), json!("true"), json!("1")] {
        let batch = records(vec![
            create("9", "live"),
            envelope(
                "u",
                Value::Null,
                json!({
                    "id": "9",
                    "title": "changed",
                    "is_delete": flag,
                    "app_name": "acme",
                    "collection": "docs"
                }),
            ),
        ]);
        let h = Harness::new(MemoryIndex::default(), vec![Ok(batch)]).await;

        h.run_to_cancel().await;

        assert!(h.index.snapshot().await.is_empty());
        assert_eq!(*h.index.upsert_calls.lock().await, 1);
        assert_eq!(
            *h.index.delete_calls.lock().await,
            vec![key("acme_docs", "9")]
        );
    }
}

#[tokio::test]
async fn test_hard_delete_with_routing_fields() {
    let batch = records(vec![
        create("3", "x"),
        envelope(
            "d",
            json!({"id": 3, "app_name": "acme", "collection": "docs"}),
            Value::Null,
        ),
    ]);
    let h = Harness::new(MemoryIndex::default(), vec![Ok(batch)]).await;

    h.run_to_cancel().await;

    assert!(h.index.snapshot().await.is_empty());
    assert_eq!(*h.index.delete_calls.lock().await, vec![key("acme_docs", "3")]);
}

#[tokio::test]
async fn test_records_applied_in_offset_order() {
    let delete = envelope(
        "d",
        json!({"id": "5", "app_name": "acme", "collection": "docs"}),
        Value::Null,
    );

    let h = Harness::new(MemoryIndex::default(), vec![]).await;
    h.orchestrator
        .process_batch(&records(vec![create("5", "x"), delete.clone()]))
        .await;
    assert!(h.index.snapshot().await.is_empty());

    let h = Harness::new(MemoryIndex::default(), vec![]).await;
    h.orchestrator
        .process_batch(&records(vec![delete, create("5", "x")]))
        .await;
    assert_eq!(h.index.snapshot().await.len(), 1);
}

#[tokio::test]
async fn test_apply_failure_is_logged_and_skipped_without_retry() {
    let batch = records(vec![create("1", "a"), create("bad", "b"), create("2", "c")]);
    let h = Harness::new(MemoryIndex::rejecting(&["bad"]), vec![Ok(batch.clone())]).await;

    h.run_to_cancel().await;

    let docs = h.index.snapshot().await;
    assert_eq!(docs.len(), 2);
    assert!(!docs.contains_key(&key("acme_docs", "bad")));
    // one attempt per record: the rejected write is dropped, not retried
    assert_eq!(*h.index.upsert_calls.lock().await, 3);
    assert_eq!(*h.log.commits.lock().await, vec![batch]);
}

#[tokio::test]
async fn test_tombstones_are_skipped_silently() {
    let batch = records(vec![None, Some(b"   ".to_vec()), Some(b"null".to_vec()), create("1", "x")]);
    let h = Harness::new(MemoryIndex::default(), vec![]).await;

    let report = h.orchestrator.process_batch(&batch).await;

    assert_eq!(report.skipped_empty, 3);
    assert_eq!(report.applied, 1);
    assert_eq!(report.failed, 0);
}

#[tokio::test]
async fn test_fetch_error_is_retried() {
    let batch = records(vec![create("1", "x")]);
    let h = Harness::new(
        MemoryIndex::default(),
        vec![Err(PipelineError::kafka("broker down")), Ok(batch)],
    )
    .await;

    h.run_to_cancel().await;

    assert_eq!(h.index.snapshot().await.len(), 1);
    assert_eq!(h.log.commits.lock().await.len(), 1);
    assert_eq!(*h.log.fetch_count.lock().await, 3);
}

#[tokio::test]
async fn test_cancel_before_run_skips_fetch() {
    let h = Harness::new(MemoryIndex::default(), vec![Ok(records(vec![create("1", "x")]))]).await;

    h.orchestrator.shutdown();
    h.run_to_cancel().await;

    assert_eq!(*h.log.fetch_count.lock().await, 0);
    assert!(h.log.commits.lock().await.is_empty());
}

#[tokio::test]
async fn test_fetch_error_during_cancellation_ends_loop() {
    let log = Arc::new(LogState::default());
    let orchestrator = Orchestrator::with_config(
        Box::new(FailsWhileCancelling(log.clone())),
        DocumentExtractor::new(),
        SearchLoader::new(Arc::new(MemoryIndex::default())),
        OrchestratorConfig {
            fetch_error_backoff_ms: 0,
        },
    );
    *log.shutdown.lock().await = Some(orchestrator.shutdown_handle());

    let result = orchestrator.run().await;

    assert!(matches!(result, Err(PipelineError::Cancelled)));
    assert_eq!(*log.fetch_count.lock().await, 1);
    assert!(log.commits.lock().await.is_empty());
}
