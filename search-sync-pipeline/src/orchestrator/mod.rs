//! Orchestrator module for the search sync pipeline.
//!
//! Runs the batch loop: fetch a batch from the log, drive every record
//! through decode, extract, route and apply, then commit the whole batch.
//!
//! ```text
//! Idle -> Fetching -> Processing(0..n) -> Committing -> Idle
//!   \________\______________\________________\______-> Cancelled
//! ```
//!
//! A failing record never aborts the batch, and every fetched offset is
//! committed once all records have been attempted. Cancellation is checked
//! before each fetch and races the fetch itself; it is not checked while a
//! batch is being processed. On the way out the log client flushes its
//! last commit.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument, warn};

use crate::consumer::{LogClient, LogRecord};
use crate::decoder::{decode, Decoded};
use crate::errors::{PipelineError, RecordError};
use crate::loader::{ApplyAction, SearchLoader};
use crate::processor::DocumentExtractor;
use crate::router;

/// Configuration for the orchestrator.
#[derive(Debug, Clone)]
pub struct OrchestratorConfig {
    /// Pause after a failed fetch before fetching again (in milliseconds).
    pub fetch_error_backoff_ms: u64,
}

impl Default for OrchestratorConfig {
    fn default() -> Self {
        Self {
            fetch_error_backoff_ms: 500,
        }
    }
}

/// Outcome counts for one batch.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct BatchReport {
    /// Records returned by the fetch.
    pub fetched: usize,
    /// Empty or null payloads ignored silently.
    pub skipped_empty: usize,
    /// Records whose write reached the search index.
    pub applied: usize,
    /// Records skipped because a stage failed.
    pub failed: usize,
}

/// Handle that cancels a running orchestrator.
#[derive(Debug, Clone)]
pub struct ShutdownHandle(Arc<watch::Sender<bool>>);

impl ShutdownHandle {
    /// Request cancellation. The loop exits before its next fetch.
    pub fn shutdown(&self) {
        self.0.send_replace(true);
    }
}

/// Orchestrator that coordinates the pipeline components.
///
/// A single sequential worker: one batch at a time, one record at a time.
pub struct Orchestrator {
    consumer: Box<dyn LogClient>,
    extractor: DocumentExtractor,
    loader: SearchLoader,
    config: OrchestratorConfig,
    shutdown_tx: Arc<watch::Sender<bool>>,
}

impl Orchestrator {
    /// Create a new orchestrator with the given components.
    pub fn new(
        consumer: Box<dyn LogClient>,
        extractor: DocumentExtractor,
        loader: SearchLoader,
    ) -> Self {
        Self::with_config(consumer, extractor, loader, OrchestratorConfig::default())
    }

    /// Create a new orchestrator with custom configuration.
    pub fn with_config(
        consumer: Box<dyn LogClient>,
        extractor: DocumentExtractor,
        loader: SearchLoader,
        config: OrchestratorConfig,
    ) -> Self {
        let (shutdown_tx, _) = watch::channel(false);

        Self {
            consumer,
            extractor,
            loader,
            config,
            shutdown_tx: Arc::new(shutdown_tx),
        }
    }

    /// A handle that can cancel [`Orchestrator::run`] from another task.
    pub fn shutdown_handle(&self) -> ShutdownHandle {
        ShutdownHandle(self.shutdown_tx.clone())
    }

    /// Trigger a graceful shutdown.
    pub fn shutdown(&self) {
        self.shutdown_tx.send_replace(true);
    }

    /// Run the batch loop until cancelled.
    ///
    /// Only cancellation ends the loop; it is returned as
    /// [`PipelineError::Cancelled`] after the log client has flushed its
    /// last commit.
    #[instrument(skip(self))]
    pub async fn run(&self) -> Result<(), PipelineError> {
        info!("Starting search sync orchestrator");

        let result = self.run_batches().await;

        if let Err(e) = self.consumer.flush().await {
            error!(error = %e, "Failed to flush offsets on shutdown");
        }

        result
    }

    async fn run_batches(&self) -> Result<(), PipelineError> {
        let mut shutdown_rx = self.shutdown_tx.subscribe();

        loop {
            if *shutdown_rx.borrow() {
                info!("Orchestrator cancelled");
                return Err(PipelineError::Cancelled);
            }

            let fetched = tokio::select! {
                biased;
                _ = shutdown_rx.changed() => continue,
                result = self.consumer.fetch() => result,
            };

            let records = match fetched {
                Ok(records) => records,
                Err(e) => {
                    if *shutdown_rx.borrow() {
                        info!("Orchestrator cancelled during fetch");
                        return Err(PipelineError::Cancelled);
                    }
                    error!(error = %e, "Fetch failed");
                    tokio::select! {
                        _ = shutdown_rx.changed() => {}
                        _ = tokio::time::sleep(Duration::from_millis(self.config.fetch_error_backoff_ms)) => {}
                    }
                    continue;
                }
            };

            if records.is_empty() {
                continue;
            }

            let report = self.process_batch(&records).await;
            self.commit(&records).await;

            info!(
                fetched = report.fetched,
                applied = report.applied,
                failed = report.failed,
                skipped_empty = report.skipped_empty,
                "Batch committed"
            );
        }
    }

    /// Attempt every record of a batch, in order. Never fails.
    #[instrument(skip(self, records), fields(record_count = records.len()))]
    pub async fn process_batch(&self, records: &[LogRecord]) -> BatchReport {
        let mut report = BatchReport {
            fetched: records.len(),
            ..BatchReport::default()
        };

        for record in records {
            match self.process_record(record).await {
                Ok(true) => report.applied += 1,
                Ok(false) => report.skipped_empty += 1,
                Err(e) => {
                    report.failed += 1;
                    Self::log_record_error(record, &e);
                }
            }
        }

        debug!(?report, "Processed batch");
        report
    }

    /// Commit the batch's offsets as one unit. A failed commit means redelivery, not data loss.
    async fn commit(&self, records: &[LogRecord]) {
        if let Err(e) = self.consumer.commit(records).await {
            error!(error = %e, record_count = records.len(), "Failed to commit offsets");
        }
    }

    /// Drive one record through the pipeline.
    ///
    /// Returns `Ok(false)` for empty payloads and `Ok(true)` once the write applied.
    async fn process_record(&self, record: &LogRecord) -> Result<bool, RecordError> {
        let event = match decode(record.value.as_deref())? {
            Decoded::Skip => return Ok(false),
            Decoded::Event(event) => event,
        };

        let extracted = self.extractor.extract(event)?;

        debug!(
            topic = %record.topic,
            partition = record.partition,
            offset = record.offset,
            op = %extracted.op,
            id = %extracted.primary_key,
            "Received change event"
        );

        let index = router::route(&extracted.document)?;
        let action = ApplyAction::plan(extracted)?;

        match self.loader.apply(&index, &action).await {
            Ok(()) => Ok(true),
            Err(source) => Err(RecordError::Apply {
                id: action.id(),
                index,
                source,
            }),
        }
    }

    fn log_record_error(record: &LogRecord, err: &RecordError) {
        match err {
            RecordError::Unroutable {
                app_name,
                collection,
                document,
            } => warn!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                stage = err.stage(),
                app_name = %app_name,
                collection = %collection,
                doc = %document,
                "Skipping record: app_name or collection is empty"
            ),
            RecordError::Apply { index, id, source } => error!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                stage = err.stage(),
                index = %index,
                id = %id,
                error = %source,
                "Skipping record: search index write failed"
            ),
            _ => warn!(
                topic = %record.topic,
                partition = record.partition,
                offset = record.offset,
                stage = err.stage(),
                error = %err,
                "Skipping record"
            ),
        }
    }
}
