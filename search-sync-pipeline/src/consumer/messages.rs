//! Log records and the log client contract.

use std::collections::BTreeMap;

use async_trait::async_trait;

use crate::errors::PipelineError;

/// One record pulled from the log.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LogRecord {
    /// Topic the record was read from.
    pub topic: String,
    /// Partition within the topic.
    pub partition: i32,
    /// Offset within the partition.
    pub offset: i64,
    /// Raw record value; `None` for tombstones.
    pub value: Option<Vec<u8>>,
}

impl LogRecord {
    /// Create a new log record.
    pub fn new(
        topic: impl Into<String>,
        partition: i32,
        offset: i64,
        value: Option<Vec<u8>>,
    ) -> Self {
        Self {
            topic: topic.into(),
            partition,
            offset,
            value,
        }
    }
}

/// The operations the batch loop needs from a partitioned, offset-addressable log.
///
/// Partition assignment, rebalancing, prefetching and offset storage are the
/// implementation's concern.
#[async_trait]
pub trait LogClient: Send + Sync {
    /// Wait until at least one record is available and return a batch.
    ///
    /// Records from the same partition are returned in offset order.
    async fn fetch(&self) -> Result<Vec<LogRecord>, PipelineError>;

    /// Mark every record in `records` as processed, as one unit.
    async fn commit(&self, records: &[LogRecord]) -> Result<(), PipelineError>;

    /// Make earlier commits durable before the client is dropped.
    async fn flush(&self) -> Result<(), PipelineError> {
        Ok(())
    }
}

/// Offsets to commit for a batch: per topic/partition, the highest offset + 1.
pub fn commit_offsets(records: &[LogRecord]) -> Vec<(String, i32, i64)> {
    let mut latest: BTreeMap<(&str, i32), i64> = BTreeMap::new();

    for record in records {
        let entry = latest
            .entry((record.topic.as_str(), record.partition))
            .or_insert(record.offset);
        *entry = (*entry).max(record.offset);
    }

    latest
        .into_iter()
        .map(|((topic, partition), offset)| (topic.to_string(), partition, offset + 1))
        .collect()
}
