//! Kafka consumer implementation for the search sync service.
//!
//! Pulls change-event records from Kafka in batches and commits their
//! offsets only when the batch loop asks for it.

use std::collections::BTreeMap;
use std::time::Duration;

use async_trait::async_trait;
use rdkafka::{
    config::ClientConfig,
    consumer::{CommitMode, Consumer, StreamConsumer},
    message::{BorrowedMessage, Message},
    Offset, TopicPartitionList,
};
use tokio::sync::Mutex;
use tracing::{debug, info, instrument, warn};

use crate::consumer::messages::{commit_offsets, LogClient, LogRecord};
use crate::errors::PipelineError;

/// Batching configuration for the Kafka consumer.
#[derive(Debug, Clone)]
pub struct ConsumerConfig {
    /// Maximum number of records returned by one fetch.
    pub max_batch_size: usize,
    /// How long to keep filling a batch after the first record arrives (in milliseconds).
    pub fetch_linger_ms: u64,
}

impl Default for ConsumerConfig {
    fn default() -> Self {
        Self {
            max_batch_size: 500,
            fetch_linger_ms: 100,
        }
    }
}

/// Kafka consumer for change events.
pub struct KafkaConsumer {
    consumer: StreamConsumer,
    topics: Vec<String>,
    config: ConsumerConfig,
    /// Latest offset handed to an async commit, per topic/partition.
    committed: Mutex<BTreeMap<(String, i32), i64>>,
}

impl KafkaConsumer {
    /// Create a new Kafka consumer.
    ///
    /// Auto-commit is disabled: offsets only advance through [`LogClient::commit`].
    ///
    /// # Arguments
    ///
    /// * `brokers` - Kafka broker addresses (comma-separated)
    /// * `group_id` - Consumer group ID
    /// * `topics` - Topics carrying change events
    /// * `config` - Batching configuration
    ///
    /// # Returns
    ///
    /// * `Ok(KafkaConsumer)` - A new consumer instance
    /// * `Err(PipelineError)` - If consumer creation fails
    pub fn new(
        brokers: &str,
        group_id: &str,
        topics: Vec<String>,
        config: ConsumerConfig,
    ) -> Result<Self, PipelineError> {
        let consumer: StreamConsumer = ClientConfig::new()
            .set("bootstrap.servers", brokers)
            .set("group.id", group_id)
            .set("enable.auto.commit", "false")
            .set("auto.offset.reset", "earliest")
            .set("session.timeout.ms", "6000")
            .create()
            .map_err(|e| PipelineError::kafka(e.to_string()))?;

        info!(
            brokers = %brokers,
            group_id = %group_id,
            max_batch_size = config.max_batch_size,
            "Created Kafka consumer"
        );

        Ok(Self {
            consumer,
            topics,
            config,
            committed: Mutex::new(BTreeMap::new()),
        })
    }

    /// Subscribe to configured topics.
    pub fn subscribe(&self) -> Result<(), PipelineError> {
        let topics: Vec<&str> = self.topics.iter().map(|s| s.as_str()).collect();
        self.consumer
            .subscribe(&topics)
            .map_err(|e| PipelineError::kafka(e.to_string()))?;

        info!(topics = ?self.topics, "Subscribed to Kafka topics");
        Ok(())
    }

    fn partition_list<'a, I>(offsets: I) -> Result<TopicPartitionList, PipelineError>
    where
        I: IntoIterator<Item = (&'a str, i32, i64)>,
    {
        let mut tpl = TopicPartitionList::new();
        for (topic, partition, offset) in offsets {
            tpl.add_partition_offset(topic, partition, Offset::Offset(offset))?;
        }
        Ok(tpl)
    }

    fn to_record(msg: &BorrowedMessage<'_>) -> LogRecord {
        LogRecord::new(
            msg.topic(),
            msg.partition(),
            msg.offset(),
            msg.payload().map(<[u8]>::to_vec),
        )
    }
}

#[async_trait]
impl LogClient for KafkaConsumer {
    #[instrument(skip(self))]
    async fn fetch(&self) -> Result<Vec<LogRecord>, PipelineError> {
        let first = match self.consumer.recv().await {
            Ok(msg) => Self::to_record(&msg),
            Err(e) => return Err(PipelineError::from(e)),
        };

        let mut records = Vec::with_capacity(self.config.max_batch_size.max(1));
        records.push(first);

        let deadline =
            tokio::time::Instant::now() + Duration::from_millis(self.config.fetch_linger_ms);

        while records.len() < self.config.max_batch_size {
            match tokio::time::timeout_at(deadline, self.consumer.recv()).await {
                Ok(Ok(msg)) => records.push(Self::to_record(&msg)),
                Ok(Err(e)) => {
                    // Keep what we have; the next fetch surfaces a persistent error
                    warn!(error = %e, "Kafka error while filling batch");
                    break;
                }
                Err(_) => break,
            }
        }

        debug!(count = records.len(), "Fetched batch");
        Ok(records)
    }

    async fn commit(&self, records: &[LogRecord]) -> Result<(), PipelineError> {
        let offsets = commit_offsets(records);
        if offsets.is_empty() {
            return Ok(());
        }

        let tpl = Self::partition_list(
            offsets
                .iter()
                .map(|(topic, partition, offset)| (topic.as_str(), *partition, *offset)),
        )?;

        self.consumer.commit(&tpl, CommitMode::Async)?;

        let mut committed = self.committed.lock().await;
        for (topic, partition, offset) in offsets {
            committed.insert((topic, partition), offset);
        }

        debug!(partitions = committed.len(), "Committed offsets");
        Ok(())
    }

    /// Re-commit the latest offsets synchronously so a pending async commit survives exit.
    async fn flush(&self) -> Result<(), PipelineError> {
        let committed = self.committed.lock().await;
        if committed.is_empty() {
            return Ok(());
        }

        let tpl = Self::partition_list(
            committed
                .iter()
                .map(|((topic, partition), offset)| (topic.as_str(), *partition, *offset)),
        )?;

        self.consumer.commit(&tpl, CommitMode::Sync)?;

        info!(partitions = committed.len(), "Flushed offsets");
        Ok(())
    }
}
