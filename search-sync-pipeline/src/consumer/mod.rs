//! Consumer module for the search sync pipeline.
//!
//! Provides the log client abstraction and its Kafka implementation.

mod kafka_consumer;
mod messages;

pub use kafka_consumer::{ConsumerConfig, KafkaConsumer};
pub use messages::{commit_offsets, LogClient, LogRecord};
