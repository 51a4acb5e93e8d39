//! # Search Sync Pipeline
//!
//! This crate provides the pipeline components for consuming row-level
//! change events from Kafka and applying them to a multi-tenant search index.
//!
//! ## Architecture
//!
//! Each record flows through the stages in order, within one batch:
//!
//! 1. **Decoder**: Parses the change envelope into a `ChangeEvent`
//! 2. **Processor**: Extracts the document and primary key
//! 3. **Router**: Derives the index name from `app_name` and `collection`
//! 4. **Loader**: Upserts or deletes by id in the search index
//! 5. **Orchestrator**: Fetches batches, drives records, commits offsets
//!
//! Delivery is at-least-once; correctness rests on idempotent writes.

pub mod consumer;
pub mod decoder;
pub mod errors;
pub mod loader;
pub mod orchestrator;
pub mod processor;
pub mod router;

pub use errors::{PipelineError, RecordError};
