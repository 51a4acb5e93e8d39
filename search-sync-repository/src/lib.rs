//! # Search Sync Repository
//!
//! This crate provides the trait through which the sync pipeline writes to
//! the search engine, the errors it can return, and a concrete
//! implementation for OpenSearch.
//!
//! The pipeline only needs two idempotent writes: upsert-by-id and
//! delete-by-id. Indexes are created implicitly by the first upsert.

pub mod errors;
pub mod interfaces;
pub mod opensearch;

pub use errors::SearchError;
pub use interfaces::SearchEngineClient;
pub use opensearch::OpenSearchClient;
