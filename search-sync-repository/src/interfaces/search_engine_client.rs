//! Search engine client trait definition.
//!
//! This module defines the abstract interface for the two writes the sync
//! pipeline performs, allowing for different backend implementations
//! (OpenSearch, in-memory mocks in tests, etc.).

use async_trait::async_trait;

use crate::errors::SearchError;
use search_sync_shared::{Document, IndexName};

/// Abstract interface for search engine writes.
///
/// # Idempotency
///
/// Both writes must be safe to replay. Log records are delivered at least
/// once, so the same upsert or delete can arrive again after a restart:
///
/// - replaying an upsert leaves the same final document,
/// - deleting an id that is already absent succeeds.
///
/// # Thread Safety
///
/// All implementations must be `Send + Sync` to allow use across async tasks.
#[async_trait]
pub trait SearchEngineClient: Send + Sync {
    /// Insert or fully replace documents, keyed by their `id` field.
    ///
    /// The index is created implicitly if it does not exist.
    ///
    /// # Arguments
    ///
    /// * `index` - Destination index
    /// * `documents` - Documents to write; each must carry a non-empty `id`
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If every document was written
    /// * `Err(SearchError)` - If the request or any item failed
    async fn upsert_documents(
        &self,
        index: &IndexName,
        documents: &[Document],
    ) -> Result<(), SearchError>;

    /// Delete a document by id.
    ///
    /// # Returns
    ///
    /// * `Ok(())` - If the document was deleted (or didn't exist)
    /// * `Err(SearchError)` - If the deletion fails
    async fn delete_document(&self, index: &IndexName, id: &str) -> Result<(), SearchError>;

    /// Check if the search engine is healthy and reachable.
    ///
    /// # Returns
    ///
    /// * `Ok(true)` - If the search engine is healthy
    /// * `Ok(false)` - If the search engine is unhealthy
    /// * `Err(SearchError)` - If the health check fails to execute
    async fn health_check(&self) -> Result<bool, SearchError>;
}
