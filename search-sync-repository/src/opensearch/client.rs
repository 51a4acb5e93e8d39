//! OpenSearch client implementation.
//!
//! This module provides the concrete implementation of `SearchEngineClient`
//! using the OpenSearch Rust client.

use async_trait::async_trait;
use opensearch::{
    auth::Credentials,
    cluster::ClusterHealthParts,
    http::{
        request::JsonBody,
        transport::{SingleNodeConnectionPool, TransportBuilder},
    },
    BulkParts, DeleteParts, OpenSearch,
};
use serde_json::{json, Value};
use tracing::{debug, error, info, instrument};
use url::Url;

use crate::errors::SearchError;
use crate::interfaces::SearchEngineClient;
use search_sync_shared::{Document, IndexName};

/// OpenSearch client implementation.
///
/// Upserts are sent as bulk `index` actions keyed by the document's `id`,
/// which fully replaces any existing document and creates the index on
/// first use. Deletes treat a missing document as success.
///
/// # Example
///
/// ```ignore
/// let client = OpenSearchClient::new("http://localhost:9200").await?;
/// client.delete_document(&index, "42").await?;
/// ```
pub struct OpenSearchClient {
    client: OpenSearch,
}

impl OpenSearchClient {
    /// Create a new OpenSearch client connected to the specified URL.
    ///
    /// # Arguments
    ///
    /// * `url` - The OpenSearch server URL (e.g., "http://localhost:9200")
    ///
    /// # Returns
    ///
    /// * `Ok(OpenSearchClient)` - A new client instance
    /// * `Err(SearchError)` - If connection setup fails
    pub async fn new(url: &str) -> Result<Self, SearchError> {
        Self::connect(url, None).await
    }

    /// Create a client that authenticates every request with HTTP basic auth.
    pub async fn with_basic_auth(
        url: &str,
        username: &str,
        password: &str,
    ) -> Result<Self, SearchError> {
        let credentials = Credentials::Basic(username.to_string(), password.to_string());
        Self::connect(url, Some(credentials)).await
    }

    async fn connect(url: &str, credentials: Option<Credentials>) -> Result<Self, SearchError> {
        let parsed_url = Url::parse(url).map_err(|e| SearchError::connection(e.to_string()))?;
        let authenticated = credentials.is_some();

        let conn_pool = SingleNodeConnectionPool::new(parsed_url);
        let mut builder = TransportBuilder::new(conn_pool).disable_proxy();
        if let Some(credentials) = credentials {
            builder = builder.auth(credentials);
        }
        let transport = builder
            .build()
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let client = OpenSearch::new(transport);

        info!(url = %url, authenticated = authenticated, "Created OpenSearch client");

        Ok(Self { client })
    }

    /// Build the NDJSON body of a bulk request: one `index` action per document.
    fn bulk_body(documents: &[Document]) -> Result<Vec<JsonBody<Value>>, SearchError> {
        let mut body = Vec::with_capacity(documents.len() * 2);

        for doc in documents {
            let id = doc.id();
            if id.is_empty() {
                return Err(SearchError::validation("document without id in upsert"));
            }
            body.push(json!({ "index": { "_id": id } }).into());
            body.push(Value::from(doc.clone()).into());
        }

        Ok(body)
    }

    /// Collect `id: reason` strings for every failed item of a bulk response.
    fn bulk_failures(response: &Value) -> Vec<String> {
        if !response["errors"].as_bool().unwrap_or(false) {
            return Vec::new();
        }

        response["items"]
            .as_array()
            .map(|items| {
                items
                    .iter()
                    .filter_map(|item| {
                        let action = &item["index"];
                        let err = action.get("error")?;
                        let id = action["_id"].as_str().unwrap_or("?");
                        let reason = err["reason"]
                            .as_str()
                            .map(str::to_string)
                            .unwrap_or_else(|| err.to_string());
                        Some(format!("{}: {}", id, reason))
                    })
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Delete outcome by HTTP status. 404 means the document or index is already gone.
    fn delete_succeeded(status: u16) -> bool {
        (200..300).contains(&status) || status == 404
    }

    /// Whether a `_cluster/health` body reports a usable cluster.
    fn cluster_is_healthy(body: &Value) -> bool {
        matches!(body["status"].as_str(), Some("green") | Some("yellow"))
    }
}

#[async_trait]
impl SearchEngineClient for OpenSearchClient {
    #[instrument(skip(self, documents), fields(index = %index, count = documents.len()))]
    async fn upsert_documents(
        &self,
        index: &IndexName,
        documents: &[Document],
    ) -> Result<(), SearchError> {
        if documents.is_empty() {
            return Ok(());
        }

        let body = Self::bulk_body(documents)?;

        let response = self
            .client
            .bulk(BulkParts::Index(index.as_str()))
            .body(body)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let status = response.status_code();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Bulk request failed");
            return Err(SearchError::index(format!(
                "Bulk request failed with status {}: {}",
                status, error_body
            )));
        }

        let response_body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;

        let failures = Self::bulk_failures(&response_body);
        if !failures.is_empty() {
            return Err(SearchError::bulk_index(failures.join("; ")));
        }

        debug!("Documents upserted");
        Ok(())
    }

    #[instrument(skip(self), fields(index = %index))]
    async fn delete_document(&self, index: &IndexName, id: &str) -> Result<(), SearchError> {
        if id.is_empty() {
            return Err(SearchError::validation("empty id in delete"));
        }

        let response = self
            .client
            .delete(DeleteParts::IndexId(index.as_str(), id))
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        let status = response.status_code();

        if !Self::delete_succeeded(status.as_u16()) {
            let error_body = response.text().await.unwrap_or_default();
            error!(status = %status, body = %error_body, "Delete request failed");
            return Err(SearchError::delete(format!(
                "Delete failed with status {}: {}",
                status, error_body
            )));
        }

        debug!(id = %id, "Document deleted");
        Ok(())
    }

    async fn health_check(&self) -> Result<bool, SearchError> {
        let response = self
            .client
            .cluster()
            .health(ClusterHealthParts::None)
            .send()
            .await
            .map_err(|e| SearchError::connection(e.to_string()))?;

        if !response.status_code().is_success() {
            return Ok(false);
        }

        let body: Value = response
            .json()
            .await
            .map_err(|e| SearchError::parse(e.to_string()))?;

        let status = &body["status"];
        debug!(cluster_status = %status, "Cluster health");

        Ok(Self::cluster_is_healthy(&body))
    }
}
