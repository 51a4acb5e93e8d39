//! OpenSearch implementation of the search engine client.

mod client;

pub use client::OpenSearchClient;
