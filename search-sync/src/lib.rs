//! # Search Sync
//!
//! Entry point and configuration for the search sync service, which mirrors
//! database change events from Kafka into per-tenant search indices.

pub mod config;

pub use config::{AppConfig, Dependencies, OpenSearchAuth};

use thiserror::Error;

/// Errors that can occur during service initialization or execution.
#[derive(Error, Debug)]
pub enum IndexingError {
    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// Pipeline error.
    #[error("Pipeline error: {0}")]
    PipelineError(#[from] search_sync_pipeline::PipelineError),
}

impl IndexingError {
    /// Create a configuration error.
    pub fn config(msg: impl Into<String>) -> Self {
        Self::ConfigError(msg.into())
    }
}
