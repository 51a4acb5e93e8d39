//! Dependency initialization and wiring for the search sync service.

use std::sync::Arc;
use tracing::info;

use crate::{AppConfig, IndexingError};
use search_sync_pipeline::{
    consumer::{ConsumerConfig, KafkaConsumer},
    loader::{LoaderConfig, SearchLoader},
    orchestrator::Orchestrator,
    processor::DocumentExtractor,
};
use search_sync_repository::OpenSearchClient;

/// Container for all initialized dependencies.
pub struct Dependencies {
    /// The configured orchestrator ready to run.
    pub orchestrator: Orchestrator,
}

impl Dependencies {
    /// Connect to the search engine and the log, then wire the pipeline.
    ///
    /// Fails if the search engine is unreachable or reports an unhealthy
    /// cluster, or if the Kafka consumer cannot be created or subscribed.
    pub async fn new(config: &AppConfig) -> Result<Self, IndexingError> {
        info!(
            opensearch_url = %config.opensearch_url,
            kafka_brokers = %config.kafka_brokers,
            kafka_topics = ?config.kafka_topics,
            kafka_group_id = %config.kafka_group_id,
            opensearch_auth = config.opensearch_auth.is_some(),
            "Initializing dependencies"
        );

        let search_client = match &config.opensearch_auth {
            Some(auth) => {
                OpenSearchClient::with_basic_auth(
                    &config.opensearch_url,
                    &auth.username,
                    &auth.password,
                )
                .await
            }
            None => OpenSearchClient::new(&config.opensearch_url).await,
        }
        .map_err(|e| IndexingError::config(format!("Failed to create OpenSearch client: {}", e)))?;

        let loader = SearchLoader::with_config(
            Arc::new(search_client),
            LoaderConfig {
                max_retries: config.apply_max_retries,
                ..LoaderConfig::default()
            },
        );

        let healthy = loader
            .health_check()
            .await
            .map_err(|e| IndexingError::config(format!("OpenSearch health check failed: {}", e)))?;

        if !healthy {
            return Err(IndexingError::config("OpenSearch cluster is unhealthy"));
        }

        info!("OpenSearch connection verified");

        let consumer = KafkaConsumer::new(
            &config.kafka_brokers,
            &config.kafka_group_id,
            config.kafka_topics.clone(),
            ConsumerConfig {
                max_batch_size: config.max_batch_size,
                fetch_linger_ms: config.fetch_linger_ms,
            },
        )
        .map_err(|e| IndexingError::config(format!("Failed to create Kafka consumer: {}", e)))?;

        consumer.subscribe()?;

        let orchestrator =
            Orchestrator::new(Box::new(consumer), DocumentExtractor::new(), loader);

        Ok(Self { orchestrator })
    }
}
