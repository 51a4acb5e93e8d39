//! Service configuration read from the environment.

mod dependencies;

pub use dependencies::Dependencies;

use std::env;
use std::fmt;
use std::str::FromStr;

use crate::IndexingError;

const DEFAULT_KAFKA_BROKERS: &str = "localhost:9092";
const DEFAULT_KAFKA_TOPICS: &str = "app.public.documents";
const DEFAULT_KAFKA_GROUP_ID: &str = "search-sync-service";
const DEFAULT_OPENSEARCH_URL: &str = "http://localhost:9200";
const DEFAULT_MAX_BATCH_SIZE: usize = 500;
const DEFAULT_FETCH_LINGER_MS: u64 = 100;
const DEFAULT_APPLY_MAX_RETRIES: u32 = 0;

/// Runtime settings for the sync service.
///
/// # Environment Variables
///
/// - `KAFKA_BROKERS`: comma-separated broker list (default: localhost:9092)
/// - `KAFKA_TOPICS`: comma-separated topics (default: app.public.documents)
/// - `KAFKA_GROUP_ID`: consumer group (default: search-sync-service)
/// - `OPENSEARCH_URL`: search engine URL (default: http://localhost:9200)
/// - `OPENSEARCH_USERNAME` / `OPENSEARCH_PASSWORD`: basic auth, both or neither
/// - `SYNC_MAX_BATCH_SIZE`: records per fetch (default: 500)
/// - `SYNC_FETCH_LINGER_MS`: batch fill window (default: 100)
/// - `SYNC_APPLY_MAX_RETRIES`: retries per search write (default: 0)
/// - `DEBUG`: `1` or `true` enables debug logging
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AppConfig {
    pub kafka_brokers: String,
    pub kafka_topics: Vec<String>,
    pub kafka_group_id: String,
    pub opensearch_url: String,
    pub opensearch_auth: Option<OpenSearchAuth>,
    pub max_batch_size: usize,
    pub fetch_linger_ms: u64,
    pub apply_max_retries: u32,
    pub debug: bool,
}

/// Basic-auth credentials for the search engine.
#[derive(Clone, PartialEq, Eq)]
pub struct OpenSearchAuth {
    pub username: String,
    pub password: String,
}

impl fmt::Debug for OpenSearchAuth {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenSearchAuth")
            .field("username", &self.username)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl AppConfig {
    /// Load configuration from the process environment.
    pub fn from_env() -> Result<Self, IndexingError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Load configuration using `lookup` to resolve variables.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, IndexingError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let string = |key: &str, default: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
                .unwrap_or_else(|| default.to_string())
        };

        let kafka_topics: Vec<String> = string("KAFKA_TOPICS", DEFAULT_KAFKA_TOPICS)
            .split(',')
            .map(str::trim)
            .filter(|t| !t.is_empty())
            .map(String::from)
            .collect();
        if kafka_topics.is_empty() {
            return Err(IndexingError::config("KAFKA_TOPICS names no topics"));
        }

        let max_batch_size = parse_var(&lookup, "SYNC_MAX_BATCH_SIZE", DEFAULT_MAX_BATCH_SIZE)?;
        if max_batch_size == 0 {
            return Err(IndexingError::config("SYNC_MAX_BATCH_SIZE must be at least 1"));
        }

        let opensearch_auth = match (
            lookup("OPENSEARCH_USERNAME").filter(|v| !v.trim().is_empty()),
            lookup("OPENSEARCH_PASSWORD").filter(|v| !v.is_empty()),
        ) {
            (None, None) => None,
            (Some(username), Some(password)) => Some(OpenSearchAuth {
                username: username.trim().to_string(),
                password,
            }),
            (Some(_), None) => {
                return Err(IndexingError::config(
                    "OPENSEARCH_USERNAME is set but OPENSEARCH_PASSWORD is not",
                ))
            }
            (None, Some(_)) => {
                return Err(IndexingError::config(
                    "OPENSEARCH_PASSWORD is set but OPENSEARCH_USERNAME is not",
                ))
            }
        };

        Ok(Self {
            kafka_brokers: string("KAFKA_BROKERS", DEFAULT_KAFKA_BROKERS),
            kafka_topics,
            kafka_group_id: string("KAFKA_GROUP_ID", DEFAULT_KAFKA_GROUP_ID),
            opensearch_url: string("OPENSEARCH_URL", DEFAULT_OPENSEARCH_URL),
            opensearch_auth,
            max_batch_size,
            fetch_linger_ms: parse_var(&lookup, "SYNC_FETCH_LINGER_MS", DEFAULT_FETCH_LINGER_MS)?,
            apply_max_retries: parse_var(
                &lookup,
                "SYNC_APPLY_MAX_RETRIES",
                DEFAULT_APPLY_MAX_RETRIES,
            )?,
            debug: lookup("DEBUG")
                .map(|v| is_truthy(&v))
                .unwrap_or(false),
        })
    }
}

fn parse_var<F, T>(lookup: &F, key: &str, default: T) -> Result<T, IndexingError>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match lookup(key).map(|v| v.trim().to_string()) {
        None => Ok(default),
        Some(v) if v.is_empty() => Ok(default),
        Some(v) => v
            .parse()
            .map_err(|e| IndexingError::config(format!("invalid {}={:?}: {}", key, v, e))),
    }
}

fn is_truthy(value: &str) -> bool {
    matches!(value.trim().to_ascii_lowercase().as_str(), "1" | "true")
}
