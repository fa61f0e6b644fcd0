use crate::config::ServerConfig;
use crate::error::ServerResult;
use dashmap::DashMap;
use embedding::{EmbeddingCache, EmbeddingProvider};
use index::{BackendConfig, ImageIndex, IndexConfig};
use matcher::BatchMatcher;
use std::sync::Arc;
use std::time::Duration;

/// Shared application state
#[derive(Clone)]
pub struct ServerState {
    /// Server configuration
    pub config: Arc<ServerConfig>,

    /// Rate limit tracking: API key -> (count, window_start)
    pub rate_limiter: Arc<DashMap<String, (u32, std::time::Instant)>>,

    /// Image index (shared across requests)
    pub index: Arc<ImageIndex>,

    /// Embedding provider (shared across requests)
    pub provider: Arc<dyn EmbeddingProvider>,

    /// Embedding cache (shared across requests)
    pub cache: Arc<EmbeddingCache>,

    /// Batch matcher (shared across requests)
    pub matcher: Arc<BatchMatcher>,

    /// Prometheus render handle, set once the recorder is installed
    pub metrics_handle: Option<metrics_exporter_prometheus::PrometheusHandle>,
}

impl ServerState {
    /// Create new server state
    pub fn new(config: ServerConfig) -> ServerResult<Self> {
        config.validate()?;

        let provider = config.embedding.build_provider()?;
        let cache = Arc::new(EmbeddingCache::new(
            Duration::from_secs(config.embedding.cache_ttl_secs),
            config.embedding.cache_capacity,
        ));

        // In-memory backend for now; a durable backend is a config variant.
        let index_config = IndexConfig::new()
            .with_backend(BackendConfig::in_memory())
            .with_standard_width(config.matcher.standard_width);
        let index = Arc::new(ImageIndex::new(index_config)?);

        let matcher = Arc::new(BatchMatcher::new(
            Arc::clone(&index),
            Arc::clone(&provider),
            Arc::clone(&cache),
            config.matcher.clone(),
        )?);

        Ok(Self {
            config: Arc::new(config),
            rate_limiter: Arc::new(DashMap::new()),
            index,
            provider,
            cache,
            matcher,
            metrics_handle: None,
        })
    }

    /// Attach the Prometheus render handle after the recorder is installed
    pub fn with_metrics_handle(
        mut self,
        handle: metrics_exporter_prometheus::PrometheusHandle,
    ) -> Self {
        self.metrics_handle = Some(handle);
        self
    }

    /// Check if API key is valid
    pub fn is_valid_api_key(&self, key: &str) -> bool {
        self.config.api_keys.contains(key)
    }

    /// Check rate limit for API key
    pub fn check_rate_limit(&self, key: &str) -> bool {
        let now = std::time::Instant::now();
        let window = std::time::Duration::from_secs(60);
        let limit = self.config.rate_limit_per_minute;

        let mut entry = self.rate_limiter.entry(key.to_string()).or_insert((0, now));
        let (count, window_start) = entry.value_mut();

        // Reset if window has passed
        if now.duration_since(*window_start) > window {
            *count = 0;
            *window_start = now;
        }

        // Check limit
        if *count >= limit {
            return false;
        }

        *count += 1;
        true
    }
}

/// Server metadata for the authenticated metadata endpoint.
#[derive(Debug, serde::Serialize)]
pub struct ServerMetadata {
    pub version: String,
    pub uptime_seconds: u64,
    /// Provider identity string (provider/model/dimension).
    pub provider: String,
    pub indexed_images: usize,
    pub cache_hits: u64,
    pub cache_misses: u64,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_state() -> ServerState {
        let mut config = ServerConfig::default();
        config.api_keys.insert("test-key".to_string());
        ServerState::new(config).unwrap()
    }

    #[test]
    fn api_key_validation() {
        let state = test_state();
        assert!(state.is_valid_api_key("test-key"));
        assert!(!state.is_valid_api_key("wrong-key"));
    }

    #[test]
    fn rate_limit_counts_per_key() {
        let mut config = ServerConfig::default();
        config.api_keys.insert("k".to_string());
        config.rate_limit_per_minute = 2;
        let state = ServerState::new(config).unwrap();

        assert!(state.check_rate_limit("k"));
        assert!(state.check_rate_limit("k"));
        assert!(!state.check_rate_limit("k"));
        // Another key has its own window
        assert!(state.check_rate_limit("other"));
    }

    #[test]
    fn bad_embedding_config_rejected() {
        let mut config = ServerConfig::default();
        config.embedding.mode = "nonsense".to_string();
        assert!(ServerState::new(config).is_err());
    }
}
