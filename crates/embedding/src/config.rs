use serde::{Deserialize, Serialize};
use std::sync::Arc;

use crate::api::ApiProvider;
use crate::error::EmbeddingError;
use crate::provider::EmbeddingProvider;
use crate::retry::RetryConfig;
use crate::stub::StubProvider;

/// Runtime configuration describing which embedding provider to use and how
/// to post-process vectors.
///
/// # Example
/// ```no_run
/// use embedding::EmbeddingConfig;
///
/// let cfg = EmbeddingConfig {
///     mode: "api".into(),
///     api_provider: Some("hf".into()),
///     api_url: Some("https://api-inference.huggingface.co/models/BAAI/bge-small-en-v1.5".into()),
///     api_auth_header: Some("Bearer hf_xxx".into()),
///     ..Default::default()
/// };
///
/// let provider = cfg.build_provider().unwrap();
/// assert_eq!(provider.provider_name(), "hf");
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct EmbeddingConfig {
    /// Provider mode selector: `"api"` (remote HTTP) or `"stub"` (deterministic, offline).
    #[serde(default = "EmbeddingConfig::default_mode")]
    pub mode: String,
    /// Friendly label surfaced on every [`TextEmbedding`](crate::TextEmbedding).
    #[serde(default = "EmbeddingConfig::default_model_name")]
    pub model_name: String,
    /// Native output width of the model, before padding.
    #[serde(default = "EmbeddingConfig::default_dimension")]
    pub dimension: usize,
    /// API inference endpoint when [`mode`](Self::mode) is `"api"`.
    #[serde(default)]
    pub api_url: Option<String>,
    /// Authorization header (e.g., `"Bearer hf_xxx"`).
    #[serde(default)]
    pub api_auth_header: Option<String>,
    /// Remote provider hint: `"hf"`, `"openai"`, or `"custom"` (default).
    #[serde(default)]
    pub api_provider: Option<String>,
    /// Overall API timeout in seconds.
    #[serde(default = "EmbeddingConfig::default_api_timeout_secs")]
    pub api_timeout_secs: Option<u64>,
    /// Normalize resulting vectors to unit length (recommended for cosine similarity).
    #[serde(default = "EmbeddingConfig::default_normalize")]
    pub normalize: bool,
    /// Retry configuration for API calls.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub retry_config: Option<RetryConfig>,
    /// Time-to-live for cached embeddings in seconds. Zero disables expiry.
    #[serde(default = "EmbeddingConfig::default_cache_ttl_secs")]
    pub cache_ttl_secs: u64,
    /// Upper bound on the number of cached embeddings.
    #[serde(default = "EmbeddingConfig::default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            mode: Self::default_mode(),
            model_name: Self::default_model_name(),
            dimension: Self::default_dimension(),
            api_url: None,
            api_auth_header: None,
            api_provider: None,
            api_timeout_secs: Self::default_api_timeout_secs(),
            normalize: Self::default_normalize(),
            retry_config: None,
            cache_ttl_secs: Self::default_cache_ttl_secs(),
            cache_capacity: Self::default_cache_capacity(),
        }
    }
}

impl EmbeddingConfig {
    fn default_mode() -> String {
        "stub".into()
    }

    fn default_model_name() -> String {
        "bge-small-en-v1.5".into()
    }

    fn default_dimension() -> usize {
        384
    }

    fn default_api_timeout_secs() -> Option<u64> {
        Some(30)
    }

    fn default_normalize() -> bool {
        true
    }

    fn default_cache_ttl_secs() -> u64 {
        3600
    }

    fn default_cache_capacity() -> usize {
        10_000
    }

    /// Checks the config for internal consistency.
    pub fn validate(&self) -> Result<(), EmbeddingError> {
        match self.mode.as_str() {
            "stub" => {}
            "api" => {
                if self.api_url.as_deref().unwrap_or("").is_empty() {
                    return Err(EmbeddingError::InvalidConfig(
                        "api mode requires api_url".into(),
                    ));
                }
            }
            other => {
                return Err(EmbeddingError::InvalidConfig(format!(
                    "unknown mode '{other}' (expected 'api' or 'stub')"
                )));
            }
        }
        if self.dimension == 0 {
            return Err(EmbeddingError::InvalidConfig(
                "dimension must be non-zero".into(),
            ));
        }
        Ok(())
    }

    /// Builds the provider this config describes.
    pub fn build_provider(&self) -> Result<Arc<dyn EmbeddingProvider>, EmbeddingError> {
        self.validate()?;
        match self.mode.as_str() {
            "stub" => Ok(Arc::new(StubProvider::new(
                self.model_name.clone(),
                self.dimension,
            ))),
            "api" => Ok(Arc::new(ApiProvider::from_config(self)?)),
            other => Err(EmbeddingError::InvalidConfig(format!(
                "unknown mode '{other}'"
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn config_default_values() {
        let cfg = EmbeddingConfig::default();
        assert_eq!(cfg.mode, "stub");
        assert_eq!(cfg.model_name, "bge-small-en-v1.5");
        assert_eq!(cfg.dimension, 384);
        assert!(cfg.api_url.is_none());
        assert!(cfg.api_auth_header.is_none());
        assert!(cfg.api_provider.is_none());
        assert_eq!(cfg.api_timeout_secs, Some(30));
        assert!(cfg.normalize);
        assert_eq!(cfg.cache_ttl_secs, 3600);
        assert_eq!(cfg.cache_capacity, 10_000);
    }

    #[test]
    fn config_validate_default_ok() {
        assert!(EmbeddingConfig::default().validate().is_ok());
    }

    #[test]
    fn config_validate_api_requires_url() {
        let cfg = EmbeddingConfig {
            mode: "api".into(),
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(EmbeddingError::InvalidConfig(_))
        ));
    }

    #[test]
    fn config_validate_rejects_unknown_mode() {
        let cfg = EmbeddingConfig {
            mode: "onnx".into(),
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_validate_rejects_zero_dimension() {
        let cfg = EmbeddingConfig {
            dimension: 0,
            ..Default::default()
        };
        assert!(cfg.validate().is_err());
    }

    #[test]
    fn config_build_stub_provider() {
        let cfg = EmbeddingConfig::default();
        let provider = cfg.build_provider().unwrap();
        assert_eq!(provider.provider_name(), "stub");
        assert_eq!(provider.model_name(), "bge-small-en-v1.5");
        assert_eq!(provider.dimension(), 384);
    }

    #[test]
    fn config_build_api_provider() {
        let cfg = EmbeddingConfig {
            mode: "api".into(),
            api_provider: Some("openai".into()),
            api_url: Some("https://api.example.com/embed".into()),
            model_name: "text-embedding-3-small".into(),
            dimension: 1536,
            ..Default::default()
        };
        let provider = cfg.build_provider().unwrap();
        assert_eq!(provider.provider_name(), "openai");
        assert_eq!(provider.dimension(), 1536);
    }

    #[test]
    fn config_serde_roundtrip() {
        let cfg = EmbeddingConfig {
            mode: "api".into(),
            model_name: "test-model".into(),
            dimension: 512,
            api_url: Some("https://api.example.com/embed".into()),
            api_auth_header: Some("Bearer token123".into()),
            api_provider: Some("openai".into()),
            api_timeout_secs: Some(60),
            normalize: false,
            retry_config: Some(RetryConfig::default()),
            cache_ttl_secs: 120,
            cache_capacity: 64,
        };

        let serialized = serde_json::to_string(&cfg).unwrap();
        let deserialized: EmbeddingConfig = serde_json::from_str(&serialized).unwrap();
        assert_eq!(cfg, deserialized);
    }

    #[test]
    fn config_partial_json_fills_defaults() {
        let cfg: EmbeddingConfig = serde_json::from_str(r#"{"mode":"stub","dimension":64}"#).unwrap();
        assert_eq!(cfg.dimension, 64);
        assert_eq!(cfg.model_name, "bge-small-en-v1.5");
        assert!(cfg.normalize);
        assert_eq!(cfg.cache_capacity, 10_000);
    }

    #[test]
    fn config_partial_eq() {
        let cfg1 = EmbeddingConfig::default();
        let cfg2 = EmbeddingConfig::default();
        assert_eq!(cfg1, cfg2);

        let cfg3 = EmbeddingConfig {
            mode: "api".into(),
            ..Default::default()
        };
        assert_ne!(cfg1, cfg3);
    }
}
