use async_trait::async_trait;
use serde_json::{json, Value};
use std::time::Duration;

use crate::config::EmbeddingConfig;
use crate::error::EmbeddingError;
use crate::normalize::l2_normalize_in_place;
use crate::provider::EmbeddingProvider;
use crate::retry::{execute_with_retry_async, RetryConfig};
use crate::types::TextEmbedding;

#[derive(Clone, Copy)]
enum ApiProviderKind {
    HuggingFace,
    OpenAI,
    Custom,
}

impl ApiProviderKind {
    fn parse(hint: Option<&str>) -> Self {
        match hint.unwrap_or("custom").to_ascii_lowercase().as_str() {
            "hf" | "huggingface" => ApiProviderKind::HuggingFace,
            "openai" | "gpt" => ApiProviderKind::OpenAI,
            _ => ApiProviderKind::Custom,
        }
    }
}

/// Remote HTTP embedding backend.
///
/// Speaks the HuggingFace inference, OpenAI embeddings, and a generic
/// `{"texts": [..]}` wire shape depending on the configured provider hint.
/// Each instance owns its HTTP client so callers can run several providers
/// side by side without shared global state.
pub struct ApiProvider {
    client: reqwest::Client,
    kind: ApiProviderKind,
    provider_name: String,
    model_name: String,
    dimension: usize,
    url: String,
    auth_header: Option<String>,
    normalize: bool,
    retry: RetryConfig,
}

impl ApiProvider {
    pub fn from_config(cfg: &EmbeddingConfig) -> Result<Self, EmbeddingError> {
        let url = cfg
            .api_url
            .clone()
            .ok_or_else(|| EmbeddingError::InvalidConfig("api_url is required".into()))?;

        let timeout = Duration::from_secs(cfg.api_timeout_secs.unwrap_or(30));
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(Duration::from_secs(10))
            .pool_max_idle_per_host(32)
            .build()
            .map_err(|e| EmbeddingError::InvalidConfig(format!("http client: {e}")))?;

        Ok(Self {
            client,
            kind: ApiProviderKind::parse(cfg.api_provider.as_deref()),
            provider_name: cfg
                .api_provider
                .as_deref()
                .unwrap_or("custom")
                .to_ascii_lowercase(),
            model_name: cfg.model_name.clone(),
            dimension: cfg.dimension,
            url,
            auth_header: cfg.api_auth_header.clone(),
            normalize: cfg.normalize,
            retry: cfg.retry_config.unwrap_or_default(),
        })
    }

    fn build_payload(&self, texts: &[String]) -> Value {
        match self.kind {
            ApiProviderKind::HuggingFace => json!({ "inputs": texts }),
            ApiProviderKind::OpenAI => json!({ "input": texts, "model": self.model_name }),
            ApiProviderKind::Custom => json!({ "texts": texts }),
        }
    }

    async fn send_request(&self, payload: &Value) -> Result<Value, EmbeddingError> {
        let mut request = self
            .client
            .post(&self.url)
            .header("Content-Type", "application/json");
        if let Some(header) = self.auth_header.as_deref() {
            request = request.header("Authorization", header);
        }

        let response = request
            .json(payload)
            .send()
            .await
            .map_err(|e| EmbeddingError::Provider(format!("HTTP request failed: {e}")))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(EmbeddingError::Provider(format!("HTTP {status}: {body}")));
        }

        response
            .json::<Value>()
            .await
            .map_err(|e| EmbeddingError::InvalidResponse(format!("invalid JSON: {e}")))
    }
}

#[async_trait]
impl EmbeddingProvider for ApiProvider {
    fn provider_name(&self) -> &str {
        &self.provider_name
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode_texts(&self, texts: &[String]) -> Result<Vec<TextEmbedding>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let payload = self.build_payload(texts);
        let response = execute_with_retry_async(&self.retry, |attempt| {
            let payload = payload.clone();
            async move {
                if attempt > 0 {
                    tracing::debug!(attempt, provider = %self.provider_name, "retrying embedding call");
                }
                self.send_request(&payload).await.map_err(|e| e.to_string())
            }
        })
        .await
        .map_err(EmbeddingError::Provider)?;

        let vectors = parse_embeddings_from_value(response)?;
        if vectors.len() != texts.len() {
            return Err(EmbeddingError::InvalidResponse(format!(
                "API returned {} embeddings for {} inputs",
                vectors.len(),
                texts.len()
            )));
        }

        let mut results = Vec::with_capacity(vectors.len());
        for mut vector in vectors {
            if self.normalize {
                l2_normalize_in_place(&mut vector);
            }
            let mut e = TextEmbedding::new(vector, &self.provider_name, &self.model_name);
            e.normalized = self.normalize;
            results.push(e);
        }
        Ok(results)
    }
}

/// Extracts embedding vectors out of the known response shapes:
/// `{"embeddings": [..]}`, OpenAI-style `{"data": [{"embedding": ..}]}`,
/// and bare arrays (single vector or array-of-vectors).
pub(crate) fn parse_embeddings_from_value(value: Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    match value {
        Value::Object(mut map) => {
            if let Some(embeddings) = map.remove("embeddings") {
                return parse_embedding_collection(embeddings);
            }

            if let Some(Value::Array(items)) = map.remove("data") {
                let mut vectors = Vec::with_capacity(items.len());
                for item in items {
                    match item {
                        Value::Object(mut obj) => {
                            if let Some(embedding) = obj.remove("embedding") {
                                vectors.push(parse_embedding_vector(embedding)?);
                            } else {
                                return Err(EmbeddingError::InvalidResponse(
                                    "missing `embedding` field in data item".into(),
                                ));
                            }
                        }
                        _ => {
                            return Err(EmbeddingError::InvalidResponse(
                                "unexpected entry inside `data` array".into(),
                            ))
                        }
                    }
                }
                return Ok(vectors);
            }

            Err(EmbeddingError::InvalidResponse(
                "unsupported API response shape".into(),
            ))
        }
        other => parse_embedding_collection(other),
    }
}

fn parse_embedding_collection(value: Value) -> Result<Vec<Vec<f32>>, EmbeddingError> {
    match value {
        Value::Array(items) => {
            if items.is_empty() {
                Ok(Vec::new())
            } else if items.iter().all(|item| matches!(item, Value::Array(_))) {
                items.into_iter().map(parse_embedding_vector).collect()
            } else {
                parse_embedding_vector(Value::Array(items)).map(|vec| vec![vec])
            }
        }
        other => parse_embedding_vector(other).map(|vec| vec![vec]),
    }
}

fn parse_embedding_vector(value: Value) -> Result<Vec<f32>, EmbeddingError> {
    match value {
        Value::Array(values) => values
            .into_iter()
            .map(|entry| match entry {
                Value::Number(num) => num.as_f64().map(|f| f as f32).ok_or_else(|| {
                    EmbeddingError::InvalidResponse("non-finite embedding value".into())
                }),
                other => Err(EmbeddingError::InvalidResponse(format!(
                    "embedding entries must be numbers, got {other:?}"
                ))),
            })
            .collect(),
        other => Err(EmbeddingError::InvalidResponse(format!(
            "embedding vector must be an array, got {other:?}"
        ))),
    }
}
