use async_trait::async_trait;
use fxhash::hash64;

use crate::error::EmbeddingError;
use crate::normalize::l2_normalize_in_place;
use crate::provider::EmbeddingProvider;
use crate::types::TextEmbedding;

/// Deterministic offline provider for tests and local development.
/// Generates sinusoid values derived from a hash of the input text so the
/// same text always maps to the same unit vector with minimal CPU cost.
pub struct StubProvider {
    model_name: String,
    dimension: usize,
}

impl StubProvider {
    pub fn new(model_name: impl Into<String>, dimension: usize) -> Self {
        Self {
            model_name: model_name.into(),
            dimension,
        }
    }

    fn make_vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0f32; self.dimension];
        let h = hash64(text.as_bytes());
        for (idx, value) in v.iter_mut().enumerate() {
            *value = ((h >> (idx % 32)) as f32 * 0.0001).sin();
        }
        l2_normalize_in_place(&mut v);
        v
    }
}

#[async_trait]
impl EmbeddingProvider for StubProvider {
    fn provider_name(&self) -> &str {
        "stub"
    }

    fn model_name(&self) -> &str {
        &self.model_name
    }

    fn dimension(&self) -> usize {
        self.dimension
    }

    async fn encode_texts(&self, texts: &[String]) -> Result<Vec<TextEmbedding>, EmbeddingError> {
        Ok(texts
            .iter()
            .map(|text| {
                let mut e = TextEmbedding::new(self.make_vector(text), "stub", &self.model_name);
                e.normalized = true;
                e
            })
            .collect())
    }
}
