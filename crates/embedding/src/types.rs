use serde::{Deserialize, Serialize};

/// A single text embedding together with the identity of the model
/// that produced it.
///
/// `dim` is the length of `vector` as produced by the provider, before
/// any padding to the index's standard width.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct TextEmbedding {
    pub vector: Vec<f32>,
    pub dim: usize,
    pub provider: String,
    pub model: String,
    /// True once the vector has been L2-normalized.
    pub normalized: bool,
}

impl TextEmbedding {
    pub fn new(vector: Vec<f32>, provider: impl Into<String>, model: impl Into<String>) -> Self {
        let dim = vector.len();
        Self {
            vector,
            dim,
            provider: provider.into(),
            model: model.into(),
            normalized: false,
        }
    }

    /// Compact string identity used as part of cache keys.
    pub fn identity(&self) -> String {
        format!("{}/{}", self.provider, self.model)
    }
}
