use crate::{EmbeddingType, ImageIndex, ImageRecord, IndexError};
use hashbrown::HashSet;
use std::cmp::Ordering;

/// Result entry for a similarity query.
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Candidate {
    /// Id of the matched image.
    pub image_id: i64,
    /// Similarity score (0.0 to 1.0, higher is more similar).
    pub similarity: f32,
    /// Provider of the stored embedding.
    pub provider: String,
    /// Model of the stored embedding.
    pub model: String,
    /// Description of the matched image.
    pub description: String,
    /// Image set the match belongs to.
    pub set_name: String,
    /// File format of the matched image.
    pub file_format: String,
}

/// Parameters for a similarity search.
///
/// Model filters (`provider`, `model`, `original_dim`) select records whose
/// embedding is comparable with the query's. When no record satisfies all
/// three, the search relaxes only the dimension, keeping the same
/// provider/model pair; embeddings from different models live in different
/// spaces and are never compared.
#[derive(Debug, Clone, Default)]
pub struct SearchParams {
    /// Number of results to return.
    pub k: usize,
    /// Require this embedding provider.
    pub provider: Option<String>,
    /// Require this embedding model (exact pass only).
    pub model: Option<String>,
    /// Require this native vector width (exact pass only).
    pub original_dim: Option<usize>,
    /// Restrict matches to these image sets. Empty means no restriction.
    pub set_filter: Vec<String>,
    /// Images to exclude, typically ones already assigned.
    pub exclude_ids: Vec<i64>,
}

impl SearchParams {
    pub fn new(k: usize) -> Self {
        Self {
            k,
            ..Default::default()
        }
    }

    pub fn with_provider(mut self, provider: impl Into<String>) -> Self {
        self.provider = Some(provider.into());
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = Some(model.into());
        self
    }

    pub fn with_original_dim(mut self, original_dim: usize) -> Self {
        self.original_dim = Some(original_dim);
        self
    }

    pub fn with_set_filter(mut self, set_name: impl Into<String>) -> Self {
        self.set_filter.push(set_name.into());
        self
    }

    pub fn with_set_filters(mut self, set_names: Vec<String>) -> Self {
        self.set_filter = set_names;
        self
    }

    pub fn with_exclude_ids(mut self, exclude_ids: Vec<i64>) -> Self {
        self.exclude_ids = exclude_ids;
        self
    }

    fn matches_exact(&self, rec: &ImageRecord) -> bool {
        if let Some(provider) = self.provider.as_deref() {
            if rec.provider != provider {
                return false;
            }
        }
        if let Some(model) = self.model.as_deref() {
            if rec.model != model {
                return false;
            }
        }
        if let Some(original_dim) = self.original_dim {
            if rec.original_dim != original_dim {
                return false;
            }
        }
        true
    }

    /// Same provider/model pair, any native dimension. Relaxing the model as
    /// well would compare scores across incompatible embedding spaces.
    fn matches_relaxed(&self, rec: &ImageRecord) -> bool {
        if let Some(provider) = self.provider.as_deref() {
            if rec.provider != provider {
                return false;
            }
        }
        if let Some(model) = self.model.as_deref() {
            if rec.model != model {
                return false;
            }
        }
        true
    }
}

/// Cosine similarity over equal-length f32 vectors. Zero-padding at the tail
/// does not change the result.
#[inline]
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let mut dot = 0.0f32;
    let mut norm_a = 0.0f32;
    let mut norm_b = 0.0f32;
    for (x, y) in a.iter().zip(b.iter()) {
        dot += x * y;
        norm_a += x * x;
        norm_b += y * y;
    }
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a.sqrt() * norm_b.sqrt())
}

impl ImageIndex {
    /// Search for the top-k images most similar to `query_vector`.
    ///
    /// Every stored vector must have the same padded width as the query;
    /// a disagreement is a hard [`IndexError::WidthMismatch`] rather than a
    /// silently wrong score.
    pub fn search(
        &self,
        query_vector: &[f32],
        params: &SearchParams,
    ) -> Result<Vec<Candidate>, IndexError> {
        if params.k == 0 || query_vector.is_empty() {
            return Ok(Vec::new());
        }

        let exclude: HashSet<i64> = params.exclude_ids.iter().copied().collect();

        let mut exact = Vec::new();
        let mut relaxed = Vec::new();

        let table = self
            .vector_table()
            .read()
            .map_err(|_| IndexError::backend("poisoned lock"))?;

        for (image_id, vector) in table.iter() {
            if exclude.contains(image_id) {
                continue;
            }
            if vector.len() != query_vector.len() {
                return Err(IndexError::WidthMismatch {
                    expected: query_vector.len(),
                    got: vector.len(),
                });
            }

            let data = match self.backend().get(&image_id.to_string())? {
                Some(data) => data,
                None => continue,
            };
            let record = self.decode_record(&data)?;

            // Only text embeddings are comparable with sentence queries.
            if record.embedding_type != EmbeddingType::Text {
                continue;
            }

            if !params.set_filter.is_empty() && !params.set_filter.contains(&record.set_name) {
                continue;
            }

            let similarity = cosine_similarity(query_vector, vector).clamp(0.0, 1.0);

            let candidate = Candidate {
                image_id: *image_id,
                similarity,
                provider: record.provider.clone(),
                model: record.model.clone(),
                description: record.description.clone(),
                set_name: record.set_name.clone(),
                file_format: record.file_format.clone(),
            };

            if params.matches_exact(&record) {
                exact.push(candidate);
            } else if params.matches_relaxed(&record) {
                relaxed.push(candidate);
            }
        }
        drop(table);

        let mut results = if exact.is_empty() && !relaxed.is_empty() {
            tracing::warn!(
                relaxed = relaxed.len(),
                "no exact dimension matches, falling back to same-model candidates"
            );
            relaxed
        } else {
            exact
        };

        // Sort by score descending; ties break on image id for determinism.
        results.sort_unstable_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.image_id.cmp(&b.image_id))
        });
        results.truncate(params.k);
        Ok(results)
    }
}
