//! Workspace umbrella crate for picweave sentence-to-image matching.
//!
//! This crate stitches the embedding, index, and matcher layers together so
//! callers can go from a batch of sentences to a duplicate-free image
//! assignment with a single API entry point.
//!
//! ```no_run
//! use picweave::{Pipeline, PicweaveConfig};
//! use picweave::SentenceQuery;
//!
//! #[tokio::main]
//! async fn main() -> Result<(), picweave::PipelineError> {
//!     let pipeline = Pipeline::build(&PicweaveConfig::default())?;
//!
//!     pipeline.add_image(1, "nature", "a dog running on a beach").await?;
//!     pipeline.add_image(2, "nature", "a snowy mountain at dawn").await?;
//!
//!     let outcome = pipeline
//!         .illustrate_sentences(vec![
//!             SentenceQuery::new(0, "the dog sprinted across the sand", 5),
//!             SentenceQuery::new(1, "peaks glowed in the early light", 5),
//!         ])
//!         .await?;
//!
//!     if let Some(allocation) = &outcome.allocation {
//!         for (sentence, assignment) in allocation {
//!             println!("sentence {sentence} -> image {}", assignment.image_id);
//!         }
//!     }
//!     Ok(())
//! }
//! ```

pub mod config;

pub use crate::config::{ConfigLoadError, PicweaveConfig};

pub use embedding::{
    embed_texts_cached, infer_original_dim, l2_normalize_in_place, pad_to_standard,
    recover_original, EmbeddingCache, EmbeddingConfig, EmbeddingError, EmbeddingProvider,
    RetryConfig, StubProvider, TextEmbedding, DEFAULT_STANDARD_WIDTH,
};
pub use index::{
    BackendConfig, Candidate, CompressionCodec, CompressionConfig, EmbeddingType, ImageIndex,
    ImageRecord, IndexConfig, IndexError, IndexStats, SearchParams, INDEX_SCHEMA_VERSION,
};
pub use matcher::{
    allocate, candidate_set_stats, problem_shape, AllocationMetrics, AllocationOptions,
    AllocationPhase, Assignment, BatchMatcher, BatchOutcome, BatchSearchRequest,
    CandidateSetStats, MatchError, MatcherConfig, ProblemShape, SearchDiagnostics, SentenceQuery,
};

use std::sync::Arc;
use std::time::Duration;

/// Errors that can occur while running the end-to-end pipeline.
#[derive(Debug, Clone, thiserror::Error)]
pub enum PipelineError {
    #[error("configuration failure: {0}")]
    Config(String),

    #[error("embedding failure: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("index failure: {0}")]
    Index(#[from] IndexError),

    #[error("matching failure: {0}")]
    Match(#[from] MatchError),
}

impl From<ConfigLoadError> for PipelineError {
    fn from(value: ConfigLoadError) -> Self {
        PipelineError::Config(value.to_string())
    }
}

/// The wired-up matching stack: index, provider, cache, and matcher sharing
/// one configuration.
pub struct Pipeline {
    index: Arc<ImageIndex>,
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<EmbeddingCache>,
    matcher: BatchMatcher,
    standard_width: usize,
}

impl Pipeline {
    /// Build the full stack from a validated configuration.
    pub fn build(cfg: &PicweaveConfig) -> Result<Self, PipelineError> {
        cfg.validate()?;

        let provider = cfg.embedding.build_provider()?;
        let cache = Arc::new(EmbeddingCache::new(
            Duration::from_secs(cfg.embedding.cache_ttl_secs),
            cfg.embedding.cache_capacity,
        ));
        let index = Arc::new(ImageIndex::new(
            IndexConfig::new()
                .with_backend(BackendConfig::in_memory())
                .with_standard_width(cfg.matcher.standard_width),
        )?);
        let matcher = BatchMatcher::new(
            Arc::clone(&index),
            Arc::clone(&provider),
            Arc::clone(&cache),
            cfg.matcher.clone(),
        )?;

        Ok(Self {
            index,
            provider,
            cache,
            matcher,
            standard_width: cfg.matcher.standard_width,
        })
    }

    pub fn index(&self) -> &Arc<ImageIndex> {
        &self.index
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    pub fn cache(&self) -> &Arc<EmbeddingCache> {
        &self.cache
    }

    pub fn matcher(&self) -> &BatchMatcher {
        &self.matcher
    }

    /// Embed a description and store it as an image record.
    pub async fn add_image(
        &self,
        image_id: i64,
        set_name: &str,
        description: &str,
    ) -> Result<(), PipelineError> {
        let mut embedded = self
            .provider
            .encode_texts(&[description.to_string()])
            .await?;
        let embedding = embedded
            .pop()
            .ok_or_else(|| EmbeddingError::InvalidResponse("empty batch result".to_string()))?;
        let (padded, original_dim) = pad_to_standard(embedding.vector, self.standard_width);

        let record = ImageRecord::new(image_id, set_name, description, padded, original_dim)
            .with_model(self.provider.provider_name(), self.provider.model_name());
        self.index.upsert(&record)?;
        Ok(())
    }

    /// Run search and allocation for a batch of sentences.
    ///
    /// Multi-sentence batches come back with a duplicate-free allocation and
    /// quality metrics; a single sentence gets only its ranked candidates.
    pub async fn illustrate_sentences(
        &self,
        queries: Vec<SentenceQuery>,
    ) -> Result<BatchOutcome, PipelineError> {
        let request = BatchSearchRequest::new(queries);
        Ok(self.matcher.match_batch(&request).await?)
    }

    /// Run search and allocation with explicit filters.
    pub async fn illustrate_with_filters(
        &self,
        request: &BatchSearchRequest,
    ) -> Result<BatchOutcome, PipelineError> {
        Ok(self.matcher.match_batch(request).await?)
    }
}
