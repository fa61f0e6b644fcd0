use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Semaphore;
use tokio::task::JoinSet;

use embedding::{embed_texts_cached, pad_to_standard, EmbeddingCache, EmbeddingProvider};
use index::{Candidate, ImageIndex, IndexError, SearchParams};
use serde::{Deserialize, Serialize};

use crate::alloc::allocate;
use crate::metrics::{candidate_set_stats, problem_shape};
use crate::types::{AllocationMetrics, Assignment, MatchError, MatcherConfig, SentenceQuery};

/// A batch of sentences to search for, plus cross-cutting filters.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct BatchSearchRequest {
    pub queries: Vec<SentenceQuery>,
    /// Images to exclude from every sentence's candidates.
    #[serde(default)]
    pub exclude_ids: Vec<i64>,
    /// Restrict candidates to these image sets. Empty means no restriction.
    #[serde(default)]
    pub set_filter: Vec<String>,
}

impl BatchSearchRequest {
    pub fn new(queries: Vec<SentenceQuery>) -> Self {
        Self {
            queries,
            ..Default::default()
        }
    }

    pub fn with_exclude_ids(mut self, exclude_ids: Vec<i64>) -> Self {
        self.exclude_ids = exclude_ids;
        self
    }

    pub fn with_set_filter(mut self, set_filter: Vec<String>) -> Self {
        self.set_filter = set_filter;
        self
    }
}

/// What happened to a batch along the way. Degradations are reported here
/// instead of failing the call.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
pub struct SearchDiagnostics {
    /// Sentences that needed a fresh provider call.
    pub embedded: usize,
    /// Sentences served from the embedding cache.
    pub cache_hits: usize,
    /// Sentences degraded to empty candidates, with the reason.
    pub failures: Vec<(i64, String)>,
    /// Sentences degraded to empty candidates by the batch timeout.
    pub timed_out: usize,
}

/// Result of a full match-and-allocate run.
#[derive(Debug, Clone)]
pub struct BatchOutcome {
    /// Per-sentence ranked candidates. Keys exactly match the input indices.
    pub results: BTreeMap<i64, Vec<Candidate>>,
    /// One image per sentence; only present for batches of more than one
    /// sentence.
    pub allocation: Option<BTreeMap<i64, Assignment>>,
    pub allocation_metrics: Option<AllocationMetrics>,
    pub diagnostics: SearchDiagnostics,
}

/// Orchestrates batch similarity search and allocation.
///
/// Owns handles to the index, provider, and cache rather than reaching for
/// globals, so tests can wire up a fresh stack per case.
pub struct BatchMatcher {
    index: Arc<ImageIndex>,
    provider: Arc<dyn EmbeddingProvider>,
    cache: Arc<EmbeddingCache>,
    cfg: MatcherConfig,
}

impl BatchMatcher {
    pub fn new(
        index: Arc<ImageIndex>,
        provider: Arc<dyn EmbeddingProvider>,
        cache: Arc<EmbeddingCache>,
        cfg: MatcherConfig,
    ) -> Result<Self, MatchError> {
        cfg.validate()?;
        Ok(Self {
            index,
            provider,
            cache,
            cfg,
        })
    }

    pub fn config(&self) -> &MatcherConfig {
        &self.cfg
    }

    pub fn index(&self) -> &Arc<ImageIndex> {
        &self.index
    }

    pub fn provider(&self) -> &Arc<dyn EmbeddingProvider> {
        &self.provider
    }

    fn validate_request(request: &BatchSearchRequest) -> Result<(), MatchError> {
        if request.queries.is_empty() {
            return Err(MatchError::InvalidQuery("queries must not be empty".into()));
        }
        for q in &request.queries {
            if q.n_results == 0 {
                return Err(MatchError::InvalidQuery(format!(
                    "n_results must be positive for sentence {}",
                    q.index
                )));
            }
        }
        Ok(())
    }

    /// Run the similarity searches for a batch of sentences.
    ///
    /// Each sentence gets a ranked candidate list keyed by its input index.
    /// Per-sentence failures and timeouts degrade that sentence to an empty
    /// list; only a structurally invalid request is an error.
    pub async fn search_batch(
        &self,
        request: &BatchSearchRequest,
    ) -> Result<(BTreeMap<i64, Vec<Candidate>>, SearchDiagnostics), MatchError> {
        Self::validate_request(request)?;

        // Later duplicates of a sentence index win.
        let mut unique: BTreeMap<i64, &SentenceQuery> = BTreeMap::new();
        for q in &request.queries {
            if unique.insert(q.index, q).is_some() {
                tracing::warn!(index = q.index, "duplicate sentence index, keeping later query");
            }
        }

        let mut diagnostics = SearchDiagnostics::default();
        let mut results: BTreeMap<i64, Vec<Candidate>> =
            unique.keys().map(|&i| (i, Vec::new())).collect();

        let texts: Vec<String> = unique.values().map(|q| q.query.clone()).collect();
        let (embeddings, cache_hits) =
            embed_texts_cached(&self.provider, &self.cache, &texts).await;
        diagnostics.cache_hits = cache_hits;
        diagnostics.embedded = texts.len() - cache_hits;

        let semaphore = Arc::new(Semaphore::new(
            self.cfg.max_concurrency.min(unique.len()).max(1),
        ));
        let mut join_set: JoinSet<(i64, Result<Vec<Candidate>, IndexError>)> = JoinSet::new();
        let mut in_flight: std::collections::BTreeSet<i64> = std::collections::BTreeSet::new();

        for (q, embedding) in unique.values().zip(embeddings) {
            let embedding = match embedding {
                Ok(e) => e,
                Err(e) => {
                    tracing::warn!(index = q.index, error = %e, "embedding failed, sentence degraded");
                    diagnostics.failures.push((q.index, e.to_string()));
                    continue;
                }
            };

            let (padded, original_dim) = pad_to_standard(embedding.vector, self.cfg.standard_width);
            let params = SearchParams::new(q.n_results)
                .with_provider(self.provider.provider_name())
                .with_model(self.provider.model_name())
                .with_original_dim(original_dim)
                .with_exclude_ids(request.exclude_ids.clone())
                .with_set_filters(request.set_filter.clone());

            let index = Arc::clone(&self.index);
            let semaphore = Arc::clone(&semaphore);
            let sentence = q.index;
            in_flight.insert(sentence);
            join_set.spawn(async move {
                // Closed semaphore only happens on shutdown; degrade then.
                let _permit = match semaphore.acquire().await {
                    Ok(permit) => permit,
                    Err(_) => return (sentence, Ok(Vec::new())),
                };
                (sentence, index.search(&padded, &params))
            });
        }

        let deadline =
            tokio::time::Instant::now() + Duration::from_secs(self.cfg.batch_timeout_secs);
        loop {
            match tokio::time::timeout_at(deadline, join_set.join_next()).await {
                Ok(Some(Ok((sentence, Ok(candidates))))) => {
                    in_flight.remove(&sentence);
                    results.insert(sentence, candidates);
                }
                Ok(Some(Ok((sentence, Err(e))))) => {
                    in_flight.remove(&sentence);
                    match e {
                        IndexError::WidthMismatch { .. } => {
                            tracing::error!(sentence, error = %e, "search hit a width invariant violation");
                        }
                        _ => tracing::warn!(sentence, error = %e, "search failed, sentence degraded"),
                    }
                    diagnostics.failures.push((sentence, e.to_string()));
                }
                Ok(Some(Err(join_err))) => {
                    // The join error does not say which task died; whichever
                    // sentences never report back are attributed below.
                    tracing::warn!(error = %join_err, "search task aborted, sentence degraded");
                }
                Ok(None) => {
                    // Tasks that never reported back (panicked) degrade under
                    // their real sentence index.
                    for sentence in std::mem::take(&mut in_flight) {
                        diagnostics
                            .failures
                            .push((sentence, "search task failed".to_string()));
                    }
                    break;
                }
                Err(_) => {
                    tracing::warn!(
                        remaining = in_flight.len(),
                        "batch timeout, degrading unresolved sentences"
                    );
                    join_set.abort_all();
                    diagnostics.timed_out = in_flight.len();
                    break;
                }
            }
        }

        Ok((results, diagnostics))
    }

    /// Search plus allocation.
    ///
    /// Allocation is only attempted when the batch holds more than one
    /// sentence; an internal allocation failure degrades to an empty
    /// allocation with an `error` field in its metrics, while the raw
    /// similarity results still come back.
    pub async fn match_batch(
        &self,
        request: &BatchSearchRequest,
    ) -> Result<BatchOutcome, MatchError> {
        let (results, diagnostics) = self.search_batch(request).await?;

        let (allocation, allocation_metrics) = if results.len() > 1 {
            let shape = problem_shape(&results);
            tracing::debug!(
                sentences = shape.sentences,
                candidates = shape.total_candidates,
                contention = shape.contention_ratio,
                "allocating batch"
            );
            for (sentence, stats) in
                candidate_set_stats(&results, self.cfg.allocation.similarity_threshold)
            {
                if stats.filtered_count == 0 {
                    tracing::debug!(
                        sentence,
                        original = stats.original_count,
                        "no candidates clear the similarity threshold"
                    );
                }
            }

            let options = self.cfg.allocation;
            match std::panic::catch_unwind(std::panic::AssertUnwindSafe(|| {
                allocate(&results, &options)
            })) {
                Ok((assignment, metrics)) => (Some(assignment), Some(metrics)),
                Err(_) => {
                    tracing::error!("allocation failed internally, returning empty assignment");
                    let mut metrics = AllocationMetrics::empty();
                    metrics.sentences_processed = results.len();
                    metrics.error = Some("allocation failed internally".into());
                    (Some(BTreeMap::new()), Some(metrics))
                }
            }
        } else {
            (None, None)
        };

        Ok(BatchOutcome {
            results,
            allocation,
            allocation_metrics,
            diagnostics,
        })
    }
}
