use crate::error::ServerResult;
use crate::state::ServerState;
use axum::extract::State;
use axum::response::IntoResponse;
use axum::Json;
use matcher::{
    AllocationMetrics, Assignment, BatchSearchRequest, SearchDiagnostics, SentenceQuery,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Batch similarity request
#[derive(Debug, Deserialize)]
pub struct SimilarityBatchRequest {
    /// One query per sentence; indices are opaque caller-side keys
    pub queries: Vec<SentenceQuery>,

    /// Images to exclude from every sentence's candidates
    #[serde(default)]
    pub exclude_ids: Vec<i64>,

    /// Restrict candidates to one set or a list of sets
    #[serde(default)]
    pub set_filter: Option<SetFilter>,
}

/// A set filter given either as a single name or a list of names
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum SetFilter {
    One(String),
    Many(Vec<String>),
}

impl SetFilter {
    fn into_vec(self) -> Vec<String> {
        match self {
            SetFilter::One(s) => vec![s],
            SetFilter::Many(v) => v,
        }
    }
}

/// Batch similarity response
#[derive(Debug, Serialize)]
pub struct SimilarityBatchResponse {
    /// Ranked candidates per sentence index
    pub results: BTreeMap<i64, Vec<CandidateBody>>,

    /// One image per sentence; present only for multi-sentence batches
    #[serde(skip_serializing_if = "Option::is_none")]
    pub optimal_allocation: Option<BTreeMap<i64, Assignment>>,

    #[serde(skip_serializing_if = "Option::is_none")]
    pub allocation_metrics: Option<AllocationMetrics>,

    pub diagnostics: SearchDiagnostics,
}

/// Single candidate in the response
#[derive(Debug, Serialize)]
pub struct CandidateBody {
    pub id: i64,
    pub similarity: f32,
    pub description: String,
    pub set_name: String,
    pub file_format: String,
}

impl From<index::Candidate> for CandidateBody {
    fn from(c: index::Candidate) -> Self {
        Self {
            id: c.image_id,
            similarity: c.similarity,
            description: c.description,
            set_name: c.set_name,
            file_format: c.file_format,
        }
    }
}

/// Match a batch of sentences against the image library.
///
/// Every sentence gets a ranked candidate list; batches with more than one
/// sentence also get a duplicate-free allocation with quality metrics.
/// Structurally invalid requests (empty queries, non-positive `n_results`)
/// are rejected with 400 before any search work; per-sentence failures and
/// timeouts degrade that sentence to an empty list instead of failing the
/// call.
pub async fn similarity_batch(
    State(state): State<Arc<ServerState>>,
    Json(request): Json<SimilarityBatchRequest>,
) -> ServerResult<impl IntoResponse> {
    let set_filter = request.set_filter.map(SetFilter::into_vec).unwrap_or_default();
    let batch = BatchSearchRequest::new(request.queries)
        .with_exclude_ids(request.exclude_ids)
        .with_set_filter(set_filter);

    metrics::counter!("picweave_similarity_batches_total").increment(1);
    metrics::histogram!("picweave_similarity_batch_sentences")
        .record(batch.queries.len() as f64);

    let outcome = state.matcher.match_batch(&batch).await?;

    let results = outcome
        .results
        .into_iter()
        .map(|(idx, candidates)| {
            (idx, candidates.into_iter().map(CandidateBody::from).collect())
        })
        .collect();

    Ok(Json(SimilarityBatchResponse {
        results,
        optimal_allocation: outcome.allocation,
        allocation_metrics: outcome.allocation_metrics,
        diagnostics: outcome.diagnostics,
    }))
}
