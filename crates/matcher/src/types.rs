use index::IndexError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use thiserror::Error;

use embedding::{EmbeddingError, DEFAULT_STANDARD_WIDTH};

/// One sentence to find an illustration for.
///
/// Indices are caller-supplied opaque keys. They may be sparse or arrive out
/// of order; the matcher never renumbers them.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SentenceQuery {
    /// Caller-side sentence index.
    pub index: i64,
    /// The sentence text to embed and search with.
    pub query: String,
    /// How many candidates to return for this sentence.
    pub n_results: usize,
}

impl SentenceQuery {
    pub fn new(index: i64, query: impl Into<String>, n_results: usize) -> Self {
        Self {
            index,
            query: query.into(),
            n_results,
        }
    }
}

/// Which allocation phase produced an assignment. Diagnostic only.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum AllocationPhase {
    /// Best candidate cleared the high-similarity bar.
    Obvious,
    /// Picked by combined score in the greedy pass.
    Greedy,
    /// Last-resort best available candidate.
    Fallback,
    /// Improved by a pairwise swap after the phases.
    LocalSearch,
}

impl AllocationPhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            AllocationPhase::Obvious => "obvious",
            AllocationPhase::Greedy => "greedy",
            AllocationPhase::Fallback => "fallback",
            AllocationPhase::LocalSearch => "local_search",
        }
    }
}

/// Final pick for one sentence.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct Assignment {
    pub image_id: i64,
    pub similarity: f32,
    /// Phase that produced this pick.
    #[serde(rename = "algorithm_phase")]
    pub phase: AllocationPhase,
}

/// Tuning knobs for the allocation optimizer.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq)]
pub struct AllocationOptions {
    /// Reject assignments that reuse an image across sentences.
    #[serde(default = "AllocationOptions::default_prevent_duplicates")]
    pub prevent_duplicates: bool,
    /// Candidates below this similarity are dropped before allocation.
    #[serde(default = "AllocationOptions::default_similarity_threshold")]
    pub similarity_threshold: f32,
    /// Best candidates at or above this bar are claimed in the obvious phase.
    #[serde(default = "AllocationOptions::default_high_similarity_threshold")]
    pub high_similarity_threshold: f32,
    /// Score boost for images wanted by fewer sentences:
    /// `combined = similarity + uniqueness_bonus / usage_count`.
    #[serde(default = "AllocationOptions::default_uniqueness_bonus")]
    pub uniqueness_bonus: f32,
    /// Maximum pairwise-swap refinement passes. Zero disables local search.
    #[serde(default = "AllocationOptions::default_local_search_iterations")]
    pub local_search_iterations: usize,
}

impl AllocationOptions {
    pub(crate) fn default_prevent_duplicates() -> bool {
        true
    }

    pub(crate) fn default_similarity_threshold() -> f32 {
        0.1
    }

    pub(crate) fn default_high_similarity_threshold() -> f32 {
        0.8
    }

    pub(crate) fn default_uniqueness_bonus() -> f32 {
        0.1
    }

    pub(crate) fn default_local_search_iterations() -> usize {
        3
    }

    pub fn with_prevent_duplicates(mut self, prevent: bool) -> Self {
        self.prevent_duplicates = prevent;
        self
    }

    pub fn with_similarity_threshold(mut self, threshold: f32) -> Self {
        self.similarity_threshold = threshold;
        self
    }

    pub fn with_high_similarity_threshold(mut self, threshold: f32) -> Self {
        self.high_similarity_threshold = threshold;
        self
    }

    pub fn with_uniqueness_bonus(mut self, bonus: f32) -> Self {
        self.uniqueness_bonus = bonus;
        self
    }

    pub fn with_local_search_iterations(mut self, iterations: usize) -> Self {
        self.local_search_iterations = iterations;
        self
    }
}

impl Default for AllocationOptions {
    fn default() -> Self {
        Self {
            prevent_duplicates: Self::default_prevent_duplicates(),
            similarity_threshold: Self::default_similarity_threshold(),
            high_similarity_threshold: Self::default_high_similarity_threshold(),
            uniqueness_bonus: Self::default_uniqueness_bonus(),
            local_search_iterations: Self::default_local_search_iterations(),
        }
    }
}

/// Quality summary of one allocation run.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct AllocationMetrics {
    /// Name of the algorithm, fixed at `"three_phase_greedy"`.
    pub algorithm: String,
    pub total_similarity: f32,
    pub average_similarity: f32,
    pub sentences_processed: usize,
    pub sentences_assigned: usize,
    /// `sentences_assigned / sentences_processed`, in `[0, 1]`.
    pub assignment_rate: f32,
    /// How many assignments each phase produced.
    pub phase_breakdown: BTreeMap<String, usize>,
    /// Populated when allocation itself failed and an empty assignment was
    /// returned in its place.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl AllocationMetrics {
    pub(crate) fn empty() -> Self {
        Self {
            algorithm: "three_phase_greedy".into(),
            total_similarity: 0.0,
            average_similarity: 0.0,
            sentences_processed: 0,
            sentences_assigned: 0,
            assignment_rate: 0.0,
            phase_breakdown: BTreeMap::new(),
            error: None,
        }
    }
}

/// Configuration for the batch matcher.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct MatcherConfig {
    /// Upper bound on concurrent similarity searches.
    #[serde(default = "MatcherConfig::default_max_concurrency")]
    pub max_concurrency: usize,
    /// Wall-clock budget for a whole batch. Sentences still unresolved when
    /// it expires degrade to empty candidate lists.
    #[serde(default = "MatcherConfig::default_batch_timeout_secs")]
    pub batch_timeout_secs: u64,
    /// Width query vectors are padded to before hitting the index.
    #[serde(default = "MatcherConfig::default_standard_width")]
    pub standard_width: usize,
    /// Allocation tuning.
    #[serde(default)]
    pub allocation: AllocationOptions,
}

impl MatcherConfig {
    pub(crate) fn default_max_concurrency() -> usize {
        8
    }

    pub(crate) fn default_batch_timeout_secs() -> u64 {
        30
    }

    pub(crate) fn default_standard_width() -> usize {
        DEFAULT_STANDARD_WIDTH
    }

    pub fn validate(&self) -> Result<(), MatchError> {
        if self.max_concurrency == 0 {
            return Err(MatchError::InvalidConfig(
                "max_concurrency must be non-zero".into(),
            ));
        }
        if self.standard_width == 0 {
            return Err(MatchError::InvalidConfig(
                "standard_width must be non-zero".into(),
            ));
        }
        Ok(())
    }
}

impl Default for MatcherConfig {
    fn default() -> Self {
        Self {
            max_concurrency: Self::default_max_concurrency(),
            batch_timeout_secs: Self::default_batch_timeout_secs(),
            standard_width: Self::default_standard_width(),
            allocation: AllocationOptions::default(),
        }
    }
}

/// Errors surfaced by the matching layer.
#[derive(Debug, Error, Clone)]
pub enum MatchError {
    /// Matcher configuration is inconsistent.
    #[error("invalid matcher config: {0}")]
    InvalidConfig(String),
    /// A request was structurally invalid (empty queries, bad n_results).
    #[error("invalid query: {0}")]
    InvalidQuery(String),
    /// The index rejected a query.
    #[error("index error: {0}")]
    Index(String),
    /// Embedding generation failed for the whole batch.
    #[error("embedding error: {0}")]
    Embedding(String),
}

impl From<IndexError> for MatchError {
    fn from(e: IndexError) -> Self {
        MatchError::Index(e.to_string())
    }
}

impl From<EmbeddingError> for MatchError {
    fn from(e: EmbeddingError) -> Self {
        MatchError::Embedding(e.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn allocation_options_defaults() {
        let opts = AllocationOptions::default();
        assert!(opts.prevent_duplicates);
        assert!((opts.similarity_threshold - 0.1).abs() < f32::EPSILON);
        assert!((opts.high_similarity_threshold - 0.8).abs() < f32::EPSILON);
        assert!((opts.uniqueness_bonus - 0.1).abs() < f32::EPSILON);
        assert_eq!(opts.local_search_iterations, 3);
    }

    #[test]
    fn matcher_config_defaults_validate() {
        let cfg = MatcherConfig::default();
        assert_eq!(cfg.max_concurrency, 8);
        assert_eq!(cfg.batch_timeout_secs, 30);
        assert_eq!(cfg.standard_width, DEFAULT_STANDARD_WIDTH);
        assert!(cfg.validate().is_ok());
    }

    #[test]
    fn matcher_config_rejects_zero_concurrency() {
        let cfg = MatcherConfig {
            max_concurrency: 0,
            ..Default::default()
        };
        assert!(matches!(
            cfg.validate(),
            Err(MatchError::InvalidConfig(_))
        ));
    }

    #[test]
    fn allocation_options_serde_fills_defaults() {
        let opts: AllocationOptions = serde_json::from_str("{}").unwrap();
        assert_eq!(opts, AllocationOptions::default());

        let opts: AllocationOptions =
            serde_json::from_str(r#"{"prevent_duplicates": false}"#).unwrap();
        assert!(!opts.prevent_duplicates);
        assert!((opts.similarity_threshold - 0.1).abs() < f32::EPSILON);
    }

    #[test]
    fn phase_serializes_snake_case() {
        let json = serde_json::to_string(&AllocationPhase::LocalSearch).unwrap();
        assert_eq!(json, "\"local_search\"");
        assert_eq!(AllocationPhase::Greedy.as_str(), "greedy");
    }

    #[test]
    fn assignment_serde_uses_algorithm_phase_key() {
        let a = Assignment {
            image_id: 3,
            similarity: 0.5,
            phase: AllocationPhase::Obvious,
        };
        let json = serde_json::to_value(&a).unwrap();
        assert_eq!(json["algorithm_phase"], "obvious");
        assert_eq!(json["image_id"], 3);
    }

    #[test]
    fn match_error_from_index_error() {
        let err: MatchError = IndexError::WidthMismatch {
            expected: 4,
            got: 2,
        }
        .into();
        assert!(err.to_string().contains("width mismatch"));
    }
}
