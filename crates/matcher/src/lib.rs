//! Picweave Matching Layer
//!
//! Takes a batch of sentences, finds candidate images for each one by
//! similarity search, then solves the assignment problem: which image should
//! illustrate which sentence so that no image is reused and the batch as a
//! whole scores as high as possible.
//!
//! The allocation algorithm runs in three phases (obvious claims, greedy with
//! a uniqueness bonus, fallback) followed by a pairwise-swap local search.
//! It is pure and deterministic: the same candidates and options always
//! produce the same assignment.
//!
//! [`BatchMatcher`] is the orchestration entry point; [`allocate`] is the
//! bare optimizer for callers that already have candidate lists.

pub mod alloc;
pub mod metrics;
pub mod types;

mod engine;

pub use crate::alloc::allocate;
pub use crate::engine::{BatchMatcher, BatchOutcome, BatchSearchRequest, SearchDiagnostics};
pub use crate::metrics::{candidate_set_stats, problem_shape, CandidateSetStats, ProblemShape};
pub use crate::types::{
    AllocationMetrics, AllocationOptions, AllocationPhase, Assignment, MatchError, MatcherConfig,
    SentenceQuery,
};
