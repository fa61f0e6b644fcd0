//! Problem-shape statistics for allocation observability.

use std::collections::{BTreeMap, BTreeSet};

use index::Candidate;
use serde::{Deserialize, Serialize};

/// Shape of one allocation problem, computed before the optimizer runs.
///
/// Used for logging and tuning: a contention ratio near 1.0 means every
/// sentence wants the same few images and the greedy phases will have to
/// make real trade-offs.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ProblemShape {
    pub sentences: usize,
    pub total_candidates: usize,
    pub distinct_images: usize,
    pub avg_candidates_per_sentence: f32,
    /// `1 - distinct_images / total_candidates`; zero when every candidate
    /// list is disjoint.
    pub contention_ratio: f32,
}

/// Compute the shape of a candidate batch.
pub fn problem_shape(per_sentence: &BTreeMap<i64, Vec<Candidate>>) -> ProblemShape {
    let sentences = per_sentence.len();
    let total_candidates: usize = per_sentence.values().map(|c| c.len()).sum();
    let distinct_images: BTreeSet<i64> = per_sentence
        .values()
        .flatten()
        .map(|c| c.image_id)
        .collect();
    let distinct = distinct_images.len();

    ProblemShape {
        sentences,
        total_candidates,
        distinct_images: distinct,
        avg_candidates_per_sentence: if sentences == 0 {
            0.0
        } else {
            total_candidates as f32 / sentences as f32
        },
        contention_ratio: if total_candidates == 0 {
            0.0
        } else {
            1.0 - distinct as f32 / total_candidates as f32
        },
    }
}

/// How much of one sentence's candidate list survives threshold filtering.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
pub struct CandidateSetStats {
    pub original_count: usize,
    pub filtered_count: usize,
}

/// Per-sentence survival counts under `similarity_threshold`.
///
/// A sentence whose `filtered_count` is zero cannot be assigned no matter
/// what the optimizer does, which makes this the first thing to check when
/// an assignment rate looks low.
pub fn candidate_set_stats(
    per_sentence: &BTreeMap<i64, Vec<Candidate>>,
    similarity_threshold: f32,
) -> BTreeMap<i64, CandidateSetStats> {
    per_sentence
        .iter()
        .map(|(&sentence, candidates)| {
            let filtered = candidates
                .iter()
                .filter(|c| c.similarity.is_finite() && c.similarity >= similarity_threshold)
                .count();
            (
                sentence,
                CandidateSetStats {
                    original_count: candidates.len(),
                    filtered_count: filtered,
                },
            )
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(image_id: i64) -> Candidate {
        Candidate {
            image_id,
            similarity: 0.5,
            provider: "stub".into(),
            model: "stub-model".into(),
            description: String::new(),
            set_name: "test".into(),
            file_format: "jpg".into(),
        }
    }

    #[test]
    fn empty_batch_zero_shape() {
        let shape = problem_shape(&BTreeMap::new());
        assert_eq!(shape.sentences, 0);
        assert_eq!(shape.total_candidates, 0);
        assert_eq!(shape.avg_candidates_per_sentence, 0.0);
        assert_eq!(shape.contention_ratio, 0.0);
    }

    #[test]
    fn disjoint_lists_have_zero_contention() {
        let batch: BTreeMap<i64, Vec<Candidate>> = vec![
            (0, vec![cand(1), cand(2)]),
            (1, vec![cand(3), cand(4)]),
        ]
        .into_iter()
        .collect();

        let shape = problem_shape(&batch);
        assert_eq!(shape.sentences, 2);
        assert_eq!(shape.total_candidates, 4);
        assert_eq!(shape.distinct_images, 4);
        assert_eq!(shape.contention_ratio, 0.0);
        assert!((shape.avg_candidates_per_sentence - 2.0).abs() < f32::EPSILON);
    }

    #[test]
    fn candidate_stats_count_threshold_survivors() {
        let mut weak = cand(5);
        weak.similarity = 0.02;
        let mut nan = cand(6);
        nan.similarity = f32::NAN;
        let batch: BTreeMap<i64, Vec<Candidate>> = vec![
            (0, vec![cand(1), weak, nan]),
            (1, vec![]),
        ]
        .into_iter()
        .collect();

        let stats = candidate_set_stats(&batch, 0.1);
        assert_eq!(stats[&0].original_count, 3);
        assert_eq!(stats[&0].filtered_count, 1);
        assert_eq!(stats[&1].original_count, 0);
        assert_eq!(stats[&1].filtered_count, 0);
    }

    #[test]
    fn shared_images_raise_contention() {
        let batch: BTreeMap<i64, Vec<Candidate>> = vec![
            (0, vec![cand(1), cand(2)]),
            (1, vec![cand(1), cand(2)]),
        ]
        .into_iter()
        .collect();

        let shape = problem_shape(&batch);
        assert_eq!(shape.distinct_images, 2);
        assert!((shape.contention_ratio - 0.5).abs() < f32::EPSILON);
    }
}
