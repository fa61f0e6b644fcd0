//! Batch image allocation.
//!
//! Takes the per-sentence candidate lists produced by the batch search and
//! picks one image per sentence so that total similarity is high and, under
//! the default policy, no image is used twice. Exact optimal assignment is
//! out of scope; this is a three-phase greedy pass with pairwise-swap
//! refinement, which lands close to optimal on real candidate sets at a
//! fraction of the cost.
//!
//! The whole module is pure and single-threaded: identical inputs and options
//! always produce identical assignments and metrics. Every sort carries an
//! explicit tie-break so no ordering depends on map iteration order.

use std::cmp::Ordering;
use std::collections::{BTreeMap, BTreeSet};

use index::Candidate;

use crate::types::{AllocationMetrics, AllocationOptions, AllocationPhase, Assignment};

/// One surviving candidate after threshold filtering.
#[derive(Debug, Clone, Copy)]
struct Surviving {
    image_id: i64,
    similarity: f32,
}

/// Allocate one image per sentence from ranked candidate lists.
///
/// Sentences whose candidates all fall below the similarity threshold stay
/// unassigned; that is reflected in the metrics, never raised as an error.
pub fn allocate(
    per_sentence: &BTreeMap<i64, Vec<Candidate>>,
    options: &AllocationOptions,
) -> (BTreeMap<i64, Assignment>, AllocationMetrics) {
    let mut metrics = AllocationMetrics::empty();
    metrics.sentences_processed = per_sentence.len();

    if per_sentence.is_empty() {
        return (BTreeMap::new(), metrics);
    }

    // 1. Filter and order. Candidates below the threshold or with a
    // non-finite similarity are dropped; each list is sorted by similarity
    // descending with image id as the tie-break.
    let mut surviving: BTreeMap<i64, Vec<Surviving>> = BTreeMap::new();
    for (&sentence, candidates) in per_sentence {
        let mut kept: Vec<Surviving> = candidates
            .iter()
            .filter(|c| {
                if !c.similarity.is_finite() {
                    tracing::warn!(sentence, image_id = c.image_id, "skipping non-finite similarity");
                    return false;
                }
                c.similarity >= options.similarity_threshold
            })
            .map(|c| Surviving {
                image_id: c.image_id,
                similarity: c.similarity,
            })
            .collect();
        kept.sort_by(|a, b| {
            b.similarity
                .partial_cmp(&a.similarity)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.image_id.cmp(&b.image_id))
        });
        surviving.insert(sentence, kept);
    }

    // Sentences with fewer options commit first; they have the least room to
    // be satisfied later.
    let mut order: Vec<i64> = surviving.keys().copied().collect();
    order.sort_by_key(|s| (surviving[s].len(), *s));

    let mut assignments: BTreeMap<i64, Assignment> = BTreeMap::new();
    let mut used_images: BTreeSet<i64> = BTreeSet::new();

    let image_blocked = |used: &BTreeSet<i64>, image_id: i64| -> bool {
        options.prevent_duplicates && used.contains(&image_id)
    };

    // 2. Obvious phase. Claims are gathered first and committed in
    // similarity order, so when two sentences want the same obviously-good
    // image the better match wins and the loser re-enters the greedy phase.
    let mut claims: Vec<(i64, Surviving)> = Vec::new();
    for &sentence in &order {
        if let Some(best) = surviving[&sentence].first() {
            if best.similarity >= options.high_similarity_threshold {
                claims.push((sentence, *best));
            }
        }
    }
    claims.sort_by(|a, b| {
        b.1.similarity
            .partial_cmp(&a.1.similarity)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.0.cmp(&b.0))
    });
    for (sentence, pick) in claims {
        if assignments.contains_key(&sentence) || image_blocked(&used_images, pick.image_id) {
            continue;
        }
        used_images.insert(pick.image_id);
        assignments.insert(
            sentence,
            Assignment {
                image_id: pick.image_id,
                similarity: pick.similarity,
                phase: AllocationPhase::Obvious,
            },
        );
    }

    // 3. Smart greedy phase. usage_count is how many still-unassigned
    // sentences list the image at all, so images wanted by fewer sentences
    // get a boost and contention spreads out.
    let mut usage_count: BTreeMap<i64, usize> = BTreeMap::new();
    for (&sentence, kept) in &surviving {
        if assignments.contains_key(&sentence) {
            continue;
        }
        for s in kept {
            *usage_count.entry(s.image_id).or_insert(0) += 1;
        }
    }

    let mut pairs: Vec<(f32, i64, Surviving)> = Vec::new();
    for (&sentence, kept) in &surviving {
        if assignments.contains_key(&sentence) {
            continue;
        }
        for s in kept {
            let count = usage_count.get(&s.image_id).copied().unwrap_or(1).max(1);
            let combined = s.similarity + options.uniqueness_bonus / count as f32;
            pairs.push((combined, sentence, *s));
        }
    }
    pairs.sort_by(|a, b| {
        b.0.partial_cmp(&a.0)
            .unwrap_or(Ordering::Equal)
            .then_with(|| a.1.cmp(&b.1))
            .then_with(|| a.2.image_id.cmp(&b.2.image_id))
    });
    for (_combined, sentence, pick) in pairs {
        if assignments.contains_key(&sentence) || image_blocked(&used_images, pick.image_id) {
            continue;
        }
        used_images.insert(pick.image_id);
        assignments.insert(
            sentence,
            Assignment {
                image_id: pick.image_id,
                similarity: pick.similarity,
                phase: AllocationPhase::Greedy,
            },
        );
    }

    // 4. Fallback phase. Anything still unassigned takes its best remaining
    // candidate, or its best candidate outright when duplicates are allowed.
    for (&sentence, kept) in &surviving {
        if assignments.contains_key(&sentence) {
            continue;
        }
        let pick = kept
            .iter()
            .find(|s| !image_blocked(&used_images, s.image_id));
        if let Some(pick) = pick {
            used_images.insert(pick.image_id);
            assignments.insert(
                sentence,
                Assignment {
                    image_id: pick.image_id,
                    similarity: pick.similarity,
                    phase: AllocationPhase::Fallback,
                },
            );
        }
    }

    // 5. Local search. Pairwise swaps only, accepted only when the summed
    // similarity strictly improves; stops at the first pass with no change.
    if options.local_search_iterations > 0 {
        let lookup: BTreeMap<i64, BTreeMap<i64, f32>> = surviving
            .iter()
            .map(|(&sentence, kept)| {
                (
                    sentence,
                    kept.iter().map(|s| (s.image_id, s.similarity)).collect(),
                )
            })
            .collect();

        let assigned_ids: Vec<i64> = assignments.keys().copied().collect();
        for _ in 0..options.local_search_iterations {
            let mut improved = false;
            for i in 0..assigned_ids.len() {
                for j in (i + 1)..assigned_ids.len() {
                    let (a, b) = (assigned_ids[i], assigned_ids[j]);
                    let (a_img, a_sim) = {
                        let cur = &assignments[&a];
                        (cur.image_id, cur.similarity)
                    };
                    let (b_img, b_sim) = {
                        let cur = &assignments[&b];
                        (cur.image_id, cur.similarity)
                    };

                    let a_gets = lookup[&a].get(&b_img).copied();
                    let b_gets = lookup[&b].get(&a_img).copied();
                    if let (Some(a_new), Some(b_new)) = (a_gets, b_gets) {
                        if a_new + b_new > a_sim + b_sim {
                            assignments.insert(
                                a,
                                Assignment {
                                    image_id: b_img,
                                    similarity: a_new,
                                    phase: AllocationPhase::LocalSearch,
                                },
                            );
                            assignments.insert(
                                b,
                                Assignment {
                                    image_id: a_img,
                                    similarity: b_new,
                                    phase: AllocationPhase::LocalSearch,
                                },
                            );
                            improved = true;
                        }
                    }
                }
            }
            if !improved {
                break;
            }
        }
    }

    // 6. Metrics.
    metrics.sentences_assigned = assignments.len();
    metrics.total_similarity = assignments.values().map(|a| a.similarity).sum();
    metrics.average_similarity = if assignments.is_empty() {
        0.0
    } else {
        metrics.total_similarity / assignments.len() as f32
    };
    metrics.assignment_rate = if metrics.sentences_processed == 0 {
        0.0
    } else {
        metrics.sentences_assigned as f32 / metrics.sentences_processed as f32
    };
    for a in assignments.values() {
        *metrics
            .phase_breakdown
            .entry(a.phase.as_str().to_string())
            .or_insert(0) += 1;
    }

    (assignments, metrics)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn cand(image_id: i64, similarity: f32) -> Candidate {
        Candidate {
            image_id,
            similarity,
            provider: "stub".into(),
            model: "stub-model".into(),
            description: format!("image {image_id}"),
            set_name: "test".into(),
            file_format: "jpg".into(),
        }
    }

    fn batch(entries: Vec<(i64, Vec<Candidate>)>) -> BTreeMap<i64, Vec<Candidate>> {
        entries.into_iter().collect()
    }

    #[test]
    fn empty_input_empty_output() {
        let (assignments, metrics) = allocate(&BTreeMap::new(), &AllocationOptions::default());
        assert!(assignments.is_empty());
        assert_eq!(metrics.sentences_processed, 0);
        assert_eq!(metrics.assignment_rate, 0.0);
        assert!(metrics.error.is_none());
    }

    #[test]
    fn contested_best_image_resolves_to_higher_total() {
        // Sentence 0 and 1 both like image 1 best, but giving 1 to sentence 0
        // and 2 to sentence 1 yields total 1.75 instead of an invalid
        // duplicate assignment.
        let input = batch(vec![
            (0, vec![cand(1, 0.9), cand(2, 0.7)]),
            (1, vec![cand(1, 0.6), cand(2, 0.85)]),
        ]);
        let (assignments, metrics) = allocate(&input, &AllocationOptions::default());

        assert_eq!(assignments[&0].image_id, 1);
        assert_eq!(assignments[&1].image_id, 2);
        assert!((metrics.total_similarity - 1.75).abs() < 1e-6);
        assert_eq!(metrics.sentences_assigned, 2);
        assert!((metrics.assignment_rate - 1.0).abs() < f32::EPSILON);
    }

    #[test]
    fn no_duplicates_when_prevented() {
        let input = batch(vec![
            (0, vec![cand(1, 0.9), cand(2, 0.5)]),
            (1, vec![cand(1, 0.8), cand(2, 0.4)]),
            (2, vec![cand(1, 0.7), cand(3, 0.3)]),
        ]);
        let (assignments, _) = allocate(&input, &AllocationOptions::default());

        let mut seen = BTreeSet::new();
        for a in assignments.values() {
            assert!(seen.insert(a.image_id), "image {} assigned twice", a.image_id);
        }
    }

    #[test]
    fn duplicates_allowed_when_policy_off() {
        let input = batch(vec![
            (0, vec![cand(1, 0.9)]),
            (1, vec![cand(1, 0.85)]),
        ]);
        let opts = AllocationOptions::default().with_prevent_duplicates(false);
        let (assignments, metrics) = allocate(&input, &opts);

        assert_eq!(assignments[&0].image_id, 1);
        assert_eq!(assignments[&1].image_id, 1);
        assert_eq!(metrics.sentences_assigned, 2);
    }

    #[test]
    fn below_threshold_sentence_stays_unassigned() {
        let input = batch(vec![
            (0, vec![cand(1, 0.05), cand(2, 0.02)]),
            (1, vec![cand(3, 0.6)]),
        ]);
        let (assignments, metrics) = allocate(&input, &AllocationOptions::default());

        assert!(!assignments.contains_key(&0));
        assert_eq!(assignments[&1].image_id, 3);
        assert_eq!(metrics.sentences_processed, 2);
        assert_eq!(metrics.sentences_assigned, 1);
        assert!((metrics.assignment_rate - 0.5).abs() < f32::EPSILON);
    }

    #[test]
    fn obvious_phase_tags_high_similarity_picks() {
        let input = batch(vec![
            (0, vec![cand(1, 0.95)]),
            (1, vec![cand(2, 0.3)]),
        ]);
        let (assignments, metrics) = allocate(&input, &AllocationOptions::default());

        assert_eq!(assignments[&0].phase, AllocationPhase::Obvious);
        assert_eq!(assignments[&1].phase, AllocationPhase::Greedy);
        assert_eq!(metrics.phase_breakdown.get("obvious"), Some(&1));
        assert_eq!(metrics.phase_breakdown.get("greedy"), Some(&1));
    }

    #[test]
    fn obvious_contention_loser_reenters_greedy() {
        // Both sentences clear the high bar with image 1; sentence 1 is the
        // better match so it wins, and sentence 0 falls through to image 2.
        let input = batch(vec![
            (0, vec![cand(1, 0.85), cand(2, 0.5)]),
            (1, vec![cand(1, 0.95), cand(3, 0.2)]),
        ]);
        let (assignments, _) = allocate(&input, &AllocationOptions::default());

        assert_eq!(assignments[&1].image_id, 1);
        assert_eq!(assignments[&1].phase, AllocationPhase::Obvious);
        assert_eq!(assignments[&0].image_id, 2);
        assert_eq!(assignments[&0].phase, AllocationPhase::Greedy);
    }

    #[test]
    fn uniqueness_bonus_spreads_contention() {
        // Image 1 is listed by both sentences, image 2 only by sentence 0.
        // Similarities are close, so the bonus pushes sentence 0 onto the
        // less contested image 2, leaving image 1 free for sentence 1.
        let input = batch(vec![
            (0, vec![cand(1, 0.50), cand(2, 0.48)]),
            (1, vec![cand(1, 0.50)]),
        ]);
        let (assignments, metrics) = allocate(&input, &AllocationOptions::default());

        assert_eq!(assignments[&0].image_id, 2);
        assert_eq!(assignments[&1].image_id, 1);
        assert_eq!(metrics.sentences_assigned, 2);
    }

    #[test]
    fn fallback_leaves_oversubscribed_sentences_unassigned() {
        // Three sentences, one image. Only one sentence can be assigned.
        let input = batch(vec![
            (0, vec![cand(1, 0.6)]),
            (1, vec![cand(1, 0.5)]),
            (2, vec![cand(1, 0.4)]),
        ]);
        let (assignments, metrics) = allocate(&input, &AllocationOptions::default());

        assert_eq!(assignments.len(), 1);
        assert_eq!(metrics.sentences_assigned, 1);
        assert!(metrics.assignment_rate < 1.0);
    }

    #[test]
    fn local_search_improves_crossed_assignment() {
        // Greedy grabs (0, img 10) at 0.70 first, pushing sentence 1 onto
        // img 20 at 0.30 for a total of 1.00; swapping yields 1.29.
        let input = batch(vec![
            (0, vec![cand(10, 0.70), cand(20, 0.69)]),
            (1, vec![cand(10, 0.60), cand(20, 0.30)]),
        ]);
        let opts = AllocationOptions::default().with_uniqueness_bonus(0.0);
        let (assignments, metrics) = allocate(&input, &opts);

        assert_eq!(assignments[&0].image_id, 20);
        assert_eq!(assignments[&1].image_id, 10);
        assert_eq!(assignments[&0].phase, AllocationPhase::LocalSearch);
        assert!((metrics.total_similarity - 1.29).abs() < 1e-6);
    }

    #[test]
    fn local_search_is_non_regressive() {
        let input = batch(vec![
            (0, vec![cand(1, 0.9), cand(2, 0.8), cand(3, 0.7)]),
            (1, vec![cand(1, 0.85), cand(2, 0.6), cand(3, 0.5)]),
            (2, vec![cand(2, 0.75), cand(3, 0.65)]),
        ]);
        let without = AllocationOptions::default().with_local_search_iterations(0);
        let with = AllocationOptions::default();

        let (_, before) = allocate(&input, &without);
        let (_, after) = allocate(&input, &with);
        assert!(after.total_similarity >= before.total_similarity - 1e-6);
    }

    #[test]
    fn deterministic_across_calls() {
        let input = batch(vec![
            (0, vec![cand(1, 0.5), cand(2, 0.5), cand(3, 0.5)]),
            (1, vec![cand(1, 0.5), cand(2, 0.5)]),
            (2, vec![cand(2, 0.5), cand(3, 0.5)]),
        ]);
        let opts = AllocationOptions::default();

        let (a1, m1) = allocate(&input, &opts);
        for _ in 0..10 {
            let (a2, m2) = allocate(&input, &opts);
            assert_eq!(a1, a2);
            assert_eq!(m1, m2);
        }
    }

    #[test]
    fn non_finite_similarity_skipped() {
        let input = batch(vec![(0, vec![cand(1, f32::NAN), cand(2, 0.6)])]);
        let (assignments, _) = allocate(&input, &AllocationOptions::default());
        assert_eq!(assignments[&0].image_id, 2);
    }

    #[test]
    fn similarities_stay_in_unit_range() {
        let input = batch(vec![
            (0, vec![cand(1, 1.0), cand(2, 0.0)]),
            (1, vec![cand(2, 0.5)]),
        ]);
        let (assignments, _) = allocate(&input, &AllocationOptions::default());
        for a in assignments.values() {
            assert!((0.0..=1.0).contains(&a.similarity));
        }
    }

    #[test]
    fn sparse_sentence_indices_preserved() {
        let input = batch(vec![
            (42, vec![cand(1, 0.9)]),
            (7, vec![cand(2, 0.8)]),
            (-3, vec![cand(3, 0.7)]),
        ]);
        let (assignments, _) = allocate(&input, &AllocationOptions::default());
        let keys: Vec<i64> = assignments.keys().copied().collect();
        assert_eq!(keys, vec![-3, 7, 42]);
    }
}
