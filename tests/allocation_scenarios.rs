//! Allocation behavior through the public API, using hand-built candidate
//! lists so scores are exact.

use picweave::{allocate, AllocationOptions, AllocationPhase, Candidate};
use std::collections::BTreeMap;

fn candidate(image_id: i64, similarity: f32) -> Candidate {
    Candidate {
        image_id,
        similarity,
        provider: "stub".to_string(),
        model: "stub-model".to_string(),
        description: format!("image {image_id}"),
        set_name: "test".to_string(),
        file_format: "jpg".to_string(),
    }
}

#[test]
fn contested_best_image_goes_to_stronger_sentence() {
    // Both sentences want image 1; sentence 0 wants it more. The optimizer
    // should hand 1 to sentence 0 and 2 to sentence 1 for a 1.75 total.
    let mut batch = BTreeMap::new();
    batch.insert(0, vec![candidate(1, 0.9), candidate(2, 0.6)]);
    batch.insert(1, vec![candidate(1, 0.85), candidate(2, 0.85)]);

    let (assignment, metrics) = allocate(&batch, &AllocationOptions::default());

    assert_eq!(assignment[&0].image_id, 1);
    assert_eq!(assignment[&1].image_id, 2);
    assert!((metrics.total_similarity - 1.75).abs() < 1e-6);
    assert_eq!(metrics.sentences_assigned, 2);
}

#[test]
fn below_threshold_sentence_stays_unassigned() {
    let mut batch = BTreeMap::new();
    batch.insert(0, vec![candidate(1, 0.9)]);
    batch.insert(1, vec![candidate(2, 0.05)]);

    let options = AllocationOptions::default();
    let (assignment, metrics) = allocate(&batch, &options);

    assert!(assignment.contains_key(&0));
    assert!(!assignment.contains_key(&1));
    assert_eq!(metrics.sentences_processed, 2);
    assert_eq!(metrics.sentences_assigned, 1);
    assert!((metrics.assignment_rate - 0.5).abs() < f32::EPSILON);
}

#[test]
fn duplicates_allowed_when_prevention_disabled() {
    let mut batch = BTreeMap::new();
    batch.insert(0, vec![candidate(1, 0.9)]);
    batch.insert(1, vec![candidate(1, 0.9)]);

    let options = AllocationOptions::default().with_prevent_duplicates(false);
    let (assignment, _) = allocate(&batch, &options);

    assert_eq!(assignment[&0].image_id, 1);
    assert_eq!(assignment[&1].image_id, 1);
}

#[test]
fn phase_tags_reflect_how_assignments_happened() {
    let mut batch = BTreeMap::new();
    // Clears the 0.8 bar: obvious phase.
    batch.insert(0, vec![candidate(1, 0.95)]);
    // Below the bar but above the floor: greedy phase.
    batch.insert(1, vec![candidate(2, 0.5)]);

    let (assignment, metrics) = allocate(&batch, &AllocationOptions::default());

    assert_eq!(assignment[&0].phase, AllocationPhase::Obvious);
    assert_eq!(assignment[&1].phase, AllocationPhase::Greedy);
    assert_eq!(metrics.phase_breakdown.get("obvious"), Some(&1));
    assert_eq!(metrics.phase_breakdown.get("greedy"), Some(&1));
}

#[test]
fn local_search_never_lowers_total_similarity() {
    let mut batch = BTreeMap::new();
    batch.insert(0, vec![candidate(10, 0.70), candidate(20, 0.69)]);
    batch.insert(1, vec![candidate(10, 0.75), candidate(20, 0.30)]);
    batch.insert(2, vec![candidate(30, 0.40)]);

    let no_search = AllocationOptions::default()
        .with_local_search_iterations(0)
        .with_uniqueness_bonus(0.0);
    let with_search = AllocationOptions::default()
        .with_local_search_iterations(3)
        .with_uniqueness_bonus(0.0);

    let (_, base) = allocate(&batch, &no_search);
    let (_, refined) = allocate(&batch, &with_search);
    assert!(refined.total_similarity >= base.total_similarity - 1e-6);
}
