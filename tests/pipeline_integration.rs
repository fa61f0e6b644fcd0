//! End-to-end tests over the stub-provider pipeline: insert images, run
//! batch matching, check the allocation contract.

use picweave::{
    BatchSearchRequest, Pipeline, PicweaveConfig, SentenceQuery,
};
use std::collections::BTreeSet;

fn small_config() -> PicweaveConfig {
    let mut cfg = PicweaveConfig::default();
    cfg.embedding.dimension = 16;
    cfg.matcher.standard_width = 32;
    cfg
}

async fn seeded_pipeline() -> Pipeline {
    let pipeline = Pipeline::build(&small_config()).unwrap();
    let images = [
        (1, "nature", "a dog running on a beach"),
        (2, "nature", "a snowy mountain at dawn"),
        (3, "urban", "a rainy city street at night"),
        (4, "urban", "a crowded subway platform"),
        (5, "food", "a bowl of ramen with egg"),
    ];
    for (id, set, description) in images {
        pipeline.add_image(id, set, description).await.unwrap();
    }
    pipeline
}

#[tokio::test]
async fn full_batch_assigns_distinct_images() {
    let pipeline = seeded_pipeline().await;

    let outcome = pipeline
        .illustrate_sentences(vec![
            SentenceQuery::new(0, "a dog running on a beach", 5),
            SentenceQuery::new(1, "a snowy mountain at dawn", 5),
            SentenceQuery::new(2, "a rainy city street at night", 5),
        ])
        .await
        .unwrap();

    let allocation = outcome.allocation.expect("multi-sentence allocation");
    assert_eq!(allocation.len(), 3);

    let assigned: BTreeSet<i64> = allocation.values().map(|a| a.image_id).collect();
    assert_eq!(assigned.len(), 3, "no image may be reused");

    // Each sentence should get the image whose description it repeats.
    assert_eq!(allocation[&0].image_id, 1);
    assert_eq!(allocation[&1].image_id, 2);
    assert_eq!(allocation[&2].image_id, 3);

    let metrics = outcome.allocation_metrics.expect("metrics");
    assert!((metrics.assignment_rate - 1.0).abs() < f32::EPSILON);
    assert!(metrics.total_similarity > 2.9);
}

#[tokio::test]
async fn single_sentence_gets_candidates_but_no_allocation() {
    let pipeline = seeded_pipeline().await;

    let outcome = pipeline
        .illustrate_sentences(vec![SentenceQuery::new(7, "a bowl of ramen with egg", 3)])
        .await
        .unwrap();

    assert!(outcome.allocation.is_none());
    assert!(outcome.allocation_metrics.is_none());
    let candidates = &outcome.results[&7];
    assert!(!candidates.is_empty());
    assert_eq!(candidates[0].image_id, 5);
}

#[tokio::test]
async fn set_filter_and_exclusions_flow_through() {
    let pipeline = seeded_pipeline().await;

    let request = BatchSearchRequest::new(vec![
        SentenceQuery::new(0, "a rainy city street at night", 5),
        SentenceQuery::new(1, "a crowded subway platform", 5),
    ])
    .with_set_filter(vec!["urban".to_string()]);

    let outcome = pipeline.illustrate_with_filters(&request).await.unwrap();
    for candidates in outcome.results.values() {
        for c in candidates {
            assert_eq!(c.set_name, "urban");
        }
    }

    let excluded = BatchSearchRequest::new(vec![SentenceQuery::new(
        0,
        "a rainy city street at night",
        5,
    )])
    .with_exclude_ids(vec![3]);
    let outcome = pipeline.illustrate_with_filters(&excluded).await.unwrap();
    assert!(outcome.results[&0].iter().all(|c| c.image_id != 3));
}

#[tokio::test]
async fn empty_batch_is_rejected_up_front() {
    let pipeline = seeded_pipeline().await;
    let err = pipeline.illustrate_sentences(Vec::new()).await.unwrap_err();
    assert!(err.to_string().contains("queries"));
}

#[tokio::test]
async fn sparse_sentence_indices_are_preserved() {
    let pipeline = seeded_pipeline().await;

    let outcome = pipeline
        .illustrate_sentences(vec![
            SentenceQuery::new(-5, "a dog running on a beach", 3),
            SentenceQuery::new(99, "a snowy mountain at dawn", 3),
        ])
        .await
        .unwrap();

    let keys: Vec<i64> = outcome.results.keys().copied().collect();
    assert_eq!(keys, vec![-5, 99]);
    let allocation = outcome.allocation.unwrap();
    assert!(allocation.contains_key(&-5));
    assert!(allocation.contains_key(&99));
}

#[tokio::test]
async fn repeated_batches_are_deterministic() {
    let pipeline = seeded_pipeline().await;
    let queries = vec![
        SentenceQuery::new(0, "a dog near the water", 5),
        SentenceQuery::new(1, "mountains in the morning", 5),
        SentenceQuery::new(2, "city streets after rain", 5),
    ];

    let first = pipeline
        .illustrate_sentences(queries.clone())
        .await
        .unwrap();
    for _ in 0..3 {
        let next = pipeline
            .illustrate_sentences(queries.clone())
            .await
            .unwrap();
        assert_eq!(first.allocation, next.allocation);
    }
}
