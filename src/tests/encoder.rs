//! Encoder and threshold properties over a varied set of inputs.

use std::collections::HashSet;

use crate::corpus::seed_records;
use crate::retrieval::{evaluate, RetrievalHit, SparseEncoder};

const TEXTS: &[&str] = &[
    "Lemon-garlic shrimp tossed with linguine",
    "salmon salmon salmon",
    "Crème brûlée with vanilla bean",
    "30 minute chicken dinner",
    "THE AND OF",
    "",
    "a b c d",
    "tofu, rice & ginger-soy sauce!!",
];

fn corpus() -> Vec<String> {
    let mut docs: Vec<String> = seed_records().into_iter().map(|r| r.content).collect();
    docs.extend(TEXTS.iter().map(|t| t.to_string()));
    docs
}

#[test]
fn test_encoding_invariants_across_dims() {
    for dim in [1, 2, 7, 1024, 1 << 18] {
        let encoder = SparseEncoder::build(corpus(), dim, 1);

        for text in TEXTS {
            let sparse = encoder.encode(text);
            assert_eq!(sparse.indices.len(), sparse.values.len());

            let unique: HashSet<u32> = sparse.indices.iter().copied().collect();
            assert_eq!(unique.len(), sparse.indices.len(), "duplicate index for {text:?}");
            assert!(sparse.indices.iter().all(|i| *i < dim));
            assert!(sparse.values.iter().all(|v| v.is_finite() && *v > 0.0));

            if !sparse.is_empty() {
                let norm: f32 = sparse.values.iter().map(|v| v * v).sum::<f32>().sqrt();
                assert!((norm - 1.0).abs() < 1e-4, "norm {norm} for {text:?}");
            }
        }
    }
}

#[test]
fn test_encoders_built_from_same_corpus_agree() {
    let first = SparseEncoder::build(corpus(), 4096, 1);
    let second = SparseEncoder::build(corpus(), 4096, 1);

    for text in TEXTS {
        assert_eq!(first.encode(text), second.encode(text));
    }
}

#[test]
fn test_degenerate_inputs_encode_empty() {
    let encoder = SparseEncoder::build(corpus(), 1 << 18, 1);

    for text in ["", "   ", "THE AND OF", "a b c d", "!!! ???"] {
        assert!(encoder.encode(text).is_empty(), "{text:?} should have no signal");
    }
}

#[test]
fn test_unicode_terms_are_encoded() {
    let encoder = SparseEncoder::build(corpus(), 1 << 18, 1);
    assert!(!encoder.encode("crème brûlée").is_empty());
}

#[test]
fn test_threshold_ordering_is_stable_for_ties() {
    let hits: Vec<RetrievalHit> = (0..20)
        .map(|i| RetrievalHit::new(format!("r{i:02}"), (i % 3) as f32 / 10.0))
        .collect();

    let verdict = evaluate(hits, 0.2);
    assert!(verdict.passes);
    assert_eq!(verdict.top_score, 0.2);

    let scores: Vec<f32> = verdict.hits.iter().map(RetrievalHit::score).collect();
    assert!(scores.windows(2).all(|w| w[0] >= w[1]));

    // equal scores keep their input order
    for pair in verdict.hits.windows(2) {
        if pair[0].score() == pair[1].score() {
            assert!(pair[0].id < pair[1].id);
        }
    }
}
