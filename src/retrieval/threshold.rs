//! Score threshold check over a hit set.

use super::RetrievalHit;

/// Outcome of checking a hit set against a threshold.
#[derive(Debug, Clone, PartialEq)]
pub struct ThresholdVerdict {
    /// Top score is at or above the threshold
    pub passes: bool,
    /// Score of the best hit (`0.0` for an empty set)
    pub top_score: f32,
    /// Hits ordered by score, best first
    pub hits: Vec<RetrievalHit>,
}

/// Rank hits by score and compare the best one against `threshold`.
///
/// The sort is stable: hits with equal scores keep their incoming order,
/// which preserves any rerank ordering among ties. A missing score counts
/// as `0.0`. The threshold is inclusive.
pub fn evaluate(mut hits: Vec<RetrievalHit>, threshold: f32) -> ThresholdVerdict {
    if hits.is_empty() {
        return ThresholdVerdict {
            passes: false,
            top_score: 0.0,
            hits,
        };
    }

    hits.sort_by(|a, b| b.score().total_cmp(&a.score()));

    let top_score = hits[0].score();

    ThresholdVerdict {
        passes: top_score >= threshold,
        top_score,
        hits,
    }
}
