//! Per-query retrieval state machine.
//!
//! ```text
//! DENSE_SEARCH
//!   passes && hits >= min_dense_hits  -> DENSE (sparse never called)
//!   passes && hits <  min_dense_hits  -> keep as fallback, SPARSE_SEARCH
//!   fails or empty                    -> SPARSE_SEARCH, nothing kept
//! SPARSE_SEARCH
//!   empty encoding                    -> no call, RESOLVE
//!   passes                            -> SPARSE
//!   fails or empty                    -> RESOLVE
//! RESOLVE
//!   fallback kept                     -> DENSE (kept hits)
//!   otherwise                         -> GENERATED
//! ```
//!
//! Only a dense result that passed its threshold is ever kept as a fallback.
//! A failing dense result is dropped even when it was the only evidence.

use serde::{Deserialize, Serialize};

use super::{evaluate, RetrievalHit, SparseEncoder};
use crate::providers::{EmbeddingError, EmbeddingProvider, ProviderError, SearchProvider};

/// Default dense acceptance threshold
pub const DEFAULT_DENSE_THRESHOLD: f32 = 0.10;
/// Default sparse acceptance threshold
pub const DEFAULT_SPARSE_THRESHOLD: f32 = 0.0;
/// Default number of dense hits needed to skip sparse search
pub const DEFAULT_MIN_DENSE_HITS: usize = 3;
/// Default result set size for both searches
pub const DEFAULT_TOP_K: usize = 10;

/// Errors propagated out of a query. "No good match" is not one of them.
#[derive(Debug, thiserror::Error)]
pub enum RetrievalError {
    #[error("Embedding error: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("Search error: {0}")]
    Provider(#[from] ProviderError),
}

/// Per-invocation tunables.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalConfig {
    pub namespace: String,
    pub dense_top_k: usize,
    pub sparse_top_k: usize,
    pub dense_threshold: f32,
    pub sparse_threshold: f32,
    pub min_dense_hits: usize,
}

impl RetrievalConfig {
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
            dense_top_k: DEFAULT_TOP_K,
            sparse_top_k: DEFAULT_TOP_K,
            dense_threshold: DEFAULT_DENSE_THRESHOLD,
            sparse_threshold: DEFAULT_SPARSE_THRESHOLD,
            min_dense_hits: DEFAULT_MIN_DENSE_HITS,
        }
    }
}

/// Which result set drives the answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnswerSource {
    Dense,
    Sparse,
    Generated,
}

/// Pipeline output, consumed once by the caller.
#[derive(Debug, Clone, PartialEq)]
pub enum ResolvedAnswer {
    Dense { hits: Vec<RetrievalHit>, score: f32 },
    Sparse { hits: Vec<RetrievalHit>, score: f32 },
    Generated,
}

impl ResolvedAnswer {
    pub fn source(&self) -> AnswerSource {
        match self {
            ResolvedAnswer::Dense { .. } => AnswerSource::Dense,
            ResolvedAnswer::Sparse { .. } => AnswerSource::Sparse,
            ResolvedAnswer::Generated => AnswerSource::Generated,
        }
    }

    pub fn hits(&self) -> &[RetrievalHit] {
        match self {
            ResolvedAnswer::Dense { hits, .. } | ResolvedAnswer::Sparse { hits, .. } => hits,
            ResolvedAnswer::Generated => &[],
        }
    }

    pub fn score(&self) -> Option<f32> {
        match self {
            ResolvedAnswer::Dense { score, .. } | ResolvedAnswer::Sparse { score, .. } => {
                Some(*score)
            }
            ResolvedAnswer::Generated => None,
        }
    }
}

/// Passing-but-thin dense result held back while sparse search runs.
struct DenseFallback {
    hits: Vec<RetrievalHit>,
    score: f32,
}

/// Borrowed view over the collaborators needed to resolve queries.
///
/// Holds no per-query state; one pipeline can serve many queries, and the
/// encoder is only ever read.
pub struct RetrievalPipeline<'a> {
    embedder: &'a dyn EmbeddingProvider,
    search: &'a dyn SearchProvider,
    encoder: &'a SparseEncoder,
}

impl<'a> RetrievalPipeline<'a> {
    pub fn new(
        embedder: &'a dyn EmbeddingProvider,
        search: &'a dyn SearchProvider,
        encoder: &'a SparseEncoder,
    ) -> Self {
        Self {
            embedder,
            search,
            encoder,
        }
    }

    /// Resolve one query to a dense answer, a sparse answer, or a request
    /// to generate.
    ///
    /// Embedding and search failures propagate unchanged; they never turn
    /// into `Generated`.
    pub fn resolve(
        &self,
        query: &str,
        config: &RetrievalConfig,
    ) -> Result<ResolvedAnswer, RetrievalError> {
        let vector = self.embedder.embed(query)?;
        if vector.is_empty() {
            return Err(EmbeddingError::NoVector.into());
        }

        let dense_hits = self.search.search_dense(
            &config.namespace,
            &vector,
            Some(query),
            config.dense_top_k,
        )?;

        let mut fallback = None;

        if dense_hits.is_empty() {
            log::debug!("dense search returned no hits");
        } else {
            let hit_count = dense_hits.len();
            let verdict = evaluate(dense_hits, config.dense_threshold);
            log::debug!(
                "dense search: hits={hit_count} top_score={:.4} threshold={} passes={}",
                verdict.top_score,
                config.dense_threshold,
                verdict.passes
            );

            if verdict.passes {
                if hit_count >= config.min_dense_hits {
                    log::info!("resolved from dense search (score={:.4})", verdict.top_score);
                    return Ok(ResolvedAnswer::Dense {
                        hits: verdict.hits,
                        score: verdict.top_score,
                    });
                }

                log::debug!(
                    "dense result kept as fallback: {hit_count} hits < min_dense_hits={}",
                    config.min_dense_hits
                );
                fallback = Some(DenseFallback {
                    hits: verdict.hits,
                    score: verdict.top_score,
                });
            }
        }

        let sparse = self.encoder.encode(query);
        let sparse_hits = if sparse.is_empty() {
            log::debug!("query has no lexical signal, skipping sparse search");
            Vec::new()
        } else {
            log::debug!("sparse search with {} weighted terms", sparse.len());
            self.search.search_sparse(
                &config.namespace,
                &vector,
                &sparse,
                Some(query),
                config.sparse_top_k,
            )?
        };

        if !sparse_hits.is_empty() {
            let verdict = evaluate(sparse_hits, config.sparse_threshold);
            if verdict.passes {
                log::info!("resolved from sparse search (score={:.4})", verdict.top_score);
                return Ok(ResolvedAnswer::Sparse {
                    hits: verdict.hits,
                    score: verdict.top_score,
                });
            }

            log::info!(
                "sparse search results did not meet threshold ({}). Best score: {:.2}",
                config.sparse_threshold,
                verdict.top_score
            );
        }

        match fallback {
            Some(DenseFallback { hits, score }) => {
                log::info!("resolved from retained dense fallback (score={score:.4})");
                Ok(ResolvedAnswer::Dense { hits, score })
            }
            None => {
                log::info!("no usable match, requesting generation");
                Ok(ResolvedAnswer::Generated)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_config_defaults() {
        let config = RetrievalConfig::new("main_recipes");
        assert_eq!(config.namespace, "main_recipes");
        assert_eq!(config.dense_top_k, 10);
        assert_eq!(config.sparse_top_k, 10);
        assert_eq!(config.dense_threshold, 0.10);
        assert_eq!(config.sparse_threshold, 0.0);
        assert_eq!(config.min_dense_hits, 3);
    }

    #[test]
    fn test_resolved_answer_accessors() {
        let dense = ResolvedAnswer::Dense {
            hits: vec![RetrievalHit::new("a", 0.9)],
            score: 0.9,
        };
        assert_eq!(dense.source(), AnswerSource::Dense);
        assert_eq!(dense.hits().len(), 1);
        assert_eq!(dense.score(), Some(0.9));

        let sparse = ResolvedAnswer::Sparse {
            hits: vec![],
            score: 0.2,
        };
        assert_eq!(sparse.source(), AnswerSource::Sparse);

        assert_eq!(ResolvedAnswer::Generated.source(), AnswerSource::Generated);
        assert!(ResolvedAnswer::Generated.hits().is_empty());
        assert_eq!(ResolvedAnswer::Generated.score(), None);
    }
}
