//! In-memory vector index for the offline backend.
//!
//! Stores recipe embeddings per namespace and answers:
//! - dense queries with cosine similarity
//! - hybrid queries with `cosine(dense) + dot(sparse)`, the same scoring a
//!   dotproduct index applies to a dense+sparse query

use std::collections::HashMap;

use serde_json::{Map, Value};

use super::{ProviderError, SearchProvider};
use crate::retrieval::{RetrievalHit, SparseVector};

/// An entry in the vector index.
#[derive(Debug, Clone)]
pub struct VectorEntry {
    /// The dense embedding
    pub embedding: Vec<f32>,
    /// Lexical encoding of the record content (may be empty)
    pub sparse: SparseVector,
    /// Payload returned with every hit
    pub fields: Map<String, Value>,
}

/// Errors that can occur during index operations.
#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("Dimension mismatch: expected {expected}, got {got}")]
    DimensionMismatch { expected: usize, got: usize },

    #[error("Cannot store or search with zero-norm vector")]
    ZeroNormVector,
}

/// In-memory vector index, keyed by namespace then record id.
///
/// The embedding size is fixed by the first insert; an index that never saw
/// an insert answers every search with no hits.
#[derive(Default)]
pub struct VectorIndex {
    namespaces: HashMap<String, HashMap<String, VectorEntry>>,
    dimensions: Option<usize>,
}

impl VectorIndex {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of entries in a namespace.
    pub fn len(&self, namespace: &str) -> usize {
        self.namespaces.get(namespace).map(HashMap::len).unwrap_or(0)
    }

    /// Insert or replace an entry.
    ///
    /// Rejects zero-norm embeddings and embeddings whose size differs from
    /// the ones already stored.
    pub fn insert(
        &mut self,
        namespace: &str,
        id: impl Into<String>,
        entry: VectorEntry,
    ) -> Result<(), IndexError> {
        if l2_norm(&entry.embedding) < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }
        self.check_dimensions(&entry.embedding)?;
        self.dimensions = Some(entry.embedding.len());

        self.namespaces
            .entry(namespace.to_string())
            .or_default()
            .insert(id.into(), entry);

        Ok(())
    }

    /// Score every entry in `namespace` and keep the best `limit`.
    ///
    /// An empty or unknown namespace yields no hits without looking at the
    /// query.
    fn rank<F>(
        &self,
        namespace: &str,
        query: &[f32],
        limit: usize,
        score: F,
    ) -> Result<Vec<RetrievalHit>, IndexError>
    where
        F: Fn(&VectorEntry, f32) -> f32,
    {
        let entries = match self.namespaces.get(namespace) {
            Some(entries) if !entries.is_empty() => entries,
            _ => return Ok(vec![]),
        };

        let query_norm = self.check_query(query)?;

        let mut hits: Vec<RetrievalHit> = entries
            .iter()
            .map(|(id, entry)| {
                RetrievalHit::new(id.clone(), score(entry, query_norm))
                    .with_fields(entry.fields.clone())
            })
            .collect();

        // ids break ties so results do not depend on map order
        hits.sort_by(|a, b| b.score().total_cmp(&a.score()).then_with(|| a.id.cmp(&b.id)));
        hits.truncate(limit);

        Ok(hits)
    }

    fn check_dimensions(&self, vector: &[f32]) -> Result<(), IndexError> {
        match self.dimensions {
            Some(expected) if expected != vector.len() => Err(IndexError::DimensionMismatch {
                expected,
                got: vector.len(),
            }),
            _ => Ok(()),
        }
    }

    fn check_query(&self, query: &[f32]) -> Result<f32, IndexError> {
        self.check_dimensions(query)?;

        let norm = l2_norm(query);
        if norm < f32::EPSILON {
            return Err(IndexError::ZeroNormVector);
        }

        Ok(norm)
    }
}

impl SearchProvider for VectorIndex {
    fn search_dense(
        &self,
        namespace: &str,
        vector: &[f32],
        rerank_query: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>, ProviderError> {
        if rerank_query.is_some() {
            log::debug!("in-memory index does not rerank; ignoring rerank query");
        }

        let hits = self.rank(namespace, vector, top_k, |entry, query_norm| {
            cosine_similarity(vector, &entry.embedding, query_norm)
        })?;
        Ok(hits)
    }

    fn search_sparse(
        &self,
        namespace: &str,
        vector: &[f32],
        sparse: &SparseVector,
        _rerank_query: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>, ProviderError> {
        let hits = self.rank(namespace, vector, top_k, |entry, query_norm| {
            cosine_similarity(vector, &entry.embedding, query_norm) + sparse.dot(&entry.sparse)
        })?;
        Ok(hits)
    }

    fn name(&self) -> &'static str {
        "memory"
    }
}

/// Compute L2 norm of a vector.
fn l2_norm(v: &[f32]) -> f32 {
    v.iter().map(|x| x * x).sum::<f32>().sqrt()
}

/// Compute cosine similarity between two vectors.
/// Assumes query_norm is precomputed for efficiency.
fn cosine_similarity(query: &[f32], target: &[f32], query_norm: f32) -> f32 {
    let target_norm = l2_norm(target);
    if target_norm < f32::EPSILON {
        return 0.0;
    }

    let dot_product: f32 = query.iter().zip(target.iter()).map(|(a, b)| a * b).sum();
    dot_product / (query_norm * target_norm)
}
