//! External collaborators consumed by the retrieval core.
//!
//! - `openai`: embeddings and chat completions over an OpenAI-compatible API
//! - `pinecone`: hosted vector index (search, upsert, index management)
//! - `local`: fastembed model running in-process
//! - `memory`: in-process vector index used by the offline backend
//!
//! The pipeline only ever sees the traits below.

#[cfg(feature = "local-embeddings")]
pub mod local;
pub mod memory;
pub mod openai;
pub mod pinecone;

use crate::retrieval::{RetrievalHit, SparseVector};

/// Error type for embedding operations
#[derive(Debug, thiserror::Error)]
pub enum EmbeddingError {
    #[error("Model initialization failed: {0}")]
    InitFailed(String),

    #[error("Embedding request failed: {0}")]
    Request(String),

    #[error("Provider returned no embedding for the input")]
    NoVector,

    #[cfg(feature = "local-embeddings")]
    #[error("Invalid model name: {0}")]
    InvalidModel(String),
}

/// Error type for search and generation calls.
#[derive(Debug, thiserror::Error)]
pub enum ProviderError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("{provider} returned {status}: {body}")]
    Status {
        provider: &'static str,
        status: u16,
        body: String,
    },

    #[error("Failed to decode {provider} response: {message}")]
    Decode {
        provider: &'static str,
        message: String,
    },

    #[error("Index error: {0}")]
    Index(#[from] memory::IndexError),

    #[error("Provider unavailable: {0}")]
    Unavailable(String),
}

/// Text -> dense vector.
pub trait EmbeddingProvider: Send + Sync {
    /// Embed a single text. Fails with `EmbeddingError::NoVector` when the
    /// provider answers without a vector.
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError>;

    /// Embed many texts, one vector per input, in input order.
    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError>;

    /// Model name, for logging
    fn name(&self) -> &str;
}

/// Dense and hybrid search over one index.
///
/// Returned hits are not assumed to be score-sorted.
pub trait SearchProvider: Send + Sync {
    fn search_dense(
        &self,
        namespace: &str,
        vector: &[f32],
        rerank_query: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>, ProviderError>;

    /// Only called with a non-empty sparse vector.
    fn search_sparse(
        &self,
        namespace: &str,
        vector: &[f32],
        sparse: &SparseVector,
        rerank_query: Option<&str>,
        top_k: usize,
    ) -> Result<Vec<RetrievalHit>, ProviderError>;

    /// Get the name of this provider for logging
    fn name(&self) -> &'static str;
}

/// Produces the user-facing text once the pipeline has resolved.
pub trait Responder: Send + Sync {
    /// Present the best of `hits` as an answer to `query`.
    fn answer_from_hits(&self, query: &str, hits: &[RetrievalHit])
        -> Result<String, ProviderError>;

    /// Write a new recipe for `query` when nothing in the collection matched.
    fn generate_from_scratch(&self, query: &str) -> Result<String, ProviderError>;
}
