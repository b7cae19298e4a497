//! Retrieval core: decides whether a dense hit set, a sparse hit set, or
//! neither is good enough to answer a query with.
//!
//! # Architecture
//!
//! - `sparse`: hashed TF-IDF encoder built once from the recipe corpus
//! - `threshold`: stable score ranking with an inclusive acceptance threshold
//! - `pipeline`: per-query dense -> sparse -> fallback state machine
//! - `hit`: search hits as returned by the search providers

mod hit;
pub mod pipeline;
pub mod sparse;
mod threshold;

pub use hit::RetrievalHit;
pub use pipeline::{AnswerSource, ResolvedAnswer, RetrievalConfig, RetrievalPipeline};
pub use sparse::{SparseEncoder, SparseVector};
pub use threshold::evaluate;
