//! Hashed TF-IDF encoder for lexical (sparse) search.
//!
//! Terms are hashed into a fixed number of buckets instead of keeping an
//! explicit vocabulary. Bucket collisions are accepted; the document
//! frequency filter and IDF weighting keep their noise down.
//!
//! The encoder is built once from the corpus and never mutated afterwards,
//! so it can be shared between queries without locking.

use std::collections::{BTreeMap, HashMap, HashSet};

use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

/// Default hash space size (2^18 buckets)
pub const DEFAULT_HASH_DIM: u32 = 1 << 18;

/// Default minimum number of documents a bucket must appear in
pub const DEFAULT_MIN_DOC_FREQ: usize = 1;

/// Joins adjacent tokens into a bigram term
const BIGRAM_SEPARATOR: char = '_';

const STOP_WORDS: &[&str] = &[
    "a", "an", "and", "are", "as", "at", "be", "by", "for", "from", "has", "in", "is", "it",
    "of", "on", "or", "that", "the", "to", "was", "were", "with",
];

static TOKEN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\p{Alphabetic}\p{N}]+").expect("token regex is valid"));

/// Sparse vector as two parallel sequences.
///
/// `indices` never holds duplicates and every index is below the encoder's
/// `dim`. Empty means "no lexical signal".
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SparseVector {
    pub indices: Vec<u32>,
    pub values: Vec<f32>,
}

impl SparseVector {
    pub fn is_empty(&self) -> bool {
        self.indices.is_empty()
    }

    pub fn len(&self) -> usize {
        self.indices.len()
    }

    /// Dot product against another sparse vector.
    pub fn dot(&self, other: &SparseVector) -> f32 {
        if self.is_empty() || other.is_empty() {
            return 0.0;
        }

        let lookup: HashMap<u32, f32> = other
            .indices
            .iter()
            .copied()
            .zip(other.values.iter().copied())
            .collect();

        self.indices
            .iter()
            .zip(self.values.iter())
            .filter_map(|(idx, value)| lookup.get(idx).map(|w| value * w))
            .sum()
    }
}

/// Immutable encoder state: hash space size plus per-bucket IDF weights.
#[derive(Debug, Clone)]
pub struct SparseEncoder {
    dim: u32,
    idf_by_index: HashMap<u32, f32>,
}

impl SparseEncoder {
    /// Build the IDF table from a reference corpus.
    ///
    /// Buckets hit by fewer than `min_doc_freq` documents are left out, so
    /// query terms landing there carry no weight. An empty corpus yields an
    /// encoder that always produces the empty vector.
    ///
    /// `dim` is clamped to at least one bucket.
    pub fn build<I, S>(corpus: I, dim: u32, min_doc_freq: usize) -> Self
    where
        I: IntoIterator<Item = S>,
        S: AsRef<str>,
    {
        let dim = dim.max(1);

        let mut doc_count: usize = 0;
        let mut df_by_index: HashMap<u32, usize> = HashMap::new();

        for document in corpus {
            doc_count += 1;

            // df counts documents, so each bucket once per document
            let buckets: HashSet<u32> = expand_terms(tokenize(document.as_ref()))
                .iter()
                .map(|term| hash_term(term, dim))
                .collect();

            for bucket in buckets {
                *df_by_index.entry(bucket).or_insert(0) += 1;
            }
        }

        let idf_by_index = df_by_index
            .into_iter()
            .filter(|(_, df)| *df >= min_doc_freq)
            .map(|(bucket, df)| (bucket, inverse_document_frequency(doc_count, df)))
            .collect();

        Self { dim, idf_by_index }
    }

    /// Encode text into an L2-normalized sparse vector.
    ///
    /// Returns the empty vector when the text has no usable terms or none of
    /// its buckets carry an IDF weight.
    pub fn encode(&self, text: &str) -> SparseVector {
        let terms = expand_terms(tokenize(text));
        if terms.is_empty() {
            return SparseVector::default();
        }

        // BTreeMap keeps the output order stable between calls
        let mut tf_by_index: BTreeMap<u32, u32> = BTreeMap::new();
        for term in &terms {
            *tf_by_index.entry(hash_term(term, self.dim)).or_insert(0) += 1;
        }

        let (indices, mut values): (Vec<u32>, Vec<f32>) = tf_by_index
            .into_iter()
            .filter_map(|(bucket, tf)| {
                self.idf_by_index
                    .get(&bucket)
                    .map(|idf| (bucket, tf as f32 * idf))
            })
            .unzip();

        if indices.is_empty() {
            return SparseVector::default();
        }

        // idf > 0 for every kept bucket, so the norm is positive
        let norm = values.iter().map(|v| v * v).sum::<f32>().sqrt();
        for value in values.iter_mut() {
            *value /= norm;
        }

        SparseVector { indices, values }
    }

    /// Size of the hash space.
    pub fn dim(&self) -> u32 {
        self.dim
    }

    /// Number of buckets that carry an IDF weight.
    pub fn weighted_buckets(&self) -> usize {
        self.idf_by_index.len()
    }

    /// IDF weight of a bucket, if it survived the document frequency filter.
    #[cfg(test)]
    pub fn idf(&self, bucket: u32) -> Option<f32> {
        self.idf_by_index.get(&bucket).copied()
    }
}

/// Smoothed IDF: `ln((1 + N) / (1 + df)) + 1`, always strictly positive.
fn inverse_document_frequency(doc_count: usize, df: usize) -> f32 {
    (((1 + doc_count) as f64 / (1 + df) as f64).ln() + 1.0) as f32
}

/// Lowercase, split into alphanumeric runs, drop stop words and
/// single-character tokens.
fn tokenize(text: &str) -> Vec<String> {
    let lowered = text.to_lowercase();

    TOKEN_RE
        .find_iter(&lowered)
        .map(|m| m.as_str())
        .filter(|token| token.chars().count() > 1 && !STOP_WORDS.contains(token))
        .map(str::to_string)
        .collect()
}

/// Tokens followed by adjacent-pair bigrams (only when two or more tokens).
fn expand_terms(tokens: Vec<String>) -> Vec<String> {
    if tokens.len() < 2 {
        return tokens;
    }

    let bigrams: Vec<String> = tokens
        .windows(2)
        .map(|pair| format!("{}{}{}", pair[0], BIGRAM_SEPARATOR, pair[1]))
        .collect();

    let mut terms = tokens;
    terms.extend(bigrams);
    terms
}

/// First four digest bytes, little-endian, reduced modulo `dim`.
fn hash_term(term: &str, dim: u32) -> u32 {
    let digest = Sha256::digest(term.as_bytes());
    let head = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
    head % dim
}
