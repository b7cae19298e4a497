use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// A single search hit.
///
/// Field names follow the search API wire format (`_id`, `_score`, `fields`),
/// so hits deserialize straight out of a search response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievalHit {
    #[serde(rename = "_id")]
    pub id: String,

    /// Relevance, higher is better. Not comparable across dense and sparse
    /// result sets.
    #[serde(rename = "_score", default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f32>,

    /// Opaque payload handed to the responder untouched.
    #[serde(default)]
    pub fields: Map<String, Value>,
}

impl RetrievalHit {
    pub fn new(id: impl Into<String>, score: f32) -> Self {
        Self {
            id: id.into(),
            score: Some(score),
            fields: Map::new(),
        }
    }

    pub fn with_fields(mut self, fields: Map<String, Value>) -> Self {
        self.fields = fields;
        self
    }

    /// Score with a missing or NaN value read as `0.0`.
    ///
    /// `-0.0` is folded into `0.0` so the result orders with `total_cmp`
    /// the same way it compares with `==`.
    pub fn score(&self) -> f32 {
        match self.score {
            Some(score) if !score.is_nan() => score + 0.0,
            _ => 0.0,
        }
    }

    /// Look up a string field, also checking a nested `metadata` object.
    pub fn field_str(&self, key: &str) -> Option<&str> {
        self.fields
            .get(key)
            .or_else(|| self.fields.get("metadata").and_then(|m| m.get(key)))
            .and_then(Value::as_str)
            .filter(|s| !s.is_empty())
    }

    /// Field rendered as display text. Numbers are accepted alongside strings
    /// since ratings arrive as either.
    pub fn field_text(&self, key: &str) -> Option<String> {
        let value = self
            .fields
            .get(key)
            .or_else(|| self.fields.get("metadata").and_then(|m| m.get(key)))?;

        match value {
            Value::String(s) if !s.is_empty() => Some(s.clone()),
            Value::Number(n) => Some(n.to_string()),
            _ => None,
        }
    }
}
