//! Recipe records: loading, merging and metadata flattening.
//!
//! A corpus file is a JSON array of records shaped like
//! `{"_id": "...", "content": "...", ...}`. Extra keys, and the keys of an
//! optional nested `metadata` object, become the record's metadata.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use anyhow::Context;
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

/// A single recipe document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecipeRecord {
    #[serde(rename = "_id")]
    pub id: String,

    #[serde(default)]
    pub content: String,

    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl RecipeRecord {
    /// Metadata ready for the vector index.
    ///
    /// The nested `metadata` object is merged into the top level (its keys
    /// win), `content` is kept so hits carry the recipe text, and `null`
    /// values and empty arrays are dropped because the index rejects them.
    pub fn flat_metadata(&self) -> Map<String, Value> {
        let mut flat = Map::new();
        flat.insert("content".to_string(), Value::String(self.content.clone()));

        for (key, value) in &self.extra {
            if key == "metadata" {
                continue;
            }
            flat.insert(key.clone(), value.clone());
        }

        if let Some(Value::Object(nested)) = self.extra.get("metadata") {
            for (key, value) in nested {
                flat.insert(key.clone(), value.clone());
            }
        }

        flat.retain(|_, value| !is_unindexable(value));
        flat
    }
}

fn is_unindexable(value: &Value) -> bool {
    match value {
        Value::Null => true,
        Value::Array(items) => items.is_empty(),
        _ => false,
    }
}

/// Load and merge corpus files.
///
/// Records with the same `_id` keep the copy from the earliest file. The
/// result is ordered by id. With no files the built-in seed recipes are
/// returned.
pub fn load_corpus(paths: &[PathBuf]) -> anyhow::Result<Vec<RecipeRecord>> {
    if paths.is_empty() {
        log::info!("no corpus configured, using built-in seed recipes");
        return Ok(seed_records());
    }

    let mut sets = Vec::with_capacity(paths.len());
    for path in paths {
        sets.push(read_corpus_file(path)?);
    }

    Ok(merge_records(sets))
}

fn read_corpus_file(path: &Path) -> anyhow::Result<Vec<RecipeRecord>> {
    let data = std::fs::read(path)
        .with_context(|| format!("failed to read corpus file {}", path.display()))?;

    let records: Vec<RecipeRecord> = serde_json::from_slice(&data)
        .with_context(|| format!("corpus file {} is malformed", path.display()))?;

    log::debug!("read {} records from {}", records.len(), path.display());
    Ok(records)
}

/// Merge record sets; earlier sets win on duplicate ids.
pub fn merge_records(sets: Vec<Vec<RecipeRecord>>) -> Vec<RecipeRecord> {
    let mut by_id: BTreeMap<String, RecipeRecord> = BTreeMap::new();

    for record in sets.into_iter().flatten() {
        if record.id.trim().is_empty() {
            log::warn!("skipping corpus record without an id");
            continue;
        }
        by_id.entry(record.id.clone()).or_insert(record);
    }

    by_id.into_values().collect()
}

/// Small built-in collection used when no corpus file is configured.
pub fn seed_records() -> Vec<RecipeRecord> {
    let seeds = json!([
        {
            "_id": "seafood-pasta",
            "content": "Lemon-garlic shrimp tossed with linguine, roasted cherry tomatoes, and parsley in a light broth.",
            "category": "seafood",
            "diet": "pescatarian",
            "prep_time": "30m",
            "difficulty": "easy",
            "rating": "4.5"
        },
        {
            "_id": "sheet-pan-salmon",
            "content": "Sheet-pan salmon with broccolini, baby potatoes, and a honey-mustard glaze that roasts in 20 minutes.",
            "category": "seafood",
            "diet": "gluten-free",
            "prep_time": "25m",
            "difficulty": "easy",
            "rating": "4.0"
        },
        {
            "_id": "stir-fry-veg",
            "content": "Tofu and rainbow vegetables with ginger-soy sauce served over jasmine rice for a quick weeknight stir-fry.",
            "category": "vegetarian",
            "diet": "vegetarian",
            "prep_time": "20m",
            "difficulty": "easy",
            "rating": "3.5"
        }
    ]);

    serde_json::from_value(seeds).unwrap_or_default()
}
