//! Local embedding model backed by fastembed.
//!
//! The model is downloaded into `<base_path>/models` on first use and runs
//! in-process afterwards, so the offline backend needs no embeddings API.

use std::path::PathBuf;
use std::sync::{Mutex, MutexGuard};

use fastembed::{EmbeddingModel, InitOptions, TextEmbedding};

use super::{EmbeddingError, EmbeddingProvider};

/// Config names accepted for `local.model`, matched case-insensitively.
const MODELS: &[(&str, EmbeddingModel)] = &[
    ("all-minilm-l6-v2", EmbeddingModel::AllMiniLML6V2),
    ("all-minilm-l6-v2-q", EmbeddingModel::AllMiniLML6V2Q),
    ("bge-small-en-v1.5", EmbeddingModel::BGESmallENV15),
    ("bge-small-en-v1.5-q", EmbeddingModel::BGESmallENV15Q),
    ("bge-base-en-v1.5", EmbeddingModel::BGEBaseENV15),
    ("bge-base-en-v1.5-q", EmbeddingModel::BGEBaseENV15Q),
];

pub struct LocalEmbedder {
    // TextEmbedding::embed takes &mut self
    model: Mutex<TextEmbedding>,
    model_name: String,
}

impl LocalEmbedder {
    /// Load `model_name`, fetching it into `<cache_dir>/models` when it is
    /// not cached yet.
    pub fn new(model_name: &str, cache_dir: PathBuf) -> Result<Self, EmbeddingError> {
        let model = lookup_model(model_name)?;

        let models_dir = cache_dir.join("models");
        std::fs::create_dir_all(&models_dir).map_err(|e| {
            EmbeddingError::InitFailed(format!("cannot create {}: {e}", models_dir.display()))
        })?;

        let options = InitOptions::new(model)
            .with_cache_dir(models_dir)
            .with_show_download_progress(true);
        let model = TextEmbedding::try_new(options)
            .map_err(|e| EmbeddingError::InitFailed(e.to_string()))?;

        log::info!("loaded local embedding model {model_name}");

        Ok(Self {
            model: Mutex::new(model),
            model_name: model_name.to_string(),
        })
    }

    fn model(&self) -> Result<MutexGuard<'_, TextEmbedding>, EmbeddingError> {
        self.model
            .lock()
            .map_err(|_| EmbeddingError::Request(format!("{} lock poisoned", self.model_name)))
    }
}

impl EmbeddingProvider for LocalEmbedder {
    fn embed(&self, text: &str) -> Result<Vec<f32>, EmbeddingError> {
        self.embed_batch(&[text.to_string()])?
            .pop()
            .ok_or(EmbeddingError::NoVector)
    }

    fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, EmbeddingError> {
        if texts.is_empty() {
            return Ok(vec![]);
        }

        self.model()?
            .embed(texts.to_vec(), None)
            .map_err(|e| EmbeddingError::Request(e.to_string()))
    }

    fn name(&self) -> &str {
        &self.model_name
    }
}

fn lookup_model(name: &str) -> Result<EmbeddingModel, EmbeddingError> {
    MODELS
        .iter()
        .find(|(known, _)| known.eq_ignore_ascii_case(name))
        .map(|(_, model)| model.clone())
        .ok_or_else(|| {
            let known: Vec<&str> = MODELS.iter().map(|(known, _)| *known).collect();
            EmbeddingError::InvalidModel(format!("{name} (expected one of {})", known.join(", ")))
        })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_lookup_is_case_insensitive() {
        assert!(lookup_model("bge-small-en-v1.5").is_ok());
        assert!(lookup_model("BGE-Base-EN-v1.5-q").is_ok());
        assert!(lookup_model("all-MiniLM-L6-v2").is_ok());
    }

    #[test]
    fn test_unknown_model_lists_choices() {
        let err = lookup_model("text-embedding-3-small").unwrap_err();
        let message = err.to_string();
        assert!(message.contains("text-embedding-3-small"));
        assert!(message.contains("bge-small-en-v1.5"));
    }

    #[test]
    fn test_unknown_model_fails_before_download() {
        let temp_dir = tempfile::tempdir().unwrap();
        let result = LocalEmbedder::new("nonexistent-model", temp_dir.path().to_path_buf());
        assert!(matches!(result, Err(EmbeddingError::InvalidModel(_))));
        assert!(!temp_dir.path().join("models").exists());
    }

    #[test]
    #[ignore = "requires model download"]
    fn test_embeds_recipe_text() {
        let temp_dir = tempfile::tempdir().unwrap();
        let model = LocalEmbedder::new("all-MiniLM-L6-v2", temp_dir.path().to_path_buf()).unwrap();

        let embedding = model.embed("Lemon garlic shrimp linguine").unwrap();
        assert_eq!(embedding.len(), 384);

        let norm: f32 = embedding.iter().map(|x| x * x).sum::<f32>().sqrt();
        assert!((norm - 1.0).abs() < 0.01);

        let batch = model
            .embed_batch(&["salmon".to_string(), "tofu".to_string()])
            .unwrap();
        assert_eq!(batch.len(), 2);
        assert!(batch.iter().all(|v| v.len() == 384));
    }
}
