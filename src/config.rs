use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use homedir::my_home;
use serde::{Deserialize, Serialize};

use crate::retrieval::pipeline::{
    DEFAULT_DENSE_THRESHOLD, DEFAULT_MIN_DENSE_HITS, DEFAULT_SPARSE_THRESHOLD, DEFAULT_TOP_K,
};
use crate::retrieval::sparse::{DEFAULT_HASH_DIM, DEFAULT_MIN_DOC_FREQ};
use crate::retrieval::RetrievalConfig;

const CONFIG_FILE: &str = "config.yaml";

const DEFAULT_PINECONE_INDEX: &str = "recipes-vector-db";
const DEFAULT_NAMESPACE: &str = "main_recipes";
const DEFAULT_RERANK_MODEL: &str = "bge-reranker-v2-m3";
const DEFAULT_CLOUD: &str = "aws";
const DEFAULT_REGION: &str = "us-east-1";

const DEFAULT_OPENAI_BASE_URL: &str = "https://api.openai.com/v1";
const DEFAULT_EMBEDDING_MODEL: &str = "text-embedding-3-small";
const DEFAULT_CHAT_MODEL: &str = "gpt-4o-mini";
const DEFAULT_TIMEOUT_SECS: u64 = 60;

const DEFAULT_LOCAL_MODEL: &str = "bge-small-en-v1.5";

/// Where dense vectors come from and where they are searched.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// OpenAI embeddings + hosted Pinecone index
    #[default]
    Pinecone,
    /// fastembed model + in-memory index built at startup
    Local,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PineconeConfig {
    #[serde(default = "default_pinecone_index")]
    pub index: String,

    #[serde(default = "default_namespace")]
    pub namespace: String,

    /// Data-plane host. Looked up from the control plane when unset.
    #[serde(default)]
    pub host: Option<String>,

    /// Reranker applied to search results; `null` disables reranking
    #[serde(default = "default_rerank_model")]
    pub rerank_model: Option<String>,

    #[serde(default = "default_cloud")]
    pub cloud: String,

    #[serde(default = "default_region")]
    pub region: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for PineconeConfig {
    fn default() -> Self {
        Self {
            index: default_pinecone_index(),
            namespace: default_namespace(),
            host: None,
            rerank_model: default_rerank_model(),
            cloud: default_cloud(),
            region: default_region(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,

    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,

    #[serde(default = "default_chat_model")]
    pub chat_model: String,

    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            embedding_model: default_embedding_model(),
            chat_model: default_chat_model(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalConfig {
    /// fastembed model name (e.g., "bge-small-en-v1.5")
    #[serde(default = "default_local_model")]
    pub model: String,
}

impl Default for LocalConfig {
    fn default() -> Self {
        Self {
            model: default_local_model(),
        }
    }
}

/// Sparse encoder settings. Must match between upsert and query.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SparseConfig {
    #[serde(default = "default_hash_dim")]
    pub hash_dim: u32,

    #[serde(default = "default_min_doc_freq")]
    pub min_doc_freq: usize,
}

impl Default for SparseConfig {
    fn default() -> Self {
        Self {
            hash_dim: DEFAULT_HASH_DIM,
            min_doc_freq: DEFAULT_MIN_DOC_FREQ,
        }
    }
}

/// Retrieval tunables used when the command line does not override them.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct RetrievalDefaults {
    #[serde(default = "default_dense_threshold")]
    pub dense_threshold: f32,

    #[serde(default = "default_sparse_threshold")]
    pub sparse_threshold: f32,

    #[serde(default = "default_min_dense_hits")]
    pub min_dense_hits: usize,

    #[serde(default = "default_top_k")]
    pub dense_top_k: usize,

    #[serde(default = "default_top_k")]
    pub sparse_top_k: usize,
}

impl Default for RetrievalDefaults {
    fn default() -> Self {
        Self {
            dense_threshold: DEFAULT_DENSE_THRESHOLD,
            sparse_threshold: DEFAULT_SPARSE_THRESHOLD,
            min_dense_hits: DEFAULT_MIN_DENSE_HITS,
            dense_top_k: DEFAULT_TOP_K,
            sparse_top_k: DEFAULT_TOP_K,
        }
    }
}

fn default_pinecone_index() -> String {
    DEFAULT_PINECONE_INDEX.to_string()
}

fn default_namespace() -> String {
    DEFAULT_NAMESPACE.to_string()
}

fn default_rerank_model() -> Option<String> {
    Some(DEFAULT_RERANK_MODEL.to_string())
}

fn default_cloud() -> String {
    DEFAULT_CLOUD.to_string()
}

fn default_region() -> String {
    DEFAULT_REGION.to_string()
}

fn default_openai_base_url() -> String {
    DEFAULT_OPENAI_BASE_URL.to_string()
}

fn default_embedding_model() -> String {
    DEFAULT_EMBEDDING_MODEL.to_string()
}

fn default_chat_model() -> String {
    DEFAULT_CHAT_MODEL.to_string()
}

fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

fn default_local_model() -> String {
    DEFAULT_LOCAL_MODEL.to_string()
}

fn default_hash_dim() -> u32 {
    DEFAULT_HASH_DIM
}

fn default_min_doc_freq() -> usize {
    DEFAULT_MIN_DOC_FREQ
}

fn default_dense_threshold() -> f32 {
    DEFAULT_DENSE_THRESHOLD
}

fn default_sparse_threshold() -> f32 {
    DEFAULT_SPARSE_THRESHOLD
}

fn default_min_dense_hits() -> usize {
    DEFAULT_MIN_DENSE_HITS
}

fn default_top_k() -> usize {
    DEFAULT_TOP_K
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub backend: Backend,
    #[serde(default)]
    pub pinecone: PineconeConfig,
    #[serde(default)]
    pub openai: OpenAiConfig,
    #[serde(default)]
    pub local: LocalConfig,
    #[serde(default)]
    pub sparse: SparseConfig,
    #[serde(default)]
    pub retrieval: RetrievalDefaults,
    /// JSON corpus files, merged in order. Empty means built-in seeds.
    #[serde(default)]
    pub corpus: Vec<PathBuf>,

    #[serde(skip_serializing, skip_deserializing)]
    base_path: PathBuf,
}

impl Config {
    /// `RECIPE_RAG_BASE_PATH`, falling back to `~/.local/share/recipe-rag`.
    pub fn default_base_path() -> anyhow::Result<PathBuf> {
        if let Ok(path) = std::env::var("RECIPE_RAG_BASE_PATH") {
            return Ok(PathBuf::from(path));
        }

        let home = my_home()
            .context("could not determine home directory")?
            .context("home directory path is empty")?;

        Ok(home.join(".local/share/recipe-rag"))
    }

    /// Load `config.yaml` from `base_path`, creating it with defaults when
    /// missing. Environment overrides are applied after the file is read and
    /// are never written back.
    pub fn load_with(base_path: &Path) -> anyhow::Result<Self> {
        std::fs::create_dir_all(base_path)
            .with_context(|| format!("failed to create {}", base_path.display()))?;

        let path = base_path.join(CONFIG_FILE);

        // create new if does not exist
        if !path.exists() {
            log::info!("Creating default config at {}", path.display());
            write_atomic(&path, &serde_yml::to_string(&Self::default())?)?;
        }

        let config_str = std::fs::read_to_string(&path)
            .with_context(|| format!("failed to read {}", path.display()))?;
        let mut config: Self = serde_yml::from_str(&config_str)
            .with_context(|| format!("config {} is malformed", path.display()))?;

        config.base_path = base_path.to_path_buf();
        config.validate()?;

        // resave in case config version needs an upgrade
        if config_str != serde_yml::to_string(&config)? {
            config.save()?;
        }

        config.apply_env_overrides(|key| std::env::var(key).ok())?;
        config.validate()?;

        Ok(config)
    }

    pub fn save(&self) -> anyhow::Result<()> {
        let config_str = serde_yml::to_string(&self)?;
        write_atomic(&self.base_path.join(CONFIG_FILE), &config_str)
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Apply environment overrides through `lookup`.
    pub fn apply_env_overrides<F>(&mut self, lookup: F) -> anyhow::Result<()>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(index) = lookup("PINECONE_INDEX") {
            self.pinecone.index = index;
        }
        if let Some(namespace) = lookup("PINECONE_NAMESPACE") {
            self.pinecone.namespace = namespace;
        }
        if let Some(host) = lookup("PINECONE_HOST") {
            self.pinecone.host = Some(host);
        }
        if let Some(model) = lookup("EMBEDDING_MODEL") {
            self.openai.embedding_model = model;
        }
        if let Some(dim) = lookup("SPARSE_HASH_DIM") {
            self.sparse.hash_dim = dim
                .trim()
                .parse()
                .with_context(|| format!("SPARSE_HASH_DIM must be a positive integer, got '{dim}'"))?;
        }
        if let Some(min_df) = lookup("SPARSE_MIN_DOC_FREQ").or_else(|| lookup("SPARSE_MIN_DF")) {
            self.sparse.min_doc_freq = min_df.trim().parse().with_context(|| {
                format!("SPARSE_MIN_DOC_FREQ must be a positive integer, got '{min_df}'")
            })?;
        }

        Ok(())
    }

    fn validate(&self) -> anyhow::Result<()> {
        let r = &self.retrieval;
        if !r.dense_threshold.is_finite() || !r.sparse_threshold.is_finite() {
            bail!("retrieval thresholds must be finite numbers");
        }
        if r.dense_top_k == 0 || r.sparse_top_k == 0 {
            bail!("retrieval.dense_top_k and retrieval.sparse_top_k must be greater than 0");
        }
        if r.min_dense_hits == 0 {
            bail!("retrieval.min_dense_hits must be greater than 0");
        }

        if self.sparse.hash_dim == 0 {
            bail!("sparse.hash_dim must be greater than 0");
        }
        if self.sparse.min_doc_freq == 0 {
            bail!("sparse.min_doc_freq must be greater than 0");
        }

        // both end up as URL path segments
        if !is_path_segment(&self.pinecone.namespace) {
            bail!(
                "pinecone.namespace '{}' must be non-empty and use only letters, digits, '-', '_' or '.'",
                self.pinecone.namespace
            );
        }
        if !is_path_segment(&self.pinecone.index) {
            bail!(
                "pinecone.index '{}' must be non-empty and use only letters, digits, '-', '_' or '.'",
                self.pinecone.index
            );
        }
        if self.pinecone.timeout_secs == 0 || self.openai.timeout_secs == 0 {
            bail!("timeout_secs must be greater than 0");
        }

        Ok(())
    }

    /// Pipeline tunables from the config file.
    pub fn retrieval_config(&self) -> RetrievalConfig {
        let mut config = RetrievalConfig::new(self.pinecone.namespace.as_str());
        config.dense_top_k = self.retrieval.dense_top_k;
        config.sparse_top_k = self.retrieval.sparse_top_k;
        config.dense_threshold = self.retrieval.dense_threshold;
        config.sparse_threshold = self.retrieval.sparse_threshold;
        config.min_dense_hits = self.retrieval.min_dense_hits;
        config
    }

    /// Corpus paths, relative ones resolved against the base path.
    pub fn corpus_paths(&self) -> Vec<PathBuf> {
        self.corpus
            .iter()
            .map(|p| {
                if p.is_absolute() {
                    p.clone()
                } else {
                    self.base_path.join(p)
                }
            })
            .collect()
    }
}

fn is_path_segment(name: &str) -> bool {
    !name.is_empty()
        && name
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

fn write_atomic(path: &Path, contents: &str) -> anyhow::Result<()> {
    let temp_path = path.with_extension("yaml.tmp");
    std::fs::write(&temp_path, contents)
        .with_context(|| format!("failed to write {}", temp_path.display()))?;
    std::fs::rename(&temp_path, path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn test_load_creates_default_config() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_with(dir.path()).unwrap();

        assert!(dir.path().join(CONFIG_FILE).exists());
        assert_eq!(config.backend, Backend::Pinecone);
        assert_eq!(config.pinecone.index, "recipes-vector-db");
        assert_eq!(config.pinecone.namespace, "main_recipes");
        assert_eq!(config.pinecone.rerank_model.as_deref(), Some("bge-reranker-v2-m3"));
        assert_eq!(config.sparse.hash_dim, 1 << 18);
        assert_eq!(config.sparse.min_doc_freq, 1);
        assert_eq!(config.retrieval.min_dense_hits, 3);
        assert!(config.corpus.is_empty());
    }

    #[test]
    fn test_partial_config_filled_with_defaults() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "backend: local\nretrieval:\n  dense_threshold: 0.6\npinecone:\n  rerank_model: null\n",
        )
        .unwrap();

        let config = Config::load_with(dir.path()).unwrap();
        assert_eq!(config.backend, Backend::Local);
        assert_eq!(config.retrieval.dense_threshold, 0.6);
        assert_eq!(config.retrieval.dense_top_k, 10);
        assert_eq!(config.pinecone.rerank_model, None);

        // defaults were written back
        let saved = std::fs::read_to_string(dir.path().join(CONFIG_FILE)).unwrap();
        assert!(saved.contains("sparse_top_k"));
    }

    #[test]
    fn test_invalid_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "retrieval:\n  min_dense_hits: 0\n",
        )
        .unwrap();

        let err = Config::load_with(dir.path()).unwrap_err();
        assert!(err.to_string().contains("min_dense_hits"));
    }

    #[test]
    fn test_malformed_config_rejected() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(CONFIG_FILE), "backend: [").unwrap();
        assert!(Config::load_with(dir.path()).is_err());
    }

    #[test]
    fn test_env_overrides() {
        let env: HashMap<&str, &str> = HashMap::from([
            ("PINECONE_INDEX", "other-index"),
            ("PINECONE_NAMESPACE", "family"),
            ("SPARSE_HASH_DIM", "1024"),
            ("SPARSE_MIN_DF", "2"),
        ]);

        let mut config = Config::default();
        config
            .apply_env_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();

        assert_eq!(config.pinecone.index, "other-index");
        assert_eq!(config.pinecone.namespace, "family");
        assert_eq!(config.sparse.hash_dim, 1024);
        assert_eq!(config.sparse.min_doc_freq, 2);
        assert_eq!(config.retrieval_config().namespace, "family");
    }

    #[test]
    fn test_env_override_preferred_name_wins() {
        let env: HashMap<&str, &str> =
            HashMap::from([("SPARSE_MIN_DOC_FREQ", "3"), ("SPARSE_MIN_DF", "2")]);

        let mut config = Config::default();
        config
            .apply_env_overrides(|key| env.get(key).map(|v| v.to_string()))
            .unwrap();
        assert_eq!(config.sparse.min_doc_freq, 3);
    }

    #[test]
    fn test_env_override_bad_number() {
        let mut config = Config::default();
        let result = config.apply_env_overrides(|key| {
            (key == "SPARSE_HASH_DIM").then(|| "lots".to_string())
        });
        assert!(result.is_err());
    }

    #[test]
    fn test_namespace_must_be_a_path_segment() {
        for bad in ["", "main/recipes", "main?x=1", "main recipes", "50%"] {
            let dir = tempfile::tempdir().unwrap();
            std::fs::write(
                dir.path().join(CONFIG_FILE),
                format!("pinecone:\n  namespace: \"{bad}\"\n"),
            )
            .unwrap();

            let err = Config::load_with(dir.path()).unwrap_err();
            assert!(err.to_string().contains("pinecone.namespace"), "{bad:?}");
        }

        let mut config = Config::default();
        config.pinecone.namespace = "family_v2.1".to_string();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_namespace_env_override_is_validated() {
        let mut config = Config::default();
        config
            .apply_env_overrides(|key| (key == "PINECONE_NAMESPACE").then(|| "a/b".to_string()))
            .unwrap();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_corpus_paths_resolved_against_base() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(
            dir.path().join(CONFIG_FILE),
            "corpus:\n  - recipes.json\n  - /abs/extra.json\n",
        )
        .unwrap();

        let config = Config::load_with(dir.path()).unwrap();
        let paths = config.corpus_paths();
        assert_eq!(paths[0], dir.path().join("recipes.json"));
        assert_eq!(paths[1], PathBuf::from("/abs/extra.json"));
    }
}
