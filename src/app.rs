use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, bail, Context};
use indicatif::{ProgressBar, ProgressStyle};

use crate::{
    config::{Backend, Config},
    corpus::{self, RecipeRecord},
    format::format_response,
    providers::{
        memory::{VectorEntry, VectorIndex},
        openai::{OpenAiEmbedder, OpenAiResponder},
        pinecone::{PineconeControl, PineconeIndex, UpsertRecord},
        EmbeddingProvider, Responder, SearchProvider,
    },
    retrieval::{ResolvedAnswer, RetrievalConfig, RetrievalPipeline, SparseEncoder},
};

/// Metric required for hybrid (dense + sparse) queries
const HYBRID_METRIC: &str = "dotproduct";

const PROGRESS_TEMPLATE: &str = "{msg:>10} [{bar:40}] {pos}/{len}";

fn pinecone_api_key() -> anyhow::Result<String> {
    std::env::var("PINECONE_API_KEY").context("PINECONE_API_KEY is not set")
}

fn openai_api_key() -> anyhow::Result<String> {
    std::env::var("OPENAI_API_KEY").context("OPENAI_API_KEY is not set")
}

/// Load the configured corpus and fit the sparse encoder on it.
pub fn load_encoder(config: &Config) -> anyhow::Result<(SparseEncoder, Vec<RecipeRecord>)> {
    let records = corpus::load_corpus(&config.corpus_paths())?;
    let encoder = SparseEncoder::build(
        records.iter().map(|r| r.content.as_str()),
        config.sparse.hash_dim,
        config.sparse.min_doc_freq,
    );

    log::info!(
        "sparse encoder fitted on {} records ({} of {} buckets weighted)",
        records.len(),
        encoder.weighted_buckets(),
        encoder.dim()
    );

    Ok((encoder, records))
}

/// Embed every record and load it into an in-process index.
pub fn build_memory_index(
    embedder: &dyn EmbeddingProvider,
    encoder: &SparseEncoder,
    records: &[RecipeRecord],
    namespace: &str,
) -> anyhow::Result<VectorIndex> {
    let texts: Vec<String> = records.iter().map(|r| r.content.clone()).collect();
    let embeddings = embedder
        .embed_batch(&texts)
        .context("failed to embed corpus")?;

    if embeddings.len() != records.len() {
        bail!(
            "embedding model returned {} vectors for {} records",
            embeddings.len(),
            records.len()
        );
    }

    let mut index = VectorIndex::new();

    for (record, embedding) in records.iter().zip(embeddings) {
        let entry = VectorEntry {
            embedding,
            sparse: encoder.encode(&record.content),
            fields: record.flat_metadata(),
        };
        index
            .insert(namespace, record.id.as_str(), entry)
            .with_context(|| format!("failed to index record {}", record.id))?;
    }

    log::info!("indexed {} records in memory", index.len(namespace));
    Ok(index)
}

pub struct App {
    embedder: Arc<dyn EmbeddingProvider>,
    search: Arc<dyn SearchProvider>,
    responder: Arc<dyn Responder>,
    encoder: SparseEncoder,
}

impl App {
    /// Build every collaborator for the configured backend.
    pub fn new(config: Config) -> anyhow::Result<Self> {
        let (encoder, records) = load_encoder(&config)?;
        let timeout = Duration::from_secs(config.openai.timeout_secs);
        let openai_key = openai_api_key()?;

        let responder = Arc::new(OpenAiResponder::new(
            &openai_key,
            &config.openai.base_url,
            &config.openai.chat_model,
            timeout,
        )?);

        let embedder: Arc<dyn EmbeddingProvider>;
        let search: Arc<dyn SearchProvider>;

        match config.backend {
            Backend::Pinecone => {
                embedder = Arc::new(OpenAiEmbedder::new(
                    &openai_key,
                    &config.openai.base_url,
                    &config.openai.embedding_model,
                    timeout,
                )?);
                search = Arc::new(connect_pinecone(&config)?);
            }
            Backend::Local => {
                embedder = local_embedder(&config)?;
                let index = build_memory_index(
                    embedder.as_ref(),
                    &encoder,
                    &records,
                    &config.pinecone.namespace,
                )?;
                search = Arc::new(index);
            }
        }

        log::debug!(
            "using embedder {} with {} search",
            embedder.name(),
            search.name()
        );

        Ok(Self::from_parts(embedder, search, responder, encoder))
    }

    pub fn from_parts(
        embedder: Arc<dyn EmbeddingProvider>,
        search: Arc<dyn SearchProvider>,
        responder: Arc<dyn Responder>,
        encoder: SparseEncoder,
    ) -> Self {
        Self {
            embedder,
            search,
            responder,
            encoder,
        }
    }

    pub fn resolve(&self, query: &str, retrieval: &RetrievalConfig) -> anyhow::Result<ResolvedAnswer> {
        let pipeline = RetrievalPipeline::new(
            self.embedder.as_ref(),
            self.search.as_ref(),
            &self.encoder,
        );
        Ok(pipeline.resolve(query, retrieval)?)
    }

    /// Resolve `query` and render the responder's text with its source header.
    pub fn answer(&self, query: &str, retrieval: &RetrievalConfig) -> anyhow::Result<String> {
        let resolved = self.resolve(query, retrieval)?;

        let text = match &resolved {
            ResolvedAnswer::Generated => self.responder.generate_from_scratch(query)?,
            _ => self.responder.answer_from_hits(query, resolved.hits())?,
        };

        Ok(format_response(&text, resolved.source(), resolved.score()))
    }
}

#[cfg(feature = "local-embeddings")]
fn local_embedder(config: &Config) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    use crate::providers::local::LocalEmbedder;

    let embedder = LocalEmbedder::new(&config.local.model, config.base_path().to_path_buf())?;
    Ok(Arc::new(embedder))
}

#[cfg(not(feature = "local-embeddings"))]
fn local_embedder(_config: &Config) -> anyhow::Result<Arc<dyn EmbeddingProvider>> {
    Err(crate::providers::EmbeddingError::InitFailed(
        "backend 'local' requires the local-embeddings feature".to_string(),
    )
    .into())
}

fn resolve_pinecone_host(config: &Config, api_key: &str) -> anyhow::Result<String> {
    if let Some(host) = &config.pinecone.host {
        return Ok(host.clone());
    }

    let control = PineconeControl::new(api_key, Duration::from_secs(config.pinecone.timeout_secs))?;
    let description = control
        .describe_index(&config.pinecone.index)
        .with_context(|| format!("failed to look up index {}", config.pinecone.index))?;

    log::debug!("resolved host {} for index {}", description.host, description.name);
    Ok(description.host)
}

fn connect_pinecone(config: &Config) -> anyhow::Result<PineconeIndex> {
    let api_key = pinecone_api_key()?;
    let host = resolve_pinecone_host(config, &api_key)?;

    let index = PineconeIndex::new(
        &api_key,
        &host,
        config.pinecone.rerank_model.clone(),
        Duration::from_secs(config.pinecone.timeout_secs),
    )?;

    log::info!("using Pinecone index at {}", index.host());
    Ok(index)
}

fn progress_bar(len: usize, msg: &'static str) -> anyhow::Result<ProgressBar> {
    let bar = ProgressBar::new(len as u64);
    bar.set_style(ProgressStyle::with_template(PROGRESS_TEMPLATE)?.progress_chars("=> "));
    bar.set_message(msg);
    Ok(bar)
}

/// Build upsert payloads: dense values from `embedder`, sparse values from
/// `encoder` (left out when the content has no lexical signal).
pub fn upsert_records(
    embedder: &dyn EmbeddingProvider,
    encoder: &SparseEncoder,
    records: &[RecipeRecord],
    mut on_batch: impl FnMut(usize),
) -> anyhow::Result<Vec<UpsertRecord>> {
    let mut out = Vec::with_capacity(records.len());

    for batch in records.chunks(crate::providers::pinecone::UPSERT_BATCH_SIZE) {
        let texts: Vec<String> = batch.iter().map(|r| r.content.clone()).collect();
        let embeddings = embedder.embed_batch(&texts)?;

        if embeddings.len() != batch.len() {
            return Err(anyhow!(
                "embedding model returned {} vectors for {} records",
                embeddings.len(),
                batch.len()
            ));
        }

        for (record, values) in batch.iter().zip(embeddings) {
            let sparse = encoder.encode(&record.content);
            out.push(UpsertRecord {
                id: record.id.clone(),
                values,
                sparse_values: (!sparse.is_empty()).then_some(sparse),
                metadata: record.flat_metadata(),
            });
        }

        on_batch(batch.len());
    }

    Ok(out)
}

/// Embed the corpus and write it to the configured Pinecone index.
pub fn upsert(config: &Config) -> anyhow::Result<usize> {
    if config.backend == Backend::Local {
        bail!("upsert writes to Pinecone; the local backend indexes the corpus at startup");
    }

    let index = connect_pinecone(config)?;
    upsert_into(config, &index)
}

fn upsert_into(config: &Config, index: &PineconeIndex) -> anyhow::Result<usize> {
    let (encoder, records) = load_encoder(config)?;
    let embedder = OpenAiEmbedder::new(
        &openai_api_key()?,
        &config.openai.base_url,
        &config.openai.embedding_model,
        Duration::from_secs(config.openai.timeout_secs),
    )?;

    let bar = progress_bar(records.len(), "embedding")?;
    let payload = upsert_records(&embedder, &encoder, &records, |n| bar.inc(n as u64))?;
    bar.finish();

    let bar = progress_bar(payload.len(), "upserting")?;
    let upserted = index.upsert(&config.pinecone.namespace, &payload, |n| bar.inc(n as u64))?;
    bar.finish();

    log::info!(
        "upserted {upserted} vectors into {}/{}",
        config.pinecone.index,
        config.pinecone.namespace
    );
    Ok(upserted)
}

/// What `migrate` will do for an index with the given metric.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum MigrationPlan {
    AlreadyHybrid,
    Recreate { from_metric: String },
}

pub fn plan_migration(metric: &str) -> MigrationPlan {
    if metric.eq_ignore_ascii_case(HYBRID_METRIC) {
        MigrationPlan::AlreadyHybrid
    } else {
        MigrationPlan::Recreate {
            from_metric: metric.to_string(),
        }
    }
}

/// Recreate the index with the dotproduct metric and re-upsert the corpus.
///
/// Without `execute` only the plan is printed.
pub fn migrate(config: &Config, execute: bool) -> anyhow::Result<()> {
    let api_key = pinecone_api_key()?;
    let control = PineconeControl::new(&api_key, Duration::from_secs(config.pinecone.timeout_secs))?;
    let name = config.pinecone.index.as_str();

    let description = control
        .describe_index(name)
        .with_context(|| format!("failed to describe index {name}"))?;

    let from_metric = match plan_migration(&description.metric) {
        MigrationPlan::AlreadyHybrid => {
            println!("Index {name} already uses the {HYBRID_METRIC} metric. Nothing to do.");
            return Ok(());
        }
        MigrationPlan::Recreate { from_metric } => from_metric,
    };

    let dimension = description
        .dimension
        .with_context(|| format!("index {name} reports no dimension"))?;

    println!("Index {name}: metric {from_metric} -> {HYBRID_METRIC}, dimension {dimension}");
    println!(
        "Region: {} / {}, namespace: {}",
        config.pinecone.cloud, config.pinecone.region, config.pinecone.namespace
    );

    if !execute {
        println!("Dry run. Re-run with --execute to delete, recreate and re-upsert the index.");
        return Ok(());
    }

    log::warn!("deleting index {name}");
    control.delete_index(name)?;

    control.create_serverless_index(
        name,
        dimension,
        HYBRID_METRIC,
        &config.pinecone.cloud,
        &config.pinecone.region,
    )?;
    let ready = control.wait_until_ready(name)?;

    let index = PineconeIndex::new(
        &api_key,
        &ready.host,
        config.pinecone.rerank_model.clone(),
        Duration::from_secs(config.pinecone.timeout_secs),
    )?;
    let upserted = upsert_into(config, &index)?;

    println!("Recreated {name} and upserted {upserted} records");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plan_migration() {
        assert_eq!(plan_migration("dotproduct"), MigrationPlan::AlreadyHybrid);
        assert_eq!(plan_migration("DotProduct"), MigrationPlan::AlreadyHybrid);
        assert_eq!(
            plan_migration("cosine"),
            MigrationPlan::Recreate {
                from_metric: "cosine".to_string()
            }
        );
    }

    #[test]
    fn test_load_encoder_uses_seeds_by_default() {
        let dir = tempfile::tempdir().unwrap();
        let config = Config::load_with(dir.path()).unwrap();

        let (encoder, records) = load_encoder(&config).unwrap();
        assert_eq!(records.len(), 3);
        assert!(encoder.weighted_buckets() > 0);
        assert!(!encoder.encode("shrimp linguine").is_empty());
    }
}
