use clap::{Args as ClapArgs, Parser, Subcommand};

use crate::retrieval::RetrievalConfig;

#[derive(Parser, Debug)]
#[command(version, about = "Recipe assistant: search your collection, generate when nothing fits", long_about = None)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,
}

/// Per-invocation overrides of the `retrieval` config section.
#[derive(ClapArgs, Debug, Clone, Default)]
pub struct RetrievalArgs {
    /// Minimum dense score to accept a match
    #[clap(short = 't', long)]
    pub threshold: Option<f32>,

    /// Minimum sparse score to accept a match
    #[clap(long)]
    pub sparse_threshold: Option<f32>,

    /// Dense hits needed before sparse search is skipped
    #[clap(long)]
    pub min_dense_hits: Option<usize>,

    /// Number of dense results to request
    #[clap(long)]
    pub dense_top_k: Option<usize>,

    /// Number of sparse results to request
    #[clap(long)]
    pub sparse_top_k: Option<usize>,
}

impl RetrievalArgs {
    /// Overlay the flags that were given onto `base`.
    pub fn apply(&self, mut base: RetrievalConfig) -> anyhow::Result<RetrievalConfig> {
        if let Some(threshold) = self.threshold {
            base.dense_threshold = threshold;
        }
        if let Some(threshold) = self.sparse_threshold {
            base.sparse_threshold = threshold;
        }
        if let Some(min) = self.min_dense_hits {
            base.min_dense_hits = min;
        }
        if let Some(k) = self.dense_top_k {
            base.dense_top_k = k;
        }
        if let Some(k) = self.sparse_top_k {
            base.sparse_top_k = k;
        }

        anyhow::ensure!(
            base.dense_threshold.is_finite() && base.sparse_threshold.is_finite(),
            "thresholds must be finite numbers"
        );
        anyhow::ensure!(
            base.dense_top_k > 0 && base.sparse_top_k > 0,
            "--dense-top-k and --sparse-top-k must be greater than 0"
        );
        anyhow::ensure!(base.min_dense_hits > 0, "--min-dense-hits must be greater than 0");

        Ok(base)
    }
}

#[derive(Subcommand, Debug, Clone)]
pub enum Command {
    /// Answer a single question and exit
    Ask {
        query: String,

        #[command(flatten)]
        retrieval: RetrievalArgs,
    },

    /// Interactive session
    Chat {
        #[command(flatten)]
        retrieval: RetrievalArgs,
    },

    /// Embed the corpus and upsert it into the Pinecone index
    Upsert {},

    /// Recreate the Pinecone index with the dotproduct metric
    /// required for hybrid search, then re-upsert the corpus
    Migrate {
        /// Actually delete and recreate the index (dry run otherwise)
        #[clap(long, default_value = "false")]
        execute: bool,
    },

    /// Print the sparse encoding of a text as JSON
    Encode { text: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_ask_with_overrides() {
        let args = Args::try_parse_from([
            "recipe-rag",
            "ask",
            "seafood pasta",
            "-t",
            "0.5",
            "--min-dense-hits",
            "1",
        ])
        .unwrap();

        let Command::Ask { query, retrieval } = args.command else {
            panic!("expected ask");
        };
        assert_eq!(query, "seafood pasta");

        let config = retrieval.apply(RetrievalConfig::new("main_recipes")).unwrap();
        assert_eq!(config.dense_threshold, 0.5);
        assert_eq!(config.min_dense_hits, 1);
        assert_eq!(config.sparse_top_k, 10);
    }

    #[test]
    fn test_parse_migrate_defaults_to_dry_run() {
        let args = Args::try_parse_from(["recipe-rag", "migrate"]).unwrap();
        assert!(matches!(args.command, Command::Migrate { execute: false }));

        let args = Args::try_parse_from(["recipe-rag", "migrate", "--execute"]).unwrap();
        assert!(matches!(args.command, Command::Migrate { execute: true }));
    }

    #[test]
    fn test_rejects_zero_top_k() {
        let args = RetrievalArgs {
            dense_top_k: Some(0),
            ..Default::default()
        };
        assert!(args.apply(RetrievalConfig::new("ns")).is_err());
    }
}
