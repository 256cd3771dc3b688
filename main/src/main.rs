use std::sync::Arc;

use clap::Parser;
use common::{
    error::AppError,
    types::DatasetCategory,
    utils::{
        config::get_config,
        embedding::EmbeddingProvider,
        llm::OpenAiCompletions,
    },
};
use retrieval_pipeline::{
    assemble_context, Corpus, IndexRegistry, PairScorer, RagPipeline, RerankerPool,
    RetrievalTuning,
};
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Ask one question against the indexed dataset corpus and print the
/// retrieved context plus pipeline stats.
#[derive(Debug, Parser)]
#[command(name = "fasal", about = "Retrieval pipeline for agricultural and climate dataset QA")]
struct Args {
    /// Question to retrieve context for.
    #[arg(long)]
    question: String,

    /// Restrict retrieval to one dataset category (agriculture | climate).
    #[arg(long)]
    category: Option<String>,

    /// Skip enhancement, reranking and compression; plain similarity search.
    #[arg(long)]
    plain: bool,

    /// Approximate word budget for the assembled context.
    #[arg(long, default_value_t = 3000)]
    max_tokens: usize,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let args = Args::parse();

    let category = args
        .category
        .as_deref()
        .map(str::parse::<DatasetCategory>)
        .transpose()
        .map_err(AppError::Validation)?;

    // Configuration errors are fatal before any question is processed.
    let config = get_config().map_err(AppError::from)?;

    let corpus = Arc::new(Corpus::from_json_file(&config.corpus_path)?);
    info!(
        documents = corpus.len(),
        path = %config.corpus_path,
        "Corpus loaded"
    );

    let openai_client = Arc::new(async_openai::Client::with_config(
        async_openai::config::OpenAIConfig::new()
            .with_api_key(&config.openai_api_key)
            .with_api_base(&config.openai_base_url),
    ));

    let embedding_provider =
        EmbeddingProvider::from_config(&config, Some(Arc::clone(&openai_client))).await?;
    info!(
        embedding_backend = embedding_provider.backend_label(),
        embedding_dimension = embedding_provider.dimension(),
        "Embedding provider initialized"
    );

    let registry = IndexRegistry::new();
    let dense = registry
        .get_or_build("datasets", corpus.documents(), &embedding_provider)
        .await?;

    let completions = Arc::new(OpenAiCompletions::from_config(&config));
    let pair_scorer = RerankerPool::maybe_from_config(&config)?
        .map(|pool| pool as Arc<dyn PairScorer>);

    let pipeline = RagPipeline::new(
        corpus,
        dense,
        completions,
        pair_scorer,
        RetrievalTuning::default(),
    );

    let output = pipeline
        .process(&args.question, &[], category, !args.plain)
        .await?;

    let context = assemble_context(&output.answer_context, args.max_tokens);
    println!("{context}");
    println!();
    println!("{}", serde_json::to_string_pretty(&output.stats)?);

    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::{Document, DocumentMetadata};
    use std::io::Write;

    #[tokio::test]
    async fn smoke_run_with_hashed_embeddings() {
        let mut corpus_file = tempfile::NamedTempFile::new().expect("temp corpus file");
        let documents = vec![
            Document::new(
                "rice production in punjab reached 12 million tonnes",
                DocumentMetadata {
                    category: Some(DatasetCategory::Agriculture),
                    dataset_name: Some("Crop Production Data".into()),
                    ..Default::default()
                },
            ),
            Document::new(
                "annual rainfall in kerala measured 2900 mm",
                DocumentMetadata {
                    category: Some(DatasetCategory::Climate),
                    dataset_name: Some("Subdivision Rainfall Data".into()),
                    ..Default::default()
                },
            ),
        ];
        corpus_file
            .write_all(serde_json::to_string(&documents).expect("serialize").as_bytes())
            .expect("write corpus");

        let corpus =
            Arc::new(Corpus::from_json_file(corpus_file.path()).expect("corpus should load"));
        assert_eq!(corpus.len(), 2);

        let provider = EmbeddingProvider::new_hashed(128).expect("hashed provider");
        let registry = IndexRegistry::new();
        let dense = registry
            .get_or_build("smoke", corpus.documents(), &provider)
            .await
            .expect("dense index");

        struct NoCompletions;

        #[async_trait::async_trait]
        impl common::utils::llm::Completions for NoCompletions {
            async fn complete(&self, _prompt: &str) -> Result<String, AppError> {
                Err(AppError::InternalError("offline".into()))
            }
        }

        let pipeline = RagPipeline::new(
            corpus,
            dense,
            Arc::new(NoCompletions),
            None,
            RetrievalTuning::default(),
        );

        let output = pipeline
            .process("rice production in punjab", &[], None, true)
            .await
            .expect("pipeline run");

        assert!(!output.answer_context.is_empty());
        let context = assemble_context(&output.answer_context, 3000);
        assert!(context.contains("Crop Production Data"));
    }
}
