pub mod config;

pub use config::RetrievalTuning;

use std::sync::Arc;

use common::{
    error::AppError,
    types::{ChatMessage, DatasetCategory, Document},
    utils::llm::Completions,
};
use serde::Serialize;
use tracing::{debug, info, instrument};

use crate::{
    compress::ContextCompressor,
    dense::VectorIndex,
    enhancement::QueryEnhancer,
    rerank::{CrossEncoderReranker, PairScorer},
    retriever::HybridRetriever,
    vocab::EntitySet,
    Corpus,
};

/// Per-stage counters returned with every processed question.
#[derive(Debug, Clone, Serialize)]
pub struct PipelineStats {
    pub variation_count: usize,
    pub retrieved_count: usize,
    pub reranked_count: usize,
    pub final_count: usize,
    pub entities_found: EntitySet,
}

/// Result handed to the answer-generation layer: the compressed context
/// documents plus stage counters.
#[derive(Debug, Clone, Serialize)]
pub struct ProcessOutput {
    pub answer_context: Vec<Document>,
    pub stats: PipelineStats,
}

/// The full retrieval pipeline: enhancement, hybrid retrieval, reranking,
/// compression. Every backend handle is injected at construction; nothing is
/// shared mutably across requests except the read-only indexes and tuning.
pub struct RagPipeline {
    enhancer: QueryEnhancer,
    retriever: HybridRetriever,
    reranker: Option<CrossEncoderReranker>,
    compressor: ContextCompressor,
    tuning: RetrievalTuning,
}

impl RagPipeline {
    pub fn new(
        corpus: Arc<Corpus>,
        dense: Arc<dyn VectorIndex>,
        completions: Arc<dyn Completions>,
        pair_scorer: Option<Arc<dyn PairScorer>>,
        tuning: RetrievalTuning,
    ) -> Self {
        Self {
            enhancer: QueryEnhancer::new(Arc::clone(&completions), tuning.max_query_variations),
            retriever: HybridRetriever::new(corpus, dense, tuning.clone()),
            reranker: pair_scorer
                .map(|scorer| CrossEncoderReranker::new(scorer, tuning.clone())),
            compressor: ContextCompressor::new(completions, tuning.clone()),
            tuning,
        }
    }

    /// Processes one question through the whole pipeline. With
    /// `enable_advanced_features` false, enhancement, reranking and
    /// compression are bypassed in favour of one plain similarity retrieval.
    #[instrument(skip_all, fields(advanced = enable_advanced_features))]
    pub async fn process(
        &self,
        question: &str,
        chat_history: &[ChatMessage],
        category: Option<DatasetCategory>,
        enable_advanced_features: bool,
    ) -> Result<ProcessOutput, AppError> {
        if question.trim().is_empty() {
            return Err(AppError::Validation(
                "question must not be empty or whitespace-only".to_string(),
            ));
        }

        // History is owned by the caller; the core only passes it onward to
        // the answering layer.
        debug!(history_messages = chat_history.len(), "Processing question");

        if !enable_advanced_features {
            return Ok(self.plain_process(question).await);
        }

        let enhanced = self.enhancer.enhance(question).await;
        let queries = enhanced.search_queries();

        let retrieved = self
            .retriever
            .retrieve(&queries, &enhanced.entities, category)
            .await;
        let retrieved_count = retrieved.len();

        let reranked = match &self.reranker {
            Some(reranker) if retrieved_count > self.tuning.final_context_k => {
                reranker.rerank(question, retrieved).await
            }
            Some(_) | None => {
                if self.reranker.is_none() {
                    debug!("No pair scorer provided; skipping rerank stage");
                }
                let mut kept = retrieved;
                kept.truncate(self.tuning.final_context_k);
                kept
            }
        };
        let reranked_count = reranked.len();

        let answer_context = self.compressor.compress(question, reranked).await;

        let stats = PipelineStats {
            variation_count: queries.len(),
            retrieved_count,
            reranked_count,
            final_count: answer_context.len(),
            entities_found: enhanced.entities,
        };

        info!(
            variations = stats.variation_count,
            retrieved = stats.retrieved_count,
            reranked = stats.reranked_count,
            final_count = stats.final_count,
            "Pipeline complete"
        );

        Ok(ProcessOutput {
            answer_context,
            stats,
        })
    }

    /// Compresses-then-assembles a context string for the answering layer.
    pub async fn context_text(
        &self,
        question: &str,
        documents: Vec<Document>,
        max_tokens: usize,
    ) -> String {
        self.compressor
            .build_context_text(question, documents, max_tokens)
            .await
    }

    async fn plain_process(&self, question: &str) -> ProcessOutput {
        let documents = self
            .retriever
            .plain(question, self.tuning.plain_retrieval_k)
            .await;
        let count = documents.len();

        ProcessOutput {
            answer_context: documents,
            stats: PipelineStats {
                variation_count: 1,
                retrieved_count: count,
                reranked_count: count,
                final_count: count,
                entities_found: EntitySet::default(),
            },
        }
    }
}
