mod mmr;
pub mod pool;

pub use pool::{RerankerLease, RerankerPool};

use std::sync::Arc;

use async_trait::async_trait;
use common::{error::AppError, types::Document};
use tracing::{debug, instrument, warn};

use crate::pipeline::config::RetrievalTuning;

/// Cross-encoder seam: scores every (query, document) pair jointly. Higher
/// is more relevant; the scale is unbounded.
#[async_trait]
pub trait PairScorer: Send + Sync {
    async fn score_pairs(&self, query: &str, documents: Vec<String>) -> Result<Vec<f32>, AppError>;
}

/// Relevance reranking with cross-encoder scores, followed by maximal
/// marginal relevance selection when there are more candidates than the
/// final context can hold.
pub struct CrossEncoderReranker {
    scorer: Arc<dyn PairScorer>,
    tuning: RetrievalTuning,
}

impl CrossEncoderReranker {
    pub fn new(scorer: Arc<dyn PairScorer>, tuning: RetrievalTuning) -> Self {
        Self { scorer, tuning }
    }

    /// Returns at most `final_context_k` documents, most relevant and
    /// diverse first. A scorer failure degrades to the incoming order.
    #[instrument(skip_all, fields(candidates = documents.len()))]
    pub async fn rerank(&self, query: &str, documents: Vec<Document>) -> Vec<Document> {
        if documents.is_empty() {
            return documents;
        }

        let texts: Vec<String> = documents.iter().map(|doc| doc.content.clone()).collect();
        let scores = match self.scorer.score_pairs(query, texts).await {
            Ok(scores) if scores.len() == documents.len() => scores,
            Ok(scores) => {
                warn!(
                    expected = documents.len(),
                    received = scores.len(),
                    "Pair scorer returned a mismatched score count; keeping original order"
                );
                return self.truncate_passthrough(documents);
            }
            Err(err) => {
                warn!(error = %err, "Pair scoring failed; keeping original order");
                return self.truncate_passthrough(documents);
            }
        };

        let mut ranked: Vec<(Document, f32)> = documents.into_iter().zip(scores).collect();
        ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        ranked.truncate(self.tuning.post_rerank_k);

        let target = self.tuning.final_context_k;
        if ranked.len() <= target {
            return ranked.into_iter().map(|(doc, _)| doc).collect();
        }

        debug!(
            candidates = ranked.len(),
            target,
            lambda = self.tuning.mmr_lambda,
            "Applying MMR diversity selection"
        );

        let relevance: Vec<f32> = ranked.iter().map(|(_, score)| *score).collect();
        let documents: Vec<Document> = ranked.into_iter().map(|(doc, _)| doc).collect();
        let selected = mmr::select(&documents, &relevance, self.tuning.mmr_lambda, target);

        let mut slots: Vec<Option<Document>> = documents.into_iter().map(Some).collect();
        selected
            .into_iter()
            .filter_map(|idx| slots.get_mut(idx).and_then(Option::take))
            .collect()
    }

    fn truncate_passthrough(&self, mut documents: Vec<Document>) -> Vec<Document> {
        documents.truncate(self.tuning.final_context_k);
        documents
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::DocumentMetadata;

    struct FixedScorer {
        scores: Vec<f32>,
    }

    #[async_trait]
    impl PairScorer for FixedScorer {
        async fn score_pairs(
            &self,
            _query: &str,
            _documents: Vec<String>,
        ) -> Result<Vec<f32>, AppError> {
            Ok(self.scores.clone())
        }
    }

    struct FailingScorer;

    #[async_trait]
    impl PairScorer for FailingScorer {
        async fn score_pairs(
            &self,
            _query: &str,
            _documents: Vec<String>,
        ) -> Result<Vec<f32>, AppError> {
            Err(AppError::InternalError("cross-encoder offline".into()))
        }
    }

    fn documents(contents: &[&str]) -> Vec<Document> {
        contents
            .iter()
            .map(|content| Document::new(*content, DocumentMetadata::default()))
            .collect()
    }

    fn tuning(post_rerank_k: usize, final_context_k: usize) -> RetrievalTuning {
        RetrievalTuning {
            post_rerank_k,
            final_context_k,
            ..Default::default()
        }
    }

    #[tokio::test]
    async fn reranks_by_score_and_truncates() {
        let docs = documents(&["low relevance", "high relevance", "medium relevance"]);
        let reranker = CrossEncoderReranker::new(
            Arc::new(FixedScorer {
                scores: vec![0.1, 0.9, 0.5],
            }),
            tuning(3, 2),
        );

        let result = reranker.rerank("question", docs).await;

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].content, "high relevance");
        assert_eq!(result[1].content, "medium relevance");
    }

    #[tokio::test]
    async fn scorer_failure_keeps_incoming_order() {
        let docs = documents(&["first", "second", "third"]);
        let reranker = CrossEncoderReranker::new(Arc::new(FailingScorer), tuning(3, 2));

        let result = reranker.rerank("question", docs).await;

        assert_eq!(result.len(), 2);
        assert_eq!(result[0].content, "first");
        assert_eq!(result[1].content, "second");
    }

    #[tokio::test]
    async fn small_candidate_sets_skip_mmr() {
        let docs = documents(&["only one"]);
        let reranker = CrossEncoderReranker::new(
            Arc::new(FixedScorer { scores: vec![1.0] }),
            tuning(15, 8),
        );

        let result = reranker.rerank("question", docs).await;
        assert_eq!(result.len(), 1);
    }

    #[tokio::test]
    async fn empty_candidates_stay_empty() {
        let reranker =
            CrossEncoderReranker::new(Arc::new(FailingScorer), RetrievalTuning::default());
        assert!(reranker.rerank("question", Vec::new()).await.is_empty());
    }
}
