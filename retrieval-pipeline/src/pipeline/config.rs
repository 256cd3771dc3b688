use serde::{Deserialize, Serialize};

/// Tunable parameters that govern each retrieval stage. Fixed at process
/// start; not part of per-request state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RetrievalTuning {
    /// Cap on query variations produced by synonym and generative expansion.
    pub max_query_variations: usize,
    /// How many of the expanded queries drive broad retrieval.
    pub broad_query_limit: usize,
    /// Top-k fetched per index per query during broad retrieval.
    pub initial_retrieval_k: usize,
    /// Candidates kept after reciprocal rank fusion.
    pub post_fusion_k: usize,
    /// Candidates kept after combined re-scoring and after cross-encoder
    /// reranking.
    pub post_rerank_k: usize,
    /// Documents handed to context compression.
    pub final_context_k: usize,
    /// Top-k for the plain similarity path used when advanced features are
    /// disabled.
    pub plain_retrieval_k: usize,
    /// Reciprocal rank fusion constant.
    pub rrf_k: f32,
    /// Weight of the fused retrieval score in combined re-scoring.
    pub dense_weight: f32,
    /// Weight of metadata relevance in combined re-scoring.
    pub metadata_weight: f32,
    /// MMR balance between relevance (1.0) and diversity (0.0).
    pub mmr_lambda: f32,
    /// Sentences kept per document during compression.
    pub max_key_sentences: usize,
    /// Sentences at or below this length are ignored during extraction.
    pub min_sentence_chars: usize,
    /// Sentence-reduced text longer than this goes through LLM extraction.
    pub llm_compression_threshold_chars: usize,
    /// Word-set overlap ratio above which documents count as near-duplicates.
    pub near_duplicate_overlap: f32,
    /// Default word-based token budget for assembled context.
    pub context_token_budget: usize,
}

impl Default for RetrievalTuning {
    fn default() -> Self {
        Self {
            max_query_variations: 3,
            broad_query_limit: 3,
            initial_retrieval_k: 50,
            post_fusion_k: 30,
            post_rerank_k: 15,
            final_context_k: 8,
            plain_retrieval_k: 10,
            rrf_k: 60.0,
            dense_weight: 0.5,
            metadata_weight: 0.2,
            mmr_lambda: 0.7,
            max_key_sentences: 8,
            min_sentence_chars: 20,
            llm_compression_threshold_chars: 800,
            near_duplicate_overlap: 0.8,
            context_token_budget: 3000,
        }
    }
}
