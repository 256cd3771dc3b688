use std::{cmp::Ordering, sync::Arc};

use common::types::{DatasetCategory, Document};
use futures::future::join_all;
use tracing::{debug, instrument, warn};

use crate::{
    dense::VectorIndex,
    lexical::LexicalIndex,
    pipeline::config::RetrievalTuning,
    scoring::{distance_to_similarity, reciprocal_rank_fusion, RankedHit},
    vocab::EntitySet,
    Corpus,
};

const CROP_MATCH_WEIGHT: f32 = 0.3;
const STATE_MATCH_WEIGHT: f32 = 0.3;
const METRIC_MATCH_WEIGHT: f32 = 0.2;
const CATEGORY_ALIGNMENT_BONUS: f32 = 0.2;

/// Multi-stage hybrid retriever: broad dense+sparse retrieval over query
/// variants, reciprocal rank fusion, entity-based metadata filtering, an
/// optional category filter, then combined re-scoring.
pub struct HybridRetriever {
    corpus: Arc<Corpus>,
    dense: Arc<dyn VectorIndex>,
    lexical: LexicalIndex,
    tuning: RetrievalTuning,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    doc: usize,
    fused: f32,
}

impl HybridRetriever {
    pub fn new(corpus: Arc<Corpus>, dense: Arc<dyn VectorIndex>, tuning: RetrievalTuning) -> Self {
        let lexical = LexicalIndex::build(corpus.documents());
        Self {
            corpus,
            dense,
            lexical,
            tuning,
        }
    }

    #[instrument(skip_all, fields(queries = queries.len()))]
    pub async fn retrieve(
        &self,
        queries: &[String],
        entities: &EntitySet,
        category: Option<DatasetCategory>,
    ) -> Vec<Document> {
        if queries.is_empty() || self.corpus.is_empty() {
            return Vec::new();
        }

        let ranked_lists = self.broad_retrieval(queries).await;
        debug!(lists = ranked_lists.len(), "Broad retrieval complete");

        let mut fused: Vec<Candidate> = reciprocal_rank_fusion(&ranked_lists, self.tuning.rrf_k)
            .into_iter()
            .map(|hit| Candidate {
                doc: hit.doc,
                fused: hit.score,
            })
            .collect();
        fused.truncate(self.tuning.post_fusion_k);

        let filtered = self.filter_by_entities(fused, entities);
        let filtered = self.filter_by_category(filtered, category);

        let mut scored: Vec<(Candidate, f32)> = filtered
            .into_iter()
            .map(|candidate| {
                let relevance = self
                    .corpus
                    .get(candidate.doc)
                    .map(|doc| metadata_relevance(doc, entities))
                    .unwrap_or_default();
                let final_score = self.tuning.dense_weight * candidate.fused
                    + self.tuning.metadata_weight * relevance;
                (candidate, final_score)
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(self.tuning.post_rerank_k);

        debug!(results = scored.len(), "Hybrid retrieval complete");

        scored
            .into_iter()
            .filter_map(|(candidate, _)| self.corpus.get(candidate.doc).cloned())
            .collect()
    }

    /// Plain dense similarity retrieval, used when advanced features are
    /// disabled.
    pub async fn plain(&self, query: &str, k: usize) -> Vec<Document> {
        match self.dense.search(query, k).await {
            Ok(hits) => hits
                .into_iter()
                .filter_map(|hit| self.corpus.get(hit.doc).cloned())
                .collect(),
            Err(err) => {
                warn!(error = %err, "Plain similarity retrieval failed; returning no documents");
                Vec::new()
            }
        }
    }

    /// Dense and sparse top-k lists for the leading query variants. An index
    /// error degrades that list to empty; the pipeline continues with
    /// whatever lists succeeded.
    async fn broad_retrieval(&self, queries: &[String]) -> Vec<Vec<RankedHit>> {
        let take = self.tuning.broad_query_limit.min(queries.len());
        let k = self.tuning.initial_retrieval_k;

        let dense_lists = join_all(queries.iter().take(take).map(|query| async move {
            match self.dense.search(query, k).await {
                Ok(hits) => hits
                    .into_iter()
                    .map(|hit| {
                        RankedHit::new(
                            self.corpus.canonical_id(hit.doc),
                            distance_to_similarity(hit.distance),
                        )
                    })
                    .collect(),
                Err(err) => {
                    warn!(error = %err, query = %query, "Dense retrieval failed; skipping this list");
                    Vec::new()
                }
            }
        }))
        .await;

        let mut lists = Vec::with_capacity(take * 2);
        for (query, dense_hits) in queries.iter().take(take).zip(dense_lists) {
            lists.push(dense_hits);

            let sparse_hits = self
                .lexical
                .search(query, k)
                .into_iter()
                .map(|hit| RankedHit::new(self.corpus.canonical_id(hit.doc), hit.score))
                .collect();
            lists.push(sparse_hits);
        }
        lists
    }

    /// Keeps documents matching at least one extracted crop, state, or metric
    /// term. Prefers recall over precision: if scoping entities matched
    /// nothing, the unfiltered fused set is used instead of an empty result.
    fn filter_by_entities(&self, fused: Vec<Candidate>, entities: &EntitySet) -> Vec<Candidate> {
        if entities.is_empty() {
            return fused;
        }

        let filtered: Vec<Candidate> = fused
            .iter()
            .copied()
            .filter(|candidate| {
                let Some(doc) = self.corpus.get(candidate.doc) else {
                    return false;
                };
                let matched = entities.crops.iter().any(|term| doc.matches_term(term))
                    || entities.states.iter().any(|term| doc.matches_term(term))
                    || entities.metrics.iter().any(|term| doc.matches_term(term));
                matched || !entities.has_scoping_terms()
            })
            .collect();

        if filtered.is_empty() {
            debug!("Entity filter matched nothing; falling back to unfiltered candidates");
            fused
        } else {
            filtered
        }
    }

    fn filter_by_category(
        &self,
        candidates: Vec<Candidate>,
        category: Option<DatasetCategory>,
    ) -> Vec<Candidate> {
        let Some(category) = category else {
            return candidates;
        };

        candidates
            .into_iter()
            .filter(|candidate| {
                self.corpus
                    .get(candidate.doc)
                    .and_then(|doc| doc.metadata.category)
                    .is_some_and(|doc_category| doc_category == category)
            })
            .collect()
    }
}

/// Capped-at-1.0 sum of weighted entity matches plus a bonus when the
/// question's domain aligns with the document's category.
fn metadata_relevance(doc: &Document, entities: &EntitySet) -> f32 {
    let mut score = 0.0;

    let crop_matches = entities
        .crops
        .iter()
        .filter(|term| doc.matches_term(term))
        .count();
    score += crop_matches as f32 * CROP_MATCH_WEIGHT;

    let state_matches = entities
        .states
        .iter()
        .filter(|term| doc.matches_term(term))
        .count();
    score += state_matches as f32 * STATE_MATCH_WEIGHT;

    let metric_matches = entities
        .metrics
        .iter()
        .filter(|term| doc.matches_term(term))
        .count();
    score += metric_matches as f32 * METRIC_MATCH_WEIGHT;

    match doc.metadata.category {
        Some(DatasetCategory::Climate) if !entities.climate_terms.is_empty() => {
            score += CATEGORY_ALIGNMENT_BONUS;
        }
        Some(DatasetCategory::Agriculture) if !entities.crops.is_empty() => {
            score += CATEGORY_ALIGNMENT_BONUS;
        }
        _ => {}
    }

    score.min(1.0)
}
