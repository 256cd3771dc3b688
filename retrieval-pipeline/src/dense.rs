use std::{cmp::Ordering, collections::HashMap, sync::Arc};

use async_trait::async_trait;
use common::{error::AppError, types::Document, utils::embedding::EmbeddingProvider};
use tokio::sync::Mutex;
use tracing::{debug, info};

/// One nearest-neighbour match: corpus document index plus its distance to
/// the query. Distance is non-negative; smaller means more similar.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct VectorHit {
    pub doc: usize,
    pub distance: f32,
}

/// Dense-index seam consumed by the retriever. The index is built elsewhere;
/// lookups against a loaded index are read-only and safe to share.
#[async_trait]
pub trait VectorIndex: Send + Sync {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<VectorHit>, AppError>;
}

/// Exact nearest-neighbour index over embedding vectors held in memory.
pub struct InMemoryVectorIndex {
    embeddings: Vec<Vec<f32>>,
    provider: EmbeddingProvider,
}

impl InMemoryVectorIndex {
    pub async fn build(
        documents: &[Document],
        provider: EmbeddingProvider,
    ) -> Result<Self, AppError> {
        let texts: Vec<String> = documents.iter().map(|doc| doc.content.clone()).collect();
        let embeddings = provider.embed_batch(texts).await?;

        debug!(
            documents = embeddings.len(),
            backend = provider.backend_label(),
            "Dense index built"
        );

        Ok(Self {
            embeddings,
            provider,
        })
    }

    pub fn len(&self) -> usize {
        self.embeddings.len()
    }

    pub fn is_empty(&self) -> bool {
        self.embeddings.is_empty()
    }
}

#[async_trait]
impl VectorIndex for InMemoryVectorIndex {
    async fn search(&self, query: &str, k: usize) -> Result<Vec<VectorHit>, AppError> {
        if self.embeddings.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.provider.embed(query).await?;

        let mut hits: Vec<VectorHit> = self
            .embeddings
            .iter()
            .enumerate()
            .map(|(doc, embedding)| VectorHit {
                doc,
                distance: l2_distance(&query_embedding, embedding),
            })
            .collect();

        hits.sort_by(|a, b| {
            a.distance
                .partial_cmp(&b.distance)
                .unwrap_or(Ordering::Equal)
                .then_with(|| a.doc.cmp(&b.doc))
        });
        hits.truncate(k);
        Ok(hits)
    }
}

fn l2_distance(a: &[f32], b: &[f32]) -> f32 {
    a.iter()
        .zip(b.iter())
        .map(|(x, y)| (x - y) * (x - y))
        .sum::<f32>()
        .sqrt()
}

/// Caches one dense index per corpus name. The lock is held across a build,
/// so at most one build or reload runs at a time; callers share the returned
/// `Arc` for lock-free lookups afterwards.
#[derive(Default)]
pub struct IndexRegistry {
    indexes: Mutex<HashMap<String, Arc<InMemoryVectorIndex>>>,
}

impl IndexRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn get_or_build(
        &self,
        corpus_name: &str,
        documents: &[Document],
        provider: &EmbeddingProvider,
    ) -> Result<Arc<InMemoryVectorIndex>, AppError> {
        let mut indexes = self.indexes.lock().await;

        if let Some(existing) = indexes.get(corpus_name) {
            return Ok(Arc::clone(existing));
        }

        info!(corpus = corpus_name, documents = documents.len(), "Building dense index");
        let index = Arc::new(InMemoryVectorIndex::build(documents, provider.clone()).await?);
        indexes.insert(corpus_name.to_owned(), Arc::clone(&index));
        Ok(index)
    }

    /// Drops a cached index so the next lookup rebuilds it.
    pub async fn invalidate(&self, corpus_name: &str) {
        self.indexes.lock().await.remove(corpus_name);
    }
}
