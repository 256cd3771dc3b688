pub mod compress;
pub mod dense;
pub mod enhancement;
pub mod lexical;
pub mod pipeline;
pub mod rerank;
pub mod retriever;
pub mod scoring;
pub mod vocab;

use std::{collections::HashMap, path::Path};

use common::{error::AppError, types::Document};

pub use compress::{assemble_context, ContextCompressor};
pub use dense::{InMemoryVectorIndex, IndexRegistry, VectorIndex};
pub use enhancement::{EnhancedQuery, QueryEnhancer};
pub use pipeline::{PipelineStats, ProcessOutput, RagPipeline, RetrievalTuning};
pub use rerank::{CrossEncoderReranker, PairScorer, RerankerPool};
pub use retriever::HybridRetriever;
pub use vocab::EntitySet;

/// The read-only document collection retrieval runs against. Documents are
/// identified by their exact content; duplicates share a canonical id so
/// fused rankings stay unique by content.
pub struct Corpus {
    documents: Vec<Document>,
    canonical: Vec<usize>,
}

impl Corpus {
    pub fn new(documents: Vec<Document>) -> Self {
        let mut first_by_content: HashMap<&str, usize> = HashMap::new();
        let mut canonical = Vec::with_capacity(documents.len());
        for (idx, doc) in documents.iter().enumerate() {
            let first = *first_by_content.entry(doc.content.as_str()).or_insert(idx);
            canonical.push(first);
        }

        Self {
            documents,
            canonical,
        }
    }

    /// Loads a corpus from a JSON array of documents.
    pub fn from_json_file(path: impl AsRef<Path>) -> Result<Self, AppError> {
        let raw = std::fs::read_to_string(path)?;
        let documents: Vec<Document> = serde_json::from_str(&raw)?;
        Ok(Self::new(documents))
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn get(&self, idx: usize) -> Option<&Document> {
        self.documents.get(idx)
    }

    /// Index of the first document carrying the same content.
    pub fn canonical_id(&self, idx: usize) -> usize {
        self.canonical.get(idx).copied().unwrap_or(idx)
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }
}
