use std::{cmp::Ordering, collections::HashSet, sync::Arc};

use common::{types::Document, utils::llm::Completions};
use tracing::{debug, instrument, warn};

use crate::pipeline::config::RetrievalTuning;

const NUMERIC_BONUS: f32 = 0.3;
const GEOGRAPHIC_BONUS: f32 = 0.2;
const GEOGRAPHIC_KEYWORDS: &[&str] = &["state", "district", "region", "crop"];
const CONTEXT_DIVIDER: &str = "\n---\n";

/// Shrinks selected documents to a token-bounded, deduplicated context:
/// per-document sentence extraction, an optional LLM extraction pass for
/// stubbornly long documents, then cross-document near-duplicate removal.
pub struct ContextCompressor {
    completions: Arc<dyn Completions>,
    tuning: RetrievalTuning,
}

impl ContextCompressor {
    pub fn new(completions: Arc<dyn Completions>, tuning: RetrievalTuning) -> Self {
        Self { completions, tuning }
    }

    /// Reduces each document to its most query-relevant sentences and drops
    /// near-duplicates. Derived documents keep their category lineage and
    /// record original/compressed lengths.
    #[instrument(skip_all, fields(documents = documents.len()))]
    pub async fn compress(&self, query: &str, documents: Vec<Document>) -> Vec<Document> {
        if documents.is_empty() {
            return documents;
        }

        let mut compressed = Vec::with_capacity(documents.len());
        for document in &documents {
            let reduced = self.reduce_document(query, document).await;
            compressed.push(document.derive_compressed(reduced));
        }

        let deduplicated = self.deduplicate(compressed);

        let original_chars: usize = documents.iter().map(|doc| doc.content.chars().count()).sum();
        let compressed_chars: usize = deduplicated
            .iter()
            .map(|doc| doc.content.chars().count())
            .sum();
        debug!(
            original_chars,
            compressed_chars,
            kept = deduplicated.len(),
            "Context compression complete"
        );

        deduplicated
    }

    /// Compresses then assembles a single context string within `max_tokens`
    /// (approximate, word-based).
    pub async fn build_context_text(
        &self,
        query: &str,
        documents: Vec<Document>,
        max_tokens: usize,
    ) -> String {
        let compressed = self.compress(query, documents).await;
        assemble_context(&compressed, max_tokens)
    }

    /// Sentence extraction, with an LLM extraction pass only when the
    /// sentence-reduced text is still long. A completion failure keeps the
    /// sentence-reduced text; content is never dropped on a transient error.
    async fn reduce_document(&self, query: &str, document: &Document) -> String {
        let sentences = self.extract_key_sentences(&document.content, query);
        let reduced = sentences.join("\n");

        if reduced.chars().count() <= self.tuning.llm_compression_threshold_chars {
            return reduced;
        }

        match self
            .completions
            .complete(&extraction_prompt(query, &reduced))
            .await
        {
            Ok(extracted) if !extracted.trim().is_empty() => extracted.trim().to_owned(),
            Ok(_) => reduced,
            Err(err) => {
                warn!(error = %err, "LLM compression failed; keeping sentence-reduced text");
                reduced
            }
        }
    }

    /// Scores sentences by query-term overlap, with bonuses for numeric data
    /// and geographic/crop wording; keeps the highest-scoring sentences in
    /// score order.
    fn extract_key_sentences(&self, text: &str, query: &str) -> Vec<String> {
        let query_terms: HashSet<String> = query
            .split_whitespace()
            .map(str::to_lowercase)
            .collect();

        let mut scored: Vec<(String, f32)> = split_sentences(text)
            .into_iter()
            .filter(|sentence| sentence.chars().count() > self.tuning.min_sentence_chars)
            .filter_map(|sentence| {
                let sentence_lower = sentence.to_lowercase();
                let sentence_terms: HashSet<&str> = sentence_lower.split_whitespace().collect();

                let overlap = query_terms
                    .iter()
                    .filter(|term| sentence_terms.contains(term.as_str()))
                    .count() as f32;

                let mut score = overlap;
                if sentence.chars().any(|c| c.is_ascii_digit()) {
                    score += NUMERIC_BONUS;
                }
                if GEOGRAPHIC_KEYWORDS
                    .iter()
                    .any(|keyword| sentence_lower.contains(keyword))
                {
                    score += GEOGRAPHIC_BONUS;
                }

                (score > 0.0).then(|| (sentence.to_owned(), score))
            })
            .collect();

        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(Ordering::Equal));
        scored.truncate(self.tuning.max_key_sentences);
        scored.into_iter().map(|(sentence, _)| sentence).collect()
    }

    /// Cross-document near-duplicate removal: a document whose word set
    /// overlaps a previously kept document above the configured ratio is
    /// dropped. First occurrence wins. Idempotent.
    pub fn deduplicate(&self, documents: Vec<Document>) -> Vec<Document> {
        let mut kept: Vec<Document> = Vec::with_capacity(documents.len());
        let mut kept_word_sets: Vec<HashSet<String>> = Vec::new();

        for document in documents {
            let words = word_set(&document.content);

            let is_duplicate = !words.is_empty()
                && kept_word_sets.iter().any(|seen| {
                    let shared = words.intersection(seen).count() as f32;
                    shared / words.len() as f32 > self.tuning.near_duplicate_overlap
                });

            if !is_duplicate {
                kept_word_sets.push(words);
                kept.push(document);
            }
        }

        kept
    }
}

/// Concatenates per-document blocks, each prefixed with a source label,
/// stopping before the word-based token budget is exceeded. A document that
/// would overflow the budget is omitted entirely, never truncated.
pub fn assemble_context(documents: &[Document], max_tokens: usize) -> String {
    let mut blocks: Vec<String> = Vec::new();
    let mut used_tokens = 0usize;

    for document in documents {
        let dataset_name = document
            .metadata
            .dataset_name
            .as_deref()
            .unwrap_or("Unknown Dataset");
        let block = format!("[Source: {dataset_name}]\n{}\n", document.content);

        let block_tokens = block.split_whitespace().count();
        if used_tokens + block_tokens > max_tokens {
            break;
        }

        used_tokens += block_tokens;
        blocks.push(block);
    }

    blocks.join(CONTEXT_DIVIDER)
}

fn extraction_prompt(query: &str, context: &str) -> String {
    format!(
        "Extract ONLY the information from this context that is directly relevant to answering \
         the query. Keep specific numbers, dates, locations, and key facts. Remove redundant or \
         irrelevant information.\n\n\
         Query: {query}\n\n\
         Context:\n{context}\n\n\
         Relevant extracted information (be concise but preserve key data):"
    )
}

fn split_sentences(text: &str) -> Vec<&str> {
    let mut sentences = Vec::new();
    let mut start = 0;

    for (idx, c) in text.char_indices() {
        if !matches!(c, '.' | '!' | '?') {
            continue;
        }
        let end = idx + c.len_utf8();
        let next = text.get(end..).and_then(|rest| rest.chars().next());
        if next.map_or(true, char::is_whitespace) {
            let sentence = text.get(start..end).unwrap_or_default().trim();
            if !sentence.is_empty() {
                sentences.push(sentence);
            }
            start = end;
        }
    }

    let tail = text.get(start..).unwrap_or_default().trim();
    if !tail.is_empty() {
        sentences.push(tail);
    }

    sentences
}

fn word_set(text: &str) -> HashSet<String> {
    text.split_whitespace()
        .map(str::to_lowercase)
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use common::{error::AppError, types::DocumentMetadata};

    struct FixedCompletions {
        response: String,
    }

    #[async_trait]
    impl Completions for FixedCompletions {
        async fn complete(&self, _prompt: &str) -> Result<String, AppError> {
            Ok(self.response.clone())
        }
    }

    struct FailingCompletions;

    #[async_trait]
    impl Completions for FailingCompletions {
        async fn complete(&self, _prompt: &str) -> Result<String, AppError> {
            Err(AppError::CompletionTimeout(1))
        }
    }

    fn compressor(completions: impl Completions + 'static) -> ContextCompressor {
        ContextCompressor::new(Arc::new(completions), RetrievalTuning::default())
    }

    fn doc(content: &str) -> Document {
        Document::new(content, DocumentMetadata::default())
    }

    fn named_doc(content: &str, dataset_name: &str) -> Document {
        Document::new(
            content,
            DocumentMetadata {
                dataset_name: Some(dataset_name.to_owned()),
                ..Default::default()
            },
        )
    }

    #[tokio::test]
    async fn compression_keeps_query_relevant_sentences() {
        let compressor = compressor(FailingCompletions);
        let content = "Rice production in punjab reached 12 million tonnes this year. \
                       The committee met on a tuesday afternoon to discuss procedures. \
                       Punjab rice yields improved by 4 percent across districts.";

        let compressed = compressor
            .compress("rice production punjab", vec![doc(content)])
            .await;

        assert_eq!(compressed.len(), 1);
        assert!(compressed[0].content.contains("12 million tonnes"));
        assert!(!compressed[0].content.contains("tuesday afternoon"));
        assert!(compressed[0].metadata.compressed);
        assert!(compressed[0].metadata.original_chars.is_some());
        assert!(compressed[0].metadata.compressed_chars.is_some());
    }

    #[tokio::test]
    async fn llm_failure_keeps_sentence_reduced_text() {
        let compressor = compressor(FailingCompletions);
        // Eight long sentences that all mention the query term, so the
        // sentence-reduced text stays above the LLM threshold.
        let content = (0..8)
            .map(|i| {
                format!(
                    "Rainfall measurement number {i} in the coastal region recorded {} mm during \
                     the extended monsoon observation window for that district. ",
                    2000 + i
                )
            })
            .collect::<String>();

        let compressed = compressor.compress("rainfall monsoon", vec![doc(&content)]).await;

        assert_eq!(compressed.len(), 1);
        assert!(
            compressed[0].content.contains("Rainfall measurement"),
            "transient completion failure must not drop content"
        );
    }

    #[tokio::test]
    async fn llm_pass_runs_for_long_documents() {
        let compressor = compressor(FixedCompletions {
            response: "Rainfall: 2000-2007 mm across districts.".into(),
        });
        let content = (0..8)
            .map(|i| {
                format!(
                    "Rainfall measurement number {i} in the coastal region recorded {} mm during \
                     the extended monsoon observation window for that district. ",
                    2000 + i
                )
            })
            .collect::<String>();

        let compressed = compressor.compress("rainfall monsoon", vec![doc(&content)]).await;
        assert_eq!(compressed[0].content, "Rainfall: 2000-2007 mm across districts.");
    }

    #[tokio::test]
    async fn deduplication_is_idempotent() {
        let compressor = compressor(FailingCompletions);
        let documents = vec![
            doc("rice production punjab reached twelve million tonnes"),
            doc("rice production punjab reached twelve million tonnes overall"),
            doc("rainfall in kerala stayed close to three thousand millimetres"),
        ];

        let once = compressor.deduplicate(documents);
        let twice = compressor.deduplicate(once.clone());

        assert_eq!(once.len(), 2);
        assert_eq!(once, twice);
    }

    #[test]
    fn context_respects_token_budget() {
        let documents = vec![
            named_doc("one two three four five", "Dataset A"),
            named_doc("six seven eight nine ten", "Dataset B"),
        ];

        // Each block is 5 content words + 3 label words = 8 tokens.
        let context = assemble_context(&documents, 10);
        assert!(context.contains("Dataset A"));
        assert!(!context.contains("Dataset B"));
        assert!(context.split_whitespace().count() <= 10);
    }

    #[test]
    fn unbounded_budget_includes_every_document_once() {
        let documents = vec![
            named_doc("alpha beta gamma", "Dataset A"),
            named_doc("delta epsilon zeta", "Dataset B"),
        ];

        let context = assemble_context(&documents, usize::MAX);
        assert_eq!(context.matches("Dataset A").count(), 1);
        assert_eq!(context.matches("Dataset B").count(), 1);
        assert!(context.contains("\n---\n"));
    }

    #[test]
    fn sentences_split_on_terminal_punctuation() {
        let sentences = split_sentences("One fact here. Another fact! A third? Trailing words");
        assert_eq!(
            sentences,
            vec!["One fact here.", "Another fact!", "A third?", "Trailing words"]
        );
    }
}
