use std::{cmp::Ordering, collections::HashMap};

use common::types::Document;
use tracing::debug;

use crate::scoring::RankedHit;

const BM25_K1: f32 = 1.5;
const BM25_B: f32 = 0.75;

/// Sparse Okapi BM25 index, built once over the full corpus. Lookups are
/// read-only and cheap; there is no incremental update path.
pub struct LexicalIndex {
    term_frequencies: Vec<HashMap<String, f32>>,
    doc_lengths: Vec<f32>,
    avg_doc_length: f32,
    idf: HashMap<String, f32>,
}

impl LexicalIndex {
    pub fn build(documents: &[Document]) -> Self {
        let tokenized: Vec<Vec<String>> = documents
            .iter()
            .map(|doc| tokenize(&doc.content))
            .collect();

        let doc_count = tokenized.len() as f32;
        let doc_lengths: Vec<f32> = tokenized.iter().map(|tokens| tokens.len() as f32).collect();
        let avg_doc_length = if tokenized.is_empty() {
            0.0
        } else {
            doc_lengths.iter().sum::<f32>() / doc_count
        };

        let mut term_frequencies = Vec::with_capacity(tokenized.len());
        let mut doc_frequencies: HashMap<String, f32> = HashMap::new();

        for tokens in &tokenized {
            let mut frequencies: HashMap<String, f32> = HashMap::new();
            for token in tokens {
                *frequencies.entry(token.clone()).or_insert(0.0) += 1.0;
            }
            for term in frequencies.keys() {
                *doc_frequencies.entry(term.clone()).or_insert(0.0) += 1.0;
            }
            term_frequencies.push(frequencies);
        }

        let idf = doc_frequencies
            .into_iter()
            .map(|(term, df)| {
                let idf = (1.0 + (doc_count - df + 0.5) / (df + 0.5)).ln();
                (term, idf)
            })
            .collect();

        debug!(
            documents = tokenized.len(),
            avg_doc_length, "Lexical index built"
        );

        Self {
            term_frequencies,
            doc_lengths,
            avg_doc_length,
            idf,
        }
    }

    pub fn len(&self) -> usize {
        self.term_frequencies.len()
    }

    pub fn is_empty(&self) -> bool {
        self.term_frequencies.is_empty()
    }

    /// BM25 relevance of every corpus document against the query terms.
    /// Documents sharing no term with the query score 0.
    pub fn scores(&self, query: &str) -> Vec<f32> {
        let query_terms = tokenize(query);
        let mut scores = vec![0.0f32; self.term_frequencies.len()];

        if query_terms.is_empty() || self.avg_doc_length <= 0.0 {
            return scores;
        }

        for (doc, frequencies) in self.term_frequencies.iter().enumerate() {
            let Some(doc_length) = self.doc_lengths.get(doc) else {
                continue;
            };
            let length_norm = 1.0 - BM25_B + BM25_B * doc_length / self.avg_doc_length;

            let mut score = 0.0;
            for term in &query_terms {
                let Some(tf) = frequencies.get(term) else {
                    continue;
                };
                let idf = self.idf.get(term).copied().unwrap_or(0.0);
                score += idf * (tf * (BM25_K1 + 1.0)) / (tf + BM25_K1 * length_norm);
            }

            if let Some(slot) = scores.get_mut(doc) {
                *slot = score;
            }
        }

        scores
    }

    /// Top-k ranked list for one query. Entries with non-positive score are
    /// excluded; ties are broken by corpus order.
    pub fn search(&self, query: &str, k: usize) -> Vec<RankedHit> {
        let mut hits: Vec<RankedHit> = self
            .scores(query)
            .into_iter()
            .enumerate()
            .filter(|(_, score)| *score > 0.0)
            .map(|(doc, score)| RankedHit::new(doc, score))
            .collect();

        hits.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
        hits.truncate(k);
        hits
    }
}

fn tokenize(text: &str) -> Vec<String> {
    text.split_whitespace()
        .map(|token| token.to_ascii_lowercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::DocumentMetadata;

    fn corpus() -> Vec<Document> {
        [
            "rice production in punjab reached record levels",
            "wheat cultivation in haryana depends on irrigation",
            "annual rainfall in kerala fed the monsoon reservoirs",
        ]
        .iter()
        .map(|content| Document::new(*content, DocumentMetadata::default()))
        .collect()
    }

    #[test]
    fn matching_documents_outrank_non_matching() {
        let index = LexicalIndex::build(&corpus());
        let hits = index.search("rice production", 10);

        assert!(!hits.is_empty());
        assert_eq!(hits[0].doc, 0);
        assert!(hits.iter().all(|hit| hit.score > 0.0));
    }

    #[test]
    fn zero_scores_are_excluded() {
        let index = LexicalIndex::build(&corpus());
        let hits = index.search("spacecraft telemetry", 10);
        assert!(hits.is_empty());
    }

    #[test]
    fn query_matching_is_case_insensitive() {
        let index = LexicalIndex::build(&corpus());
        let hits = index.search("RAINFALL Kerala", 10);

        assert_eq!(hits.len(), 1);
        assert_eq!(hits[0].doc, 2);
    }

    #[test]
    fn empty_corpus_scores_nothing() {
        let index = LexicalIndex::build(&[]);
        assert!(index.is_empty());
        assert!(index.search("rice", 5).is_empty());
    }

    #[test]
    fn repeated_terms_saturate_rather_than_dominate() {
        let documents: Vec<Document> = [
            "rice rice rice rice rice rice rice rice",
            "rice production in punjab during kharif season",
            "wheat output in haryana",
        ]
        .iter()
        .map(|content| Document::new(*content, DocumentMetadata::default()))
        .collect();

        let index = LexicalIndex::build(&documents);
        let scores = index.scores("rice production punjab");

        // The spammy document matches one term; the on-topic one matches three.
        assert!(scores[1] > scores[0]);
    }
}
