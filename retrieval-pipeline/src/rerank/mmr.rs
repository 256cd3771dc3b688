use std::collections::HashMap;

use common::types::Document;

/// Greedy maximal marginal relevance selection. Returns indices into
/// `documents` in selection order: the most relevant document first, then
/// repeatedly the document maximizing
/// `lambda * relevance - (1 - lambda) * max_similarity_to_selected`.
pub fn select(
    documents: &[Document],
    relevance: &[f32],
    lambda: f32,
    target: usize,
) -> Vec<usize> {
    if documents.is_empty() || target == 0 {
        return Vec::new();
    }

    let embeddings: Vec<HashMap<String, f32>> = documents
        .iter()
        .map(|doc| term_weights(&doc.content))
        .collect();
    let normalized = normalize_relevance(relevance, documents.len());

    let mut remaining: Vec<usize> = (0..documents.len()).collect();
    let mut selected = Vec::with_capacity(target.min(documents.len()));

    // Seed with the most relevant document; ties keep input order.
    let first = argmax(&remaining, |idx| normalized.get(idx).copied().unwrap_or(0.0));
    if let Some(first) = first {
        remaining.retain(|idx| *idx != first);
        selected.push(first);
    }

    while selected.len() < target && !remaining.is_empty() {
        let best = argmax(&remaining, |idx| {
            let rel = normalized.get(idx).copied().unwrap_or(0.0);
            let max_similarity = selected
                .iter()
                .map(|chosen: &usize| {
                    cosine_similarity(
                        embeddings.get(idx).unwrap_or(&HashMap::new()),
                        embeddings.get(*chosen).unwrap_or(&HashMap::new()),
                    )
                })
                .fold(0.0f32, f32::max);
            lambda * rel - (1.0 - lambda) * max_similarity
        });

        let Some(best) = best else {
            break;
        };
        remaining.retain(|idx| *idx != best);
        selected.push(best);
    }

    selected
}

/// Linear normalization to [0, 1]; a degenerate range is treated as 1 to
/// avoid division by zero.
fn normalize_relevance(relevance: &[f32], len: usize) -> Vec<f32> {
    if relevance.is_empty() {
        return vec![0.0; len];
    }

    let min = relevance.iter().copied().fold(f32::MAX, f32::min);
    let max = relevance.iter().copied().fold(f32::MIN, f32::max);
    let range = if max > min { max - min } else { 1.0 };

    relevance.iter().map(|score| (score - min) / range).collect()
}

fn argmax<F>(candidates: &[usize], mut score: F) -> Option<usize>
where
    F: FnMut(usize) -> f32,
{
    let mut best: Option<(usize, f32)> = None;
    for idx in candidates {
        let value = score(*idx);
        let improved = match best {
            Some((_, best_value)) => value > best_value,
            None => true,
        };
        if improved {
            best = Some((*idx, value));
        }
    }
    best.map(|(idx, _)| idx)
}

/// Sparse term-frequency vector used solely for pairwise cosine similarity.
fn term_weights(text: &str) -> HashMap<String, f32> {
    let mut weights: HashMap<String, f32> = HashMap::new();
    for token in text
        .split(|c: char| !c.is_ascii_alphanumeric())
        .filter(|token| !token.is_empty())
    {
        *weights.entry(token.to_ascii_lowercase()).or_insert(0.0) += 1.0;
    }
    weights
}

fn cosine_similarity(a: &HashMap<String, f32>, b: &HashMap<String, f32>) -> f32 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }

    let dot: f32 = a
        .iter()
        .filter_map(|(term, weight)| b.get(term).map(|other| weight * other))
        .sum();
    let norm_a: f32 = a.values().map(|w| w * w).sum::<f32>().sqrt();
    let norm_b: f32 = b.values().map(|w| w * w).sum::<f32>().sqrt();

    if norm_a <= 0.0 || norm_b <= 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::types::DocumentMetadata;

    fn documents(contents: &[&str]) -> Vec<Document> {
        contents
            .iter()
            .map(|content| Document::new(*content, DocumentMetadata::default()))
            .collect()
    }

    #[test]
    fn lambda_one_reduces_to_pure_relevance_ranking() {
        let docs = documents(&["alpha", "beta", "gamma", "delta"]);
        let relevance = [0.2, 0.9, 0.6, 0.4];

        let selected = select(&docs, &relevance, 1.0, 3);
        assert_eq!(selected, vec![1, 2, 3]);
    }

    #[test]
    fn lambda_zero_never_reselects_identical_content() {
        let docs = documents(&[
            "rice production in punjab",
            "rice production in punjab",
            "rainfall totals across kerala",
        ]);
        let relevance = [0.9, 0.8, 0.1];

        let selected = select(&docs, &relevance, 0.0, 2);

        assert_eq!(selected[0], 0);
        assert_eq!(
            selected[1], 2,
            "a dissimilar candidate must beat an identical one at lambda 0"
        );
    }

    #[test]
    fn selection_stops_when_candidates_are_exhausted() {
        let docs = documents(&["one", "two"]);
        let selected = select(&docs, &[0.5, 0.4], 0.7, 10);
        assert_eq!(selected.len(), 2);
    }

    #[test]
    fn equal_relevance_scores_do_not_panic_or_divide_by_zero() {
        let docs = documents(&["aa bb", "cc dd", "ee ff"]);
        let selected = select(&docs, &[0.5, 0.5, 0.5], 0.7, 2);
        assert_eq!(selected.len(), 2);
        assert_eq!(selected[0], 0, "ties keep input order");
    }

    #[test]
    fn empty_input_selects_nothing() {
        assert!(select(&[], &[], 0.7, 5).is_empty());
    }
}
