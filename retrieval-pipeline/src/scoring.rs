use std::{cmp::Ordering, collections::HashMap};

/// One entry of a method-specific ranked list: corpus document index plus the
/// method's native score. Scores are not comparable across methods before
/// fusion; fusion itself only consumes rank positions.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct RankedHit {
    pub doc: usize,
    pub score: f32,
}

impl RankedHit {
    pub const fn new(doc: usize, score: f32) -> Self {
        Self { doc, score }
    }
}

/// A document with its accumulated reciprocal-rank-fusion score.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct FusedHit {
    pub doc: usize,
    pub score: f32,
}

pub const fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Maps a non-negative distance to a similarity in (0, 1].
pub fn distance_to_similarity(distance: f32) -> f32 {
    if !distance.is_finite() {
        return 0.0;
    }
    clamp_unit(1.0 / (1.0 + distance.max(0.0)))
}

/// Linear min-max normalization into [0, 1]. A degenerate range (all scores
/// equal) maps every finite score to 1.0.
pub fn min_max_normalize(scores: &[f32]) -> Vec<f32> {
    if scores.is_empty() {
        return Vec::new();
    }

    let mut min = f32::MAX;
    let mut max = f32::MIN;

    for s in scores {
        if !s.is_finite() {
            continue;
        }
        if *s < min {
            min = *s;
        }
        if *s > max {
            max = *s;
        }
    }

    if !min.is_finite() || !max.is_finite() {
        return scores.iter().map(|_| 0.0).collect();
    }

    if (max - min).abs() < f32::EPSILON {
        return vec![1.0; scores.len()];
    }

    scores
        .iter()
        .map(|score| {
            if score.is_finite() {
                clamp_unit((score - min) / (max - min))
            } else {
                0.0
            }
        })
        .collect()
}

/// Reciprocal rank fusion over any number of ranked lists. A document at
/// 1-based rank r in a list contributes 1/(k + r); contributions accumulate
/// additively across lists. Ties keep first-seen order (stable sort), so the
/// result is independent of the order the lists are supplied in.
pub fn reciprocal_rank_fusion(lists: &[Vec<RankedHit>], k: f32) -> Vec<FusedHit> {
    let k = if k > 0.0 { k } else { 60.0 };

    let mut scores: HashMap<usize, f32> = HashMap::new();
    let mut first_seen: Vec<usize> = Vec::new();

    for list in lists {
        for (rank, hit) in list.iter().enumerate() {
            let entry = scores.entry(hit.doc).or_insert_with(|| {
                first_seen.push(hit.doc);
                0.0
            });
            *entry += 1.0 / (k + rank as f32 + 1.0);
        }
    }

    let mut fused: Vec<FusedHit> = first_seen
        .into_iter()
        .map(|doc| FusedHit {
            doc,
            score: scores.get(&doc).copied().unwrap_or(0.0),
        })
        .collect();

    fused.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(Ordering::Equal));
    fused
}

#[cfg(test)]
mod tests {
    use super::*;

    fn hits(docs: &[usize]) -> Vec<RankedHit> {
        docs.iter()
            .enumerate()
            .map(|(rank, doc)| RankedHit::new(*doc, 1.0 / (rank as f32 + 1.0)))
            .collect()
    }

    #[test]
    fn fusion_is_commutative_in_list_order() {
        let a = hits(&[0, 1, 2]);
        let b = hits(&[2, 3]);

        let forward = reciprocal_rank_fusion(&[a.clone(), b.clone()], 60.0);
        let backward = reciprocal_rank_fusion(&[b, a], 60.0);

        let score_of = |fused: &[FusedHit], doc: usize| {
            fused
                .iter()
                .find(|hit| hit.doc == doc)
                .map(|hit| hit.score)
                .unwrap_or_default()
        };

        for doc in 0..4 {
            assert!((score_of(&forward, doc) - score_of(&backward, doc)).abs() < 1e-6);
        }
    }

    #[test]
    fn fusion_scores_are_exact_rank_sums() {
        // doc 7 sits at rank 1 in one list and rank 3 in another.
        let a = hits(&[7, 1, 2]);
        let b = hits(&[4, 5, 7]);

        let fused = reciprocal_rank_fusion(&[a, b], 60.0);
        let doc7 = fused.iter().find(|hit| hit.doc == 7).expect("doc 7 fused");

        let expected = 1.0 / 61.0 + 1.0 / 63.0;
        assert!((doc7.score - expected).abs() < 1e-6);
    }

    #[test]
    fn absent_documents_never_appear() {
        let fused = reciprocal_rank_fusion(&[hits(&[0, 1])], 60.0);
        assert!(fused.iter().all(|hit| hit.doc < 2));
        assert_eq!(fused.len(), 2);
    }

    #[test]
    fn ties_keep_first_seen_order() {
        // Same single-list rank in two disjoint lists: identical scores.
        let fused = reciprocal_rank_fusion(&[hits(&[3]), hits(&[9])], 60.0);
        assert_eq!(fused.len(), 2);
        assert_eq!(fused[0].doc, 3);
        assert_eq!(fused[1].doc, 9);
    }

    #[test]
    fn distance_zero_maps_to_similarity_one() {
        assert!((distance_to_similarity(0.0) - 1.0).abs() < f32::EPSILON);
        assert!(distance_to_similarity(3.0) < distance_to_similarity(1.0));
        assert_eq!(distance_to_similarity(f32::NAN), 0.0);
    }

    #[test]
    fn degenerate_normalization_maps_to_one() {
        assert_eq!(min_max_normalize(&[0.5, 0.5, 0.5]), vec![1.0, 1.0, 1.0]);
        assert_eq!(min_max_normalize(&[]), Vec::<f32>::new());
    }

    #[test]
    fn normalization_spans_unit_interval() {
        let normalized = min_max_normalize(&[2.0, 6.0, 4.0]);
        assert_eq!(normalized, vec![0.0, 1.0, 0.5]);
    }
}
