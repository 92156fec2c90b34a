//! Similarity metrics over feature bundles

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use super::embedding::cosine_similarity;
use super::features::FeatureBundle;
use crate::error::{GraphError, Result};

/// Edit similarity a concept pair needs to count as a match
pub const CONCEPT_MATCH_THRESHOLD: f64 = 0.7;

/// Relative weight of each metric in the combined score
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase", default)]
pub struct SimilarityWeights {
    pub keyword: f64,
    pub entity: f64,
    pub topic: f64,
    pub concept: f64,
    pub embedding: f64,
}

impl Default for SimilarityWeights {
    fn default() -> Self {
        Self {
            keyword: 0.3,
            entity: 0.2,
            topic: 0.2,
            concept: 0.15,
            embedding: 0.15,
        }
    }
}

impl SimilarityWeights {
    pub fn total(&self) -> f64 {
        self.keyword + self.entity + self.topic + self.concept + self.embedding
    }

    pub fn validate(&self) -> Result<()> {
        let parts = [self.keyword, self.entity, self.topic, self.concept, self.embedding];
        if parts.iter().any(|w| !w.is_finite() || *w < 0.0) {
            return Err(GraphError::Validation(
                "similarity weights must be finite and non-negative".into(),
            ));
        }
        if self.total() <= 0.0 {
            return Err(GraphError::Validation(
                "similarity weights must not all be zero".into(),
            ));
        }
        Ok(())
    }
}

/// Per-metric scores and their weighted combination
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MetricBreakdown {
    pub keyword: f64,
    pub entity: f64,
    pub topic: f64,
    pub concept: f64,
    pub embedding: f64,
    pub total: f64,
}

/// |A ∩ B| / |A ∪ B|; two empty sets share nothing
pub fn jaccard(a: &[String], b: &[String]) -> f64 {
    let a: HashSet<&str> = a.iter().map(String::as_str).collect();
    let b: HashSet<&str> = b.iter().map(String::as_str).collect();
    let union = a.union(&b).count();
    if union == 0 {
        return 0.0;
    }
    a.intersection(&b).count() as f64 / union as f64
}

/// Levenshtein distance over chars
pub fn levenshtein(a: &str, b: &str) -> usize {
    let a: Vec<char> = a.chars().collect();
    let b: Vec<char> = b.chars().collect();
    if a.is_empty() {
        return b.len();
    }
    if b.is_empty() {
        return a.len();
    }

    let mut prev: Vec<usize> = (0..=b.len()).collect();
    let mut curr = vec![0; b.len() + 1];
    for (i, ca) in a.iter().enumerate() {
        curr[0] = i + 1;
        for (j, cb) in b.iter().enumerate() {
            let cost = usize::from(ca != cb);
            curr[j + 1] = (prev[j + 1] + 1).min(curr[j] + 1).min(prev[j] + cost);
        }
        std::mem::swap(&mut prev, &mut curr);
    }
    prev[b.len()]
}

/// 1 - distance / longer length
pub fn edit_similarity(a: &str, b: &str) -> f64 {
    let longest = a.chars().count().max(b.chars().count());
    if longest == 0 {
        return 1.0;
    }
    1.0 - levenshtein(a, b) as f64 / longest as f64
}

/// Mean edit similarity over concept pairs that clear the match threshold
///
/// Pair scores are summed in sorted order so swapping the arguments gives
/// the same bits.
pub fn concept_similarity(a: &[String], b: &[String]) -> f64 {
    let mut scores: Vec<f64> = a
        .iter()
        .flat_map(|ca| b.iter().map(move |cb| edit_similarity(ca, cb)))
        .filter(|score| *score > CONCEPT_MATCH_THRESHOLD)
        .collect();
    if scores.is_empty() {
        return 0.0;
    }
    scores.sort_by(f64::total_cmp);
    scores.iter().sum::<f64>() / scores.len() as f64
}

/// Weighted combination of all metrics, normalized by the weight total
pub fn similarity(a: &FeatureBundle, b: &FeatureBundle, weights: &SimilarityWeights) -> MetricBreakdown {
    let mut breakdown = MetricBreakdown {
        keyword: jaccard(&a.keywords, &b.keywords),
        entity: jaccard(&a.entities, &b.entities),
        topic: jaccard(&a.topics, &b.topics),
        concept: concept_similarity(&a.concepts, &b.concepts),
        embedding: cosine_similarity(&a.embedding, &b.embedding),
        total: 0.0,
    };

    let total = weights.total();
    if total > 0.0 {
        breakdown.total = ((breakdown.keyword * weights.keyword
            + breakdown.entity * weights.entity
            + breakdown.topic * weights.topic
            + breakdown.concept * weights.concept
            + breakdown.embedding * weights.embedding)
            / total)
            .clamp(0.0, 1.0);
    }
    breakdown
}

#[cfg(test)]
mod tests {
    use super::*;

    fn strings(items: &[&str]) -> Vec<String> {
        items.iter().map(|s| s.to_string()).collect()
    }

    #[test]
    fn test_jaccard() {
        assert_eq!(jaccard(&[], &[]), 0.0);
        assert_eq!(jaccard(&strings(&["a", "b"]), &strings(&["b", "c"])), 1.0 / 3.0);
        assert_eq!(jaccard(&strings(&["a"]), &strings(&["a"])), 1.0);
    }

    #[test]
    fn test_levenshtein() {
        assert_eq!(levenshtein("kitten", "sitting"), 3);
        assert_eq!(levenshtein("", "abc"), 3);
        assert_eq!(edit_similarity("same", "same"), 1.0);
    }

    #[test]
    fn test_concept_similarity_threshold() {
        let a = strings(&["neural network"]);
        let b = strings(&["neural networks", "weather report"]);
        let score = concept_similarity(&a, &b);
        assert!(score > 0.9 && score < 1.0);
        assert_eq!(concept_similarity(&a, &strings(&["weather report"])), 0.0);
    }

    #[test]
    fn test_concept_similarity_exactly_symmetric() {
        let a = strings(&["alpha beta", "alpha beta"]);
        let b = strings(&["alpha beta", "alpah beta", "alpah beta"]);
        assert_eq!(concept_similarity(&a, &b), concept_similarity(&b, &a));

        let pool = ["alpha beta", "alpah beta", "alpha betta", "alpah betta"];
        for i in 0..pool.len() {
            for j in 0..pool.len() {
                let a = strings(&[pool[i], pool[j], pool[(i + j) % pool.len()]]);
                let b = strings(&[pool[j], pool[(i + 1) % pool.len()]]);
                assert_eq!(
                    concept_similarity(&a, &b).to_bits(),
                    concept_similarity(&b, &a).to_bits()
                );
            }
        }
    }

    #[test]
    fn test_similarity_is_symmetric_and_bounded() {
        let a = FeatureBundle {
            keywords: strings(&["rust", "graph", "memory"]),
            entities: strings(&["sarah"]),
            topics: strings(&["rust"]),
            concepts: strings(&["memory graph"]),
            embedding: vec![1.0, 0.0],
            ..Default::default()
        };
        let b = FeatureBundle {
            keywords: strings(&["rust", "decay"]),
            entities: vec![],
            topics: strings(&["rust", "storage"]),
            concepts: strings(&["memory graphs"]),
            embedding: vec![0.6, 0.8],
            ..Default::default()
        };
        let w = SimilarityWeights::default();
        let ab = similarity(&a, &b, &w);
        let ba = similarity(&b, &a, &w);
        assert_eq!(ab.total, ba.total);
        assert!(ab.total > 0.0 && ab.total <= 1.0);
        assert_eq!(similarity(&a, &a, &w).total, 1.0);
    }

    #[test]
    fn test_weights_validation() {
        assert!(SimilarityWeights::default().validate().is_ok());
        let zero = SimilarityWeights {
            keyword: 0.0,
            entity: 0.0,
            topic: 0.0,
            concept: 0.0,
            embedding: 0.0,
        };
        assert!(zero.validate().is_err());
    }
}
