use std::cmp::Ordering;

use common::storage::types::node::Node;
use common::utils::config::ModeWeights;

use crate::candidates::Candidate;

pub const fn clamp_unit(value: f32) -> f32 {
    value.clamp(0.0, 1.0)
}

/// Cosine similarity, mapped from `[-1, 1]` to `[0, 1]` so it composes
/// with the other `[0, 1]` structural signals (spec.md §4.6 step 2).
pub fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    if a.is_empty() || b.is_empty() || a.len() != b.len() {
        return 0.0;
    }
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    clamp_unit((dot / (norm_a * norm_b) + 1.0) / 2.0)
}

/// Fraction of query terms present in `text`, case-insensitive, no IDF
/// weighting (spec.md §4.6 step 1 lexical pass).
pub fn term_overlap(query_terms: &[String], text: &str) -> f32 {
    if query_terms.is_empty() {
        return 0.0;
    }
    let lower = text.to_lowercase();
    let hits = query_terms.iter().filter(|term| lower.contains(term.as_str())).count();
    clamp_unit(hits as f32 / query_terms.len() as f32)
}

pub fn query_terms(question: &str) -> Vec<String> {
    question
        .to_lowercase()
        .split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()).to_string())
        .filter(|word| word.len() > 2)
        .collect()
}

#[derive(Debug, Clone)]
pub struct ScoredCandidate {
    pub node: Node,
    pub score: f32,
}

/// `score = w_sim·sim + w_deg·degree_norm + w_cent·pagerank_norm + w_lex·term_overlap`.
pub fn structural_rerank(candidate: Candidate, weights: ModeWeights) -> ScoredCandidate {
    let degree_norm = candidate.node.degree_norm() as f32;
    let pagerank_norm = candidate.node.pagerank_norm() as f32;
    let score = weights.sim * candidate.sim
        + weights.deg * degree_norm
        + weights.cent * pagerank_norm
        + weights.lex * candidate.term_overlap;
    ScoredCandidate {
        node: candidate.node,
        score: clamp_unit(score),
    }
}

/// Tie-breaking: higher score, then higher importance, then lexicographic id (spec.md §4.6 step 4).
pub fn sort_scored(items: &mut [ScoredCandidate]) {
    items.sort_by(|a, b| {
        b.score
            .partial_cmp(&a.score)
            .unwrap_or(Ordering::Equal)
            .then_with(|| {
                b.node
                    .importance()
                    .partial_cmp(&a.node.importance())
                    .unwrap_or(Ordering::Equal)
            })
            .then_with(|| a.node.id.cmp(&b.node.id))
    });
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn cosine_similarity_of_identical_vectors_is_one() {
        let v = vec![0.5, 0.5, 0.5];
        assert!((cosine_similarity(&v, &v) - 1.0).abs() < 1e-5);
    }

    #[test]
    fn cosine_similarity_handles_empty_vectors() {
        assert_eq!(cosine_similarity(&[], &[1.0]), 0.0);
    }

    #[test]
    fn term_overlap_counts_fraction_of_matching_terms() {
        let terms = vec!["tokio".to_string(), "async".to_string()];
        assert!((term_overlap(&terms, "Tokio powers async Rust runtimes") - 1.0).abs() < 1e-5);
        assert!((term_overlap(&terms, "Tokio powers Rust runtimes") - 0.5).abs() < 1e-5);
    }

    #[test]
    fn sort_scored_breaks_ties_by_importance_then_id() {
        let mut low = common::storage::types::node::Node::new_entity("public", common::storage::types::node::NodeLabel::Entity, "a");
        low.properties.insert("importance".to_string(), serde_json::json!(0.2));
        let mut high = common::storage::types::node::Node::new_entity("public", common::storage::types::node::NodeLabel::Entity, "b");
        high.properties.insert("importance".to_string(), serde_json::json!(0.8));

        let mut items = vec![
            ScoredCandidate { node: low, score: 0.5 },
            ScoredCandidate { node: high, score: 0.5 },
        ];
        sort_scored(&mut items);
        assert_eq!(items[0].node.name, "b");
    }
}
