use std::collections::HashMap;

use common::storage::types::node::{Node, NodeLabel};

fn tokenize(text: &str) -> impl Iterator<Item = String> + '_ {
    text.split_whitespace()
        .map(|word| word.trim_matches(|c: char| !c.is_alphanumeric()).to_lowercase())
        .filter(|word| word.len() > 2)
}

fn chunk_text(node: &Node) -> Option<&str> {
    if node.label != NodeLabel::Chunk {
        return None;
    }
    node.properties.get("text").and_then(serde_json::Value::as_str)
}

/// Top-`limit` tokens by frequency across the cluster's chunk nodes
/// (spec.md §4.8: "top-8 tokens by term frequency across the cluster's
/// chunks").
pub fn top_terms<'a>(nodes: impl IntoIterator<Item = &'a Node>, limit: usize) -> Vec<String> {
    let mut counts: HashMap<String, usize> = HashMap::new();
    for node in nodes {
        let Some(text) = chunk_text(node) else { continue };
        for token in tokenize(text) {
            *counts.entry(token).or_insert(0) += 1;
        }
    }
    let mut ranked: Vec<(String, usize)> = counts.into_iter().collect();
    ranked.sort_by(|a, b| b.1.cmp(&a.1).then_with(|| a.0.cmp(&b.0)));
    ranked.into_iter().take(limit).map(|(term, _)| term).collect()
}

/// Mean embedding across the cluster's nodes that carry one, used as the
/// cluster centroid.
pub fn centroid<'a>(nodes: impl IntoIterator<Item = &'a Node>) -> Option<Vec<f32>> {
    let mut sum: Vec<f32> = Vec::new();
    let mut count = 0usize;
    for node in nodes {
        let Some(embedding) = node.embedding.as_ref().filter(|e| !e.is_empty()) else { continue };
        if sum.is_empty() {
            sum = vec![0.0; embedding.len()];
        }
        if embedding.len() != sum.len() {
            continue;
        }
        for (acc, value) in sum.iter_mut().zip(embedding) {
            *acc += value;
        }
        count += 1;
    }
    if count == 0 {
        return None;
    }
    for value in &mut sum {
        *value /= count as f32;
    }
    Some(sum)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk_node(text: &str) -> Node {
        let mut node = Node::new_entity("public", NodeLabel::Chunk, "chunk");
        node.properties.insert("text".to_string(), serde_json::json!(text));
        node
    }

    #[test]
    fn top_terms_ranks_by_frequency_then_lexicographically() {
        let nodes = vec![chunk_node("rust rust tokio"), chunk_node("rust async tokio")];
        let terms = top_terms(&nodes, 2);
        assert_eq!(terms, vec!["rust".to_string(), "tokio".to_string()]);
    }

    #[test]
    fn centroid_averages_equal_length_embeddings() {
        let mut a = Node::new_entity("public", NodeLabel::Entity, "a");
        a.embedding = Some(vec![1.0, 1.0]);
        let mut b = Node::new_entity("public", NodeLabel::Entity, "b");
        b.embedding = Some(vec![3.0, 3.0]);
        let result = centroid(&[a, b]).unwrap();
        assert_eq!(result, vec![2.0, 2.0]);
    }
}
