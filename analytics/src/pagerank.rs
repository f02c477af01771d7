use std::collections::HashMap;

use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::graph::NamespaceGraph;
use common::utils::config::AnalyticsConfig;

/// Power-iteration PageRank: damping 0.85, stops at `max_iterations` or
/// once the L1 delta between successive ranks drops below `epsilon`
/// (spec.md §4.8). Dangling nodes (no out-edges) redistribute their mass
/// uniformly, the standard fix for a stochastic transition matrix.
pub fn compute_pagerank(graph: &NamespaceGraph, config: &AnalyticsConfig) -> HashMap<String, f32> {
    let n = graph.node_count();
    if n == 0 {
        return HashMap::new();
    }
    let indices: Vec<_> = graph.graph.node_indices().collect();
    let n_f64 = n as f64;
    let mut ranks: HashMap<_, f64> = indices.iter().map(|&idx| (idx, 1.0 / n_f64)).collect();

    let out_degrees: HashMap<_, usize> = indices
        .iter()
        .map(|&idx| (idx, graph.graph.edges_directed(idx, Direction::Outgoing).count()))
        .collect();

    for _ in 0..config.pagerank_max_iterations {
        let dangling_mass: f64 = indices
            .iter()
            .filter(|idx| out_degrees[idx] == 0)
            .map(|idx| ranks[idx])
            .sum();

        let mut next: HashMap<_, f64> = indices
            .iter()
            .map(|&idx| (idx, (1.0 - config.pagerank_damping) / n_f64 + config.pagerank_damping * dangling_mass / n_f64))
            .collect();

        for &idx in &indices {
            let out_degree = out_degrees[&idx];
            if out_degree == 0 {
                continue;
            }
            let share = config.pagerank_damping * ranks[&idx] / out_degree as f64;
            for edge in graph.graph.edges_directed(idx, Direction::Outgoing) {
                *next.entry(edge.target()).or_insert(0.0) += share;
            }
        }

        let delta: f64 = indices.iter().map(|idx| (next[idx] - ranks[idx]).abs()).sum();
        ranks = next;
        if delta < config.pagerank_epsilon {
            break;
        }
    }

    let max_rank = ranks.values().cloned().fold(0.0_f64, f64::max);
    indices
        .into_iter()
        .map(|idx| {
            let normalized = if max_rank > 0.0 { ranks[&idx] / max_rank } else { 0.0 };
            (graph.id_of(idx).to_string(), normalized as f32)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::edge::Edge;
    use common::storage::types::node::{Node, NodeLabel};

    #[test]
    fn hub_ranks_higher_than_leaves() {
        let hub = Node::new_entity("public", NodeLabel::Entity, "hub");
        let leaf_a = Node::new_entity("public", NodeLabel::Entity, "leaf_a");
        let leaf_b = Node::new_entity("public", NodeLabel::Entity, "leaf_b");
        let edges = vec![
            Edge::new(&leaf_a.id, &hub.id, "RELATED", 1.0),
            Edge::new(&leaf_b.id, &hub.id, "RELATED", 1.0),
        ];
        let graph = NamespaceGraph::build(&[hub.clone(), leaf_a.clone(), leaf_b], &edges);
        let ranks = compute_pagerank(&graph, &AnalyticsConfig::default());
        assert!(ranks[&hub.id] > ranks[&leaf_a.id]);
        assert!((1.0 - ranks[&hub.id]).abs() < 1e-5);
    }

    #[test]
    fn empty_graph_produces_no_ranks() {
        let graph = NamespaceGraph::build(&[], &[]);
        assert!(compute_pagerank(&graph, &AnalyticsConfig::default()).is_empty());
    }
}
