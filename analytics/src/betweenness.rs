use std::collections::HashMap;

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;
use petgraph::Direction;

use crate::graph::NamespaceGraph;
use common::utils::config::AnalyticsConfig;

/// Brandes' algorithm over the namespace graph treated as undirected
/// (two entities that co-occur are "structurally adjacent" regardless of
/// which one the extractor happened to name as source). Exact when
/// `|V| <= betweenness_exact_max_nodes`; otherwise every `stride`-th node
/// (by insertion order) seeds the accumulation instead of every node, a
/// deterministic stand-in for random source sampling (spec.md §4.8).
pub fn compute_betweenness(graph: &NamespaceGraph, config: &AnalyticsConfig) -> HashMap<String, f32> {
    let n = graph.node_count();
    let mut betweenness: HashMap<NodeIndex, f64> =
        graph.graph.node_indices().map(|idx| (idx, 0.0)).collect();
    if n < 2 {
        return to_ids(graph, &betweenness);
    }

    let sources = select_sources(graph, config);

    for source in sources {
        let mut stack = Vec::new();
        let mut predecessors: HashMap<NodeIndex, Vec<NodeIndex>> = HashMap::new();
        let mut sigma: HashMap<NodeIndex, f64> = graph.graph.node_indices().map(|idx| (idx, 0.0)).collect();
        let mut distance: HashMap<NodeIndex, i64> = graph.graph.node_indices().map(|idx| (idx, -1)).collect();
        sigma.insert(source, 1.0);
        distance.insert(source, 0);

        let mut queue = std::collections::VecDeque::new();
        queue.push_back(source);
        while let Some(v) = queue.pop_front() {
            stack.push(v);
            for neighbor in undirected_neighbors(graph, v) {
                if distance[&neighbor] < 0 {
                    distance.insert(neighbor, distance[&v] + 1);
                    queue.push_back(neighbor);
                }
                if distance[&neighbor] == distance[&v] + 1 {
                    *sigma.get_mut(&neighbor).expect("neighbor tracked") += sigma[&v];
                    predecessors.entry(neighbor).or_default().push(v);
                }
            }
        }

        let mut delta: HashMap<NodeIndex, f64> = graph.graph.node_indices().map(|idx| (idx, 0.0)).collect();
        while let Some(w) = stack.pop() {
            if let Some(preds) = predecessors.get(&w) {
                for &v in preds {
                    let contribution = (sigma[&v] / sigma[&w]) * (1.0 + delta[&w]);
                    *delta.get_mut(&v).expect("pred tracked") += contribution;
                }
            }
            if w != source {
                *betweenness.get_mut(&w).expect("node tracked") += delta[&w];
            }
        }
    }

    let max = betweenness.values().cloned().fold(0.0_f64, f64::max);
    if max > 0.0 {
        for value in betweenness.values_mut() {
            *value /= max;
        }
    }
    to_ids(graph, &betweenness)
}

fn select_sources(graph: &NamespaceGraph, config: &AnalyticsConfig) -> Vec<NodeIndex> {
    let all: Vec<NodeIndex> = graph.graph.node_indices().collect();
    if all.len() <= config.betweenness_exact_max_nodes {
        return all;
    }
    let stride = (all.len() as f64 / config.betweenness_exact_max_nodes as f64).ceil() as usize;
    all.into_iter().step_by(stride.max(1)).collect()
}

fn undirected_neighbors(graph: &NamespaceGraph, idx: NodeIndex) -> Vec<NodeIndex> {
    let mut neighbors: Vec<NodeIndex> = graph
        .graph
        .edges_directed(idx, Direction::Outgoing)
        .map(|edge| edge.target())
        .chain(graph.graph.edges_directed(idx, Direction::Incoming).map(|edge| edge.source()))
        .collect();
    neighbors.sort_unstable();
    neighbors.dedup();
    neighbors
}

fn to_ids(graph: &NamespaceGraph, values: &HashMap<NodeIndex, f64>) -> HashMap<String, f32> {
    values
        .iter()
        .map(|(idx, value)| (graph.id_of(*idx).to_string(), *value as f32))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::edge::Edge;
    use common::storage::types::node::{Node, NodeLabel};

    #[test]
    fn bridge_node_on_a_path_has_max_betweenness() {
        let a = Node::new_entity("public", NodeLabel::Entity, "a");
        let bridge = Node::new_entity("public", NodeLabel::Entity, "bridge");
        let c = Node::new_entity("public", NodeLabel::Entity, "c");
        let edges = vec![
            Edge::new(&a.id, &bridge.id, "RELATED", 1.0),
            Edge::new(&bridge.id, &c.id, "RELATED", 1.0),
        ];
        let graph = NamespaceGraph::build(&[a, bridge.clone(), c], &edges);
        let scores = compute_betweenness(&graph, &AnalyticsConfig::default());
        assert!((scores[&bridge.id] - 1.0).abs() < 1e-9);
    }

    #[test]
    fn disconnected_pair_has_zero_betweenness() {
        let a = Node::new_entity("public", NodeLabel::Entity, "a");
        let b = Node::new_entity("public", NodeLabel::Entity, "b");
        let graph = NamespaceGraph::build(&[a.clone(), b.clone()], &[]);
        let scores = compute_betweenness(&graph, &AnalyticsConfig::default());
        assert_eq!(scores[&a.id], 0.0);
        assert_eq!(scores[&b.id], 0.0);
    }
}
