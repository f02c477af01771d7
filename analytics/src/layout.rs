use std::collections::{HashMap, HashSet};
use std::f64::consts::PI;

use crate::graph::NamespaceGraph;

/// `POST /layout/recompute` body mode (spec.md §6). `Clustered` only
/// arranges communities into rings; `Hybrid` additionally pulls high-degree
/// nodes toward the center so hubs read as visually central regardless of
/// which community they land in.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayoutMode {
    Hybrid,
    Clustered,
}

/// Deterministic 2D layout written back onto `properties.layout.{x,y}`.
/// Every community gets its own ring around the origin; members within a
/// ring are spaced with the golden angle so they never stack on top of one
/// another regardless of community size.
pub fn compute_layout(
    graph: &NamespaceGraph,
    community_id: &HashMap<String, String>,
    degree_norm: &HashMap<String, f64>,
    mode: LayoutMode,
) -> HashMap<String, (f64, f64)> {
    const GOLDEN_ANGLE: f64 = 2.399_963_229_728_653; // 2*pi*(1 - 1/phi)

    let mut communities: Vec<&str> = community_id
        .values()
        .map(String::as_str)
        .collect::<HashSet<_>>()
        .into_iter()
        .collect();
    communities.sort_unstable();
    let ring_of: HashMap<&str, usize> = communities.iter().enumerate().map(|(i, &c)| (c, i)).collect();
    let ring_count = communities.len().max(1);

    let mut slot_of: HashMap<&str, usize> = HashMap::new();
    let mut positions = HashMap::with_capacity(graph.node_count());

    for idx in graph.graph.node_indices() {
        let id = graph.id_of(idx).to_string();
        let community = community_id.get(&id).map_or("_unassigned", String::as_str);
        let slot = *slot_of.entry(community).or_insert(0);
        slot_of.insert(community, slot + 1);

        let ring = ring_of.get(community).copied().unwrap_or(0);
        let ring_angle = 2.0 * PI * (ring as f64) / (ring_count as f64);
        let ring_radius = 200.0 + 150.0 * (ring as f64) / (ring_count as f64);
        let member_angle = GOLDEN_ANGLE * (slot as f64);
        let member_radius = 20.0 + 10.0 * (slot as f64).sqrt();

        let (cx, cy) = (ring_radius * ring_angle.cos(), ring_radius * ring_angle.sin());
        let mut x = cx + member_radius * member_angle.cos();
        let mut y = cy + member_radius * member_angle.sin();

        if mode == LayoutMode::Hybrid {
            let pull = degree_norm.get(&id).copied().unwrap_or(0.0).clamp(0.0, 1.0);
            x *= 1.0 - 0.5 * pull;
            y *= 1.0 - 0.5 * pull;
        }

        positions.insert(id, (x, y));
    }

    positions
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::edge::Edge;
    use common::storage::types::node::{Node, NodeLabel};

    #[test]
    fn every_node_gets_a_distinct_position() {
        let nodes: Vec<Node> = ["a", "b", "c"]
            .iter()
            .map(|n| Node::new_entity("public", NodeLabel::Entity, n))
            .collect();
        let edges = vec![Edge::new(
            Node::entity_id("public", "a"),
            Node::entity_id("public", "b"),
            "RELATED",
            1.0,
        )];
        let graph = NamespaceGraph::build(&nodes, &edges);
        let community_id = HashMap::new();
        let degree_norm = HashMap::new();

        let positions = compute_layout(&graph, &community_id, &degree_norm, LayoutMode::Clustered);
        assert_eq!(positions.len(), 3);
        let unique: HashSet<(i64, i64)> = positions
            .values()
            .map(|(x, y)| ((x * 1000.0) as i64, (y * 1000.0) as i64))
            .collect();
        assert_eq!(unique.len(), 3);
    }

    #[test]
    fn hybrid_mode_pulls_high_degree_nodes_closer_to_origin() {
        let nodes: Vec<Node> = ["hub", "leaf"]
            .iter()
            .map(|n| Node::new_entity("public", NodeLabel::Entity, n))
            .collect();
        let edges = vec![Edge::new(
            Node::entity_id("public", "hub"),
            Node::entity_id("public", "leaf"),
            "RELATED",
            1.0,
        )];
        let graph = NamespaceGraph::build(&nodes, &edges);
        let community_id = HashMap::new();
        let mut degree_norm = HashMap::new();
        degree_norm.insert(Node::entity_id("public", "hub"), 1.0);
        degree_norm.insert(Node::entity_id("public", "leaf"), 0.0);

        let clustered = compute_layout(&graph, &community_id, &degree_norm, LayoutMode::Clustered);
        let hybrid = compute_layout(&graph, &community_id, &degree_norm, LayoutMode::Hybrid);

        let hub_id = Node::entity_id("public", "hub");
        let dist = |(x, y): (f64, f64)| (x * x + y * y).sqrt();
        assert!(dist(hybrid[&hub_id]) < dist(clustered[&hub_id]));
    }
}
