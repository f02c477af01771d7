use std::collections::HashMap;

use petgraph::graph::NodeIndex;
use petgraph::visit::EdgeRef;

use crate::graph::NamespaceGraph;

pub struct ClusterInfo {
    pub cluster_id: String,
    pub node_ids: Vec<String>,
    pub level: u32,
}

pub struct CommunityResult {
    pub clusters: Vec<ClusterInfo>,
    pub community_id: HashMap<String, String>,
    pub community_level: HashMap<String, u32>,
    pub modularity: f64,
}

/// Weighted undirected adjacency used by the local-moving phase: edge
/// `confidence` is the weight, and a reciprocal pair `a->b`, `b->a`
/// collapses into one weighted undirected edge.
fn weighted_adjacency(graph: &NamespaceGraph) -> HashMap<NodeIndex, HashMap<NodeIndex, f64>> {
    let mut adjacency: HashMap<NodeIndex, HashMap<NodeIndex, f64>> = HashMap::new();
    for idx in graph.graph.node_indices() {
        adjacency.entry(idx).or_default();
    }
    for edge in graph.graph.edge_references() {
        let weight = f64::from(*edge.weight());
        *adjacency.entry(edge.source()).or_default().entry(edge.target()).or_insert(0.0) += weight;
        *adjacency.entry(edge.target()).or_default().entry(edge.source()).or_insert(0.0) += weight;
    }
    adjacency
}

/// One pass of Louvain's local-moving phase: repeatedly move nodes into
/// the neighboring community that yields the largest modularity gain
/// until a full sweep produces no moves (spec.md §4.8).
fn local_moving(
    adjacency: &HashMap<NodeIndex, HashMap<NodeIndex, f64>>,
    total_weight: f64,
) -> HashMap<NodeIndex, NodeIndex> {
    let mut community_of: HashMap<NodeIndex, NodeIndex> =
        adjacency.keys().map(|&idx| (idx, idx)).collect();
    let degree: HashMap<NodeIndex, f64> =
        adjacency.iter().map(|(&idx, neighbors)| (idx, neighbors.values().sum())).collect();
    let mut sum_tot: HashMap<NodeIndex, f64> = degree.clone();

    if total_weight <= 0.0 {
        return community_of;
    }

    let two_m = 2.0 * total_weight;
    let nodes: Vec<NodeIndex> = adjacency.keys().copied().collect();

    for _pass in 0..20 {
        let mut moved = false;
        for &node in &nodes {
            let current_community = community_of[&node];
            let k_i = degree[&node];

            *sum_tot.get_mut(&current_community).expect("community tracked") -= k_i;

            let mut weight_to_community: HashMap<NodeIndex, f64> = HashMap::new();
            for (&neighbor, &weight) in &adjacency[&node] {
                if neighbor == node {
                    continue;
                }
                *weight_to_community.entry(community_of[&neighbor]).or_insert(0.0) += weight;
            }

            let mut best_community = current_community;
            let mut best_gain = weight_to_community.get(&current_community).copied().unwrap_or(0.0)
                - sum_tot[&current_community] * k_i / two_m;

            for (&candidate, &k_i_in) in &weight_to_community {
                let gain = k_i_in - sum_tot.get(&candidate).copied().unwrap_or(0.0) * k_i / two_m;
                if gain > best_gain {
                    best_gain = gain;
                    best_community = candidate;
                }
            }

            *sum_tot.get_mut(&best_community).or_insert(0.0) += k_i;
            if best_community != current_community {
                community_of.insert(node, best_community);
                moved = true;
            }
        }
        if !moved {
            break;
        }
    }

    community_of
}

fn modularity(
    adjacency: &HashMap<NodeIndex, HashMap<NodeIndex, f64>>,
    community_of: &HashMap<NodeIndex, NodeIndex>,
    total_weight: f64,
) -> f64 {
    if total_weight <= 0.0 {
        return 0.0;
    }
    let two_m = 2.0 * total_weight;
    let degree: HashMap<NodeIndex, f64> =
        adjacency.iter().map(|(&idx, neighbors)| (idx, neighbors.values().sum())).collect();

    let mut q = 0.0;
    for (&i, neighbors) in adjacency {
        for (&j, &weight) in neighbors {
            if community_of[&i] == community_of[&j] {
                q += weight - (degree[&i] * degree[&j]) / two_m;
            }
        }
    }
    q / two_m
}

/// Louvain-style community detection (spec.md §4.8). Runs the
/// local-moving phase once to assign finest-grained clusters
/// (`community_level = 0`), then coarsens the graph into one supernode
/// per cluster and repeats, so `community_level = 1` clusters group the
/// level-0 clusters that merge further. Stops coarsening once a pass
/// produces no merges.
pub fn detect_communities(graph: &NamespaceGraph) -> CommunityResult {
    let adjacency = weighted_adjacency(graph);
    let total_weight: f64 = adjacency.values().flat_map(HashMap::values).sum::<f64>() / 2.0;

    let level0 = local_moving(&adjacency, total_weight);
    let level0_modularity = modularity(&adjacency, &level0, total_weight);

    // Coarsen: one supernode per level-0 community.
    let mut super_of: HashMap<NodeIndex, NodeIndex> = HashMap::new();
    for (&node, &community) in &level0 {
        super_of.entry(community).or_insert(community);
        super_of.insert(node, community);
    }

    let mut coarse_adjacency: HashMap<NodeIndex, HashMap<NodeIndex, f64>> = HashMap::new();
    for (&i, neighbors) in &adjacency {
        let ci = level0[&i];
        coarse_adjacency.entry(ci).or_default();
        for (&j, &weight) in neighbors {
            if i == j {
                continue;
            }
            let cj = level0[&j];
            *coarse_adjacency.entry(ci).or_default().entry(cj).or_insert(0.0) += weight / 2.0;
        }
    }

    let level1_of_community = local_moving(&coarse_adjacency, total_weight);
    let merged = level1_of_community.values().collect::<std::collections::HashSet<_>>().len()
        < level0.values().collect::<std::collections::HashSet<_>>().len();

    let mut community_id = HashMap::new();
    let mut community_level = HashMap::new();
    let mut node_ids_by_cluster: HashMap<NodeIndex, Vec<String>> = HashMap::new();

    for (&node, &c0) in &level0 {
        let final_community = if merged {
            *level1_of_community.get(&c0).unwrap_or(&c0)
        } else {
            c0
        };
        let id = node_id_label(graph, final_community);
        community_id.insert(graph.id_of(node).to_string(), id.clone());
        community_level.insert(graph.id_of(node).to_string(), u32::from(merged));
        node_ids_by_cluster.entry(final_community).or_default().push(graph.id_of(node).to_string());
    }

    let mut clusters: Vec<ClusterInfo> = node_ids_by_cluster
        .into_iter()
        .map(|(idx, mut node_ids)| {
            node_ids.sort();
            ClusterInfo {
                cluster_id: node_id_label(graph, idx),
                node_ids,
                level: u32::from(merged),
            }
        })
        .collect();
    clusters.sort_by(|a, b| a.cluster_id.cmp(&b.cluster_id));

    let modularity = if merged { modularity(&coarse_adjacency, &level1_of_community, total_weight) } else { level0_modularity };

    CommunityResult { clusters, community_id, community_level, modularity }
}

fn node_id_label(graph: &NamespaceGraph, idx: NodeIndex) -> String {
    format!("cluster:{}", graph.id_of(idx))
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::edge::Edge;
    use common::storage::types::node::{Node, NodeLabel};

    #[test]
    fn two_dense_triangles_split_into_two_communities() {
        let nodes: Vec<Node> = ["a1", "a2", "a3", "b1", "b2", "b3"]
            .iter()
            .map(|n| Node::new_entity("public", NodeLabel::Entity, n))
            .collect();
        let mut edges = Vec::new();
        for (x, y) in [("a1", "a2"), ("a2", "a3"), ("a1", "a3")] {
            edges.push(Edge::new(Node::entity_id("public", x), Node::entity_id("public", y), "RELATED", 1.0));
        }
        for (x, y) in [("b1", "b2"), ("b2", "b3"), ("b1", "b3")] {
            edges.push(Edge::new(Node::entity_id("public", x), Node::entity_id("public", y), "RELATED", 1.0));
        }
        edges.push(Edge::new(Node::entity_id("public", "a1"), Node::entity_id("public", "b1"), "RELATED", 0.01));

        let graph = NamespaceGraph::build(&nodes, &edges);
        let result = detect_communities(&graph);

        let a1 = Node::entity_id("public", "a1");
        let a2 = Node::entity_id("public", "a2");
        let b1 = Node::entity_id("public", "b1");
        assert_eq!(result.community_id[&a1], result.community_id[&a2]);
        assert_ne!(result.community_id[&a1], result.community_id[&b1]);
    }
}
