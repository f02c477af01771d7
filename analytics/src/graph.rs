use std::collections::HashMap;

use common::storage::types::edge::Edge;
use common::storage::types::node::Node;
use petgraph::graph::{DiGraph, NodeIndex};

/// In-memory view of one namespace's graph, built once per recompute from
/// `GraphStore::all_nodes_and_edges` and shared across degree, PageRank,
/// betweenness and community detection so each pass doesn't re-fetch.
pub struct NamespaceGraph {
    pub graph: DiGraph<String, f32>,
    pub index_of: HashMap<String, NodeIndex>,
}

impl NamespaceGraph {
    pub fn build(nodes: &[Node], edges: &[Edge]) -> Self {
        let mut graph = DiGraph::new();
        let mut index_of = HashMap::with_capacity(nodes.len());
        for node in nodes {
            let idx = graph.add_node(node.id.clone());
            index_of.insert(node.id.clone(), idx);
        }
        for edge in edges {
            let (Some(&source), Some(&target)) =
                (index_of.get(&edge.source_id), index_of.get(&edge.target_id))
            else {
                continue;
            };
            graph.add_edge(source, target, edge.confidence);
        }
        Self { graph, index_of }
    }

    pub fn node_count(&self) -> usize {
        self.graph.node_count()
    }

    pub fn id_of(&self, idx: NodeIndex) -> &str {
        &self.graph[idx]
    }
}
