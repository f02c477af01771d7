use std::collections::HashMap;

use petgraph::Direction;

use crate::graph::NamespaceGraph;

/// `degree = in + out`, normalized by the namespace's maximum degree
/// (spec.md §4.8). A namespace with a single node (max degree 0) gets
/// `degree_norm = 0.0` for everyone rather than dividing by zero.
pub fn compute_degree(graph: &NamespaceGraph) -> HashMap<String, (u32, f32)> {
    let mut degrees = HashMap::with_capacity(graph.node_count());
    let mut max_degree = 0u32;

    for idx in graph.graph.node_indices() {
        let in_deg = graph.graph.edges_directed(idx, Direction::Incoming).count() as u32;
        let out_deg = graph.graph.edges_directed(idx, Direction::Outgoing).count() as u32;
        let degree = in_deg + out_deg;
        max_degree = max_degree.max(degree);
        degrees.insert(graph.id_of(idx).to_string(), (degree, 0.0));
    }

    if max_degree > 0 {
        for value in degrees.values_mut() {
            value.1 = value.0 as f32 / max_degree as f32;
        }
    }

    degrees
}

#[cfg(test)]
mod tests {
    use super::*;
    use common::storage::types::edge::Edge;
    use common::storage::types::node::{Node, NodeLabel};

    #[test]
    fn hub_node_gets_degree_norm_one() {
        let a = Node::new_entity("public", NodeLabel::Entity, "a");
        let b = Node::new_entity("public", NodeLabel::Entity, "b");
        let c = Node::new_entity("public", NodeLabel::Entity, "c");
        let edges = vec![
            Edge::new(&a.id, &b.id, "RELATED", 1.0),
            Edge::new(&a.id, &c.id, "RELATED", 1.0),
        ];
        let graph = NamespaceGraph::build(&[a.clone(), b, c], &edges);
        let degrees = compute_degree(&graph);
        assert_eq!(degrees[&a.id].0, 2);
        assert!((degrees[&a.id].1 - 1.0).abs() < f32::EPSILON);
    }
}
