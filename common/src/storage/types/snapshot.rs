use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};

use crate::stored_object;

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Default)]
pub struct SnapshotAggregates {
    pub node_count: usize,
    pub edge_count: usize,
    pub modularity: f64,
}

stored_object!(Snapshot, "snapshot", {
    namespace: String,
    node_ids: BTreeSet<String>,
    edge_ids: BTreeSet<String>,
    community_ids: BTreeSet<String>,
    aggregates: SnapshotAggregates
});

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct SnapshotDiff {
    pub added_node_ids: Vec<String>,
    pub removed_node_ids: Vec<String>,
    pub added_edge_ids: Vec<String>,
    pub removed_edge_ids: Vec<String>,
    pub added_community_ids: Vec<String>,
    pub removed_community_ids: Vec<String>,
    pub delta_nodes: i64,
    pub delta_edges: i64,
    pub delta_modularity: f64,
}

/// Diff between snapshots A and B (§4.10). Pure function over stored
/// snapshots; no mutation. `diff(a, b)` and `diff(b, a)` satisfy P8:
/// swapped added/removed sets and negated deltas.
pub fn diff(a: &Snapshot, b: &Snapshot) -> SnapshotDiff {
    let added_node_ids = sorted_difference(&b.node_ids, &a.node_ids);
    let removed_node_ids = sorted_difference(&a.node_ids, &b.node_ids);
    let added_edge_ids = sorted_difference(&b.edge_ids, &a.edge_ids);
    let removed_edge_ids = sorted_difference(&a.edge_ids, &b.edge_ids);
    let added_community_ids = sorted_difference(&b.community_ids, &a.community_ids);
    let removed_community_ids = sorted_difference(&a.community_ids, &b.community_ids);

    SnapshotDiff {
        added_node_ids,
        removed_node_ids,
        added_edge_ids,
        removed_edge_ids,
        added_community_ids,
        removed_community_ids,
        delta_nodes: b.aggregates.node_count as i64 - a.aggregates.node_count as i64,
        delta_edges: b.aggregates.edge_count as i64 - a.aggregates.edge_count as i64,
        delta_modularity: b.aggregates.modularity - a.aggregates.modularity,
    }
}

fn sorted_difference(left: &BTreeSet<String>, right: &BTreeSet<String>) -> Vec<String> {
    left.difference(right).cloned().collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    fn snapshot(namespace: &str, nodes: &[&str], node_count: usize) -> Snapshot {
        let now = chrono::Utc::now();
        Snapshot {
            id: format!("{namespace}:{node_count}"),
            created_at: now,
            updated_at: now,
            namespace: namespace.to_string(),
            node_ids: nodes.iter().map(|s| s.to_string()).collect::<BTreeSet<_>>(),
            edge_ids: BTreeSet::new(),
            community_ids: BTreeSet::new(),
            aggregates: SnapshotAggregates {
                node_count,
                edge_count: 0,
                modularity: 0.5,
            },
        }
    }

    #[test]
    fn diff_is_antisymmetric() {
        let a = snapshot("public", &["n1", "n2"], 2);
        let b = snapshot("public", &["n2", "n3"], 2);

        let ab = diff(&a, &b);
        let ba = diff(&b, &a);

        assert_eq!(ab.added_node_ids, ba.removed_node_ids);
        assert_eq!(ab.removed_node_ids, ba.added_node_ids);
        assert_eq!(ab.delta_nodes, -ba.delta_nodes);
        assert_eq!(ab.delta_modularity, -ba.delta_modularity);
    }
}
