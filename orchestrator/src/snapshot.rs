use std::collections::BTreeSet;

use common::error::GraphRagError;
use common::storage::db::{GraphStore, SurrealDbClient};
use common::storage::types::cluster::Cluster;
use common::storage::types::snapshot::{Snapshot, SnapshotAggregates};

/// Builds a point-in-time [`Snapshot`] of a namespace's node/edge/community
/// identities (spec.md §4.10). `modularity` is carried forward from the
/// last analytics recompute rather than recomputed here, since a snapshot
/// is a cheap bookkeeping step that shouldn't force a graph-algorithm pass.
pub async fn build_snapshot(
    graph: &GraphStore,
    db: &SurrealDbClient,
    namespace: &str,
    modularity: f64,
) -> Result<Snapshot, GraphRagError> {
    let (nodes, edges) = graph.all_nodes_and_edges(namespace).await?;
    let node_ids: BTreeSet<String> = nodes.iter().map(|n| n.id.clone()).collect();
    let edge_ids: BTreeSet<String> = edges.iter().map(|e| e.id.clone()).collect();

    let clusters: Vec<Cluster> = db
        .client
        .query("SELECT * FROM cluster WHERE namespace = $namespace")
        .bind(("namespace", namespace.to_string()))
        .await?
        .take(0)?;
    let community_ids: BTreeSet<String> = clusters.iter().map(|c| c.cluster_id.clone()).collect();

    let now = chrono::Utc::now();
    Ok(Snapshot {
        id: format!("{namespace}:{}", now.timestamp_millis()),
        created_at: now,
        updated_at: now,
        namespace: namespace.to_string(),
        aggregates: SnapshotAggregates {
            node_count: node_ids.len(),
            edge_count: edge_ids.len(),
            modularity,
        },
        node_ids,
        edge_ids,
        community_ids,
    })
}

/// Most recently stored snapshot for a namespace, used both as the diff
/// baseline for a new run and as the source of the carried-forward
/// modularity value.
pub async fn latest_snapshot(db: &SurrealDbClient, namespace: &str) -> Result<Option<Snapshot>, GraphRagError> {
    let snapshots: Vec<Snapshot> = db
        .client
        .query("SELECT * FROM snapshot WHERE namespace = $namespace ORDER BY created_at DESC LIMIT 1")
        .bind(("namespace", namespace.to_string()))
        .await?
        .take(0)?;
    Ok(snapshots.into_iter().next())
}
