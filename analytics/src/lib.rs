mod betweenness;
mod budget;
mod community;
mod degree;
mod graph;
mod importance;
mod layout;
mod pagerank;
mod summary;
mod terms;

pub use budget::DailyTokenBudget;
pub use layout::{compute_layout, LayoutMode};
pub use summary::cache_key as cluster_cache_key;
pub use summary::summarize_cluster;

use std::collections::HashMap;

use async_openai::config::OpenAIConfig;
use async_openai::Client;
use serde_json::Map;
use tracing::info;

use common::error::GraphRagError;
use common::storage::db::{GraphStore, SurrealDbClient};
use common::storage::types::cluster::Cluster;
use common::utils::config::AnalyticsConfig;

use graph::NamespaceGraph;

#[derive(Debug, Clone, Default)]
pub struct AnalyticsReport {
    pub node_count: usize,
    pub edge_count: usize,
    pub cluster_count: usize,
    pub modularity: f64,
}

/// Automatic recompute trigger (spec.md §4.8): fires when at least 10% of
/// the namespace's current node count arrived since the last analytics
/// run.
pub fn needs_recompute(new_nodes_since_last_run: usize, total_nodes: usize, config: &AnalyticsConfig) -> bool {
    if total_nodes == 0 {
        return false;
    }
    (new_nodes_since_last_run as f64 / total_nodes as f64) >= config.recompute_threshold
}

/// Full C8 recompute for one namespace: centrality metrics written back
/// onto each node's properties, then a community pass whose clusters are
/// persisted (and, if an LLM client is supplied, summarized).
#[tracing::instrument(skip_all, fields(namespace))]
pub async fn recompute(
    graph: &GraphStore,
    db: &SurrealDbClient,
    namespace: &str,
    config: &AnalyticsConfig,
    llm: Option<(&Client<OpenAIConfig>, &str, &DailyTokenBudget)>,
) -> Result<AnalyticsReport, GraphRagError> {
    let (nodes, edges) = graph.all_nodes_and_edges(namespace).await?;
    let namespace_graph = NamespaceGraph::build(&nodes, &edges);

    let degrees = degree::compute_degree(&namespace_graph);
    let pagerank = pagerank::compute_pagerank(&namespace_graph, config);
    let betweenness = betweenness::compute_betweenness(&namespace_graph, config);

    let mut updates = Vec::with_capacity(nodes.len());
    for node in &nodes {
        let (degree_value, degree_norm) = degrees.get(&node.id).copied().unwrap_or((0, 0.0));
        let pagerank_norm = pagerank.get(&node.id).copied().unwrap_or(0.0);
        let betweenness_norm = betweenness.get(&node.id).copied().unwrap_or(0.0);
        let importance = importance::compute_importance(degree_norm, pagerank_norm, betweenness_norm);

        let mut fields = Map::new();
        fields.insert("degree".to_string(), serde_json::json!(degree_value));
        fields.insert("degree_norm".to_string(), serde_json::json!(degree_norm));
        fields.insert("pagerank_norm".to_string(), serde_json::json!(pagerank_norm));
        fields.insert("betweenness_norm".to_string(), serde_json::json!(betweenness_norm));
        fields.insert("importance".to_string(), serde_json::json!(importance));
        updates.push((node.id.clone(), fields));
    }

    let communities = community::detect_communities(&namespace_graph);
    let nodes_by_id: HashMap<&str, &common::storage::types::node::Node> =
        nodes.iter().map(|n| (n.id.as_str(), n)).collect();

    for (node_id, fields) in updates.iter_mut() {
        if let Some(community_id) = communities.community_id.get(node_id) {
            fields.insert("community_id".to_string(), serde_json::json!(community_id));
        }
        if let Some(level) = communities.community_level.get(node_id) {
            fields.insert("community_level".to_string(), serde_json::json!(level));
        }
    }
    graph.write_analytics_properties(updates).await?;

    for cluster in &communities.clusters {
        let cluster_nodes: Vec<&common::storage::types::node::Node> = cluster
            .node_ids
            .iter()
            .filter_map(|id| nodes_by_id.get(id.as_str()).copied())
            .collect();
        let top_terms = terms::top_terms(cluster_nodes.iter().copied(), config.cluster_top_terms);
        let centroid = terms::centroid(cluster_nodes.iter().copied());

        let summary = if let Some((client, model, budget)) = llm {
            let sample_entity_names: Vec<String> = cluster_nodes
                .iter()
                .filter(|n| n.label != common::storage::types::node::NodeLabel::Chunk)
                .take(config.cluster_sample_entities)
                .map(|n| n.name.clone())
                .collect();
            summary::summarize_cluster(Some(client), model, budget, &cluster.cluster_id, &top_terms, &sample_entity_names).await
        } else {
            None
        };

        let id = Cluster::id_for(namespace, &cluster.cluster_id);
        let now = chrono::Utc::now();
        let record = Cluster {
            id: id.clone(),
            created_at: now,
            updated_at: now,
            namespace: namespace.to_string(),
            cluster_id: cluster.cluster_id.clone(),
            level: cluster.level,
            node_ids: cluster.node_ids.clone(),
            size: cluster.node_ids.len(),
            top_terms,
            centroid,
            summary,
        };
        let _: Option<Cluster> = db.client.upsert(("cluster", id.as_str())).content(record).await?;
    }

    info!(
        namespace,
        node_count = nodes.len(),
        edge_count = edges.len(),
        cluster_count = communities.clusters.len(),
        modularity = communities.modularity,
        "analytics recompute finished"
    );

    Ok(AnalyticsReport {
        node_count: nodes.len(),
        edge_count: edges.len(),
        cluster_count: communities.clusters.len(),
        modularity: communities.modularity,
    })
}

/// `POST /layout/recompute` (spec.md §6): reads each node's current
/// `community_id`/`degree_norm` (populated by a prior [`recompute`]) and
/// writes fresh `layout.x`/`layout.y`/`layout_version` properties. Returns
/// the number of nodes positioned.
#[tracing::instrument(skip_all, fields(namespace))]
pub async fn recompute_layout(
    graph: &GraphStore,
    namespace: &str,
    mode: LayoutMode,
) -> Result<usize, GraphRagError> {
    let (nodes, edges) = graph.all_nodes_and_edges(namespace).await?;
    let namespace_graph = NamespaceGraph::build(&nodes, &edges);

    let community_id: HashMap<String, String> = nodes
        .iter()
        .filter_map(|node| {
            node.properties
                .get("community_id")
                .and_then(serde_json::Value::as_str)
                .map(|c| (node.id.clone(), c.to_string()))
        })
        .collect();
    let degree_norm: HashMap<String, f64> = nodes.iter().map(|node| (node.id.clone(), node.degree_norm())).collect();

    let positions = layout::compute_layout(&namespace_graph, &community_id, &degree_norm, mode);
    let version = chrono::Utc::now().timestamp_millis();

    let updates = positions
        .into_iter()
        .map(|(id, (x, y))| {
            let mut fields = Map::new();
            fields.insert("layout".to_string(), serde_json::json!({ "x": x, "y": y }));
            fields.insert("layout_version".to_string(), serde_json::json!(version));
            (id, fields)
        })
        .collect::<Vec<_>>();
    let positioned = updates.len();

    graph.write_analytics_properties(updates).await?;
    info!(namespace, positioned, ?mode, "layout recompute finished");
    Ok(positioned)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recompute_trigger_fires_at_ten_percent() {
        let config = AnalyticsConfig::default();
        assert!(needs_recompute(10, 100, &config));
        assert!(!needs_recompute(9, 100, &config));
    }

    #[test]
    fn recompute_trigger_never_fires_on_empty_namespace() {
        let config = AnalyticsConfig::default();
        assert!(!needs_recompute(0, 0, &config));
    }
}
