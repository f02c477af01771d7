use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use analytics::LayoutMode;
use common::events::GraphEvent;
use common::storage::types::cluster::Cluster;
use orchestrator::RunTrigger;

use crate::{api_state::ApiState, error::ApiError};

fn default_namespace() -> String {
    "public".to_string()
}

#[derive(Debug, Deserialize)]
pub struct NamespaceBody {
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

#[derive(Debug, Serialize)]
pub struct CentralityResponse {
    pub node_count: usize,
    pub edge_count: usize,
    pub cluster_count: usize,
    pub modularity: f64,
}

/// `POST /centrality/recompute` (§4.8 C8): degree/PageRank/betweenness +
/// Louvain communities, with optional LLM cluster summarization.
pub async fn recompute_centrality(State(state): State<ApiState>, Json(body): Json<NamespaceBody>) -> Result<Json<CentralityResponse>, ApiError> {
    let llm = state.llm_client.as_ref().map(|client| (client, crate::api_state::CHAT_MODEL, state.summary_budget.as_ref()));
    let report = analytics::recompute(&state.graph, &state.db, &body.namespace, &state.config.analytics, llm).await?;
    Ok(Json(CentralityResponse {
        node_count: report.node_count,
        edge_count: report.edge_count,
        cluster_count: report.cluster_count,
        modularity: report.modularity,
    }))
}

#[derive(Debug, Deserialize)]
pub struct LayoutRequest {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub mode: LayoutModeBody,
}

#[derive(Debug, Default, Deserialize, Clone, Copy)]
#[serde(rename_all = "snake_case")]
pub enum LayoutModeBody {
    #[default]
    Hybrid,
    Clustered,
}

impl From<LayoutModeBody> for LayoutMode {
    fn from(mode: LayoutModeBody) -> Self {
        match mode {
            LayoutModeBody::Hybrid => LayoutMode::Hybrid,
            LayoutModeBody::Clustered => LayoutMode::Clustered,
        }
    }
}

#[derive(Debug, Serialize)]
pub struct LayoutResponse {
    pub positioned: usize,
}

/// `POST /layout/recompute` (§6): deterministic 2D layout over current
/// community assignments.
pub async fn recompute_layout(State(state): State<ApiState>, Json(body): Json<LayoutRequest>) -> Result<Json<LayoutResponse>, ApiError> {
    let positioned = analytics::recompute_layout(&state.graph, &body.namespace, body.mode.into()).await?;
    Ok(Json(LayoutResponse { positioned }))
}

#[derive(Debug, Deserialize)]
pub struct ClusterQuery {
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

#[derive(Debug, Serialize)]
pub struct ClusterListResponse {
    pub clusters: Vec<Cluster>,
    pub stats: ClusterStats,
}

#[derive(Debug, Default, Serialize)]
pub struct ClusterStats {
    pub count: usize,
    pub total_nodes: usize,
}

async fn clusters_for_namespace(state: &ApiState, namespace: &str) -> Result<Vec<Cluster>, ApiError> {
    let mut result = state
        .db
        .client
        .query("SELECT * FROM cluster WHERE namespace = $namespace ORDER BY cluster_id")
        .bind(("namespace", namespace.to_string()))
        .await
        .map_err(common::error::GraphRagError::from)?;
    let clusters: Vec<Cluster> = result.take(0).map_err(common::error::GraphRagError::from)?;
    Ok(clusters)
}

/// `GET /cluster` (§6): communities detected by the last analytics recompute.
pub async fn list_clusters(State(state): State<ApiState>, Query(params): Query<ClusterQuery>) -> Result<Json<ClusterListResponse>, ApiError> {
    let clusters = clusters_for_namespace(&state, &params.namespace).await?;
    let stats = ClusterStats {
        count: clusters.len(),
        total_nodes: clusters.iter().map(|cluster| cluster.size).sum(),
    };
    Ok(Json(ClusterListResponse { clusters, stats }))
}

#[derive(Debug, Serialize)]
pub struct ClusterSummariesResponse {
    pub summaries: Vec<Cluster>,
}

/// `POST /cluster/summarize` (§4.8): re-runs LLM summarization for every
/// cluster in a namespace, skipping ones whose cache key hasn't changed.
pub async fn summarize_clusters(
    State(state): State<ApiState>,
    Json(body): Json<NamespaceBody>,
) -> Result<Json<ClusterSummariesResponse>, ApiError> {
    let Some(client) = state.llm_client.as_ref() else {
        return Ok(Json(ClusterSummariesResponse { summaries: clusters_for_namespace(&state, &body.namespace).await? }));
    };

    let mut clusters = clusters_for_namespace(&state, &body.namespace).await?;
    for cluster in &mut clusters {
        let key = analytics::cluster_cache_key(&cluster.cluster_id, &cluster.top_terms);
        if cluster.summary.as_ref().is_some_and(|summary| summary.cache_key == key) {
            continue;
        }
        let sample_entity_names: Vec<String> = Vec::new();
        cluster.summary = analytics::summarize_cluster(
            Some(client),
            crate::api_state::CHAT_MODEL,
            state.summary_budget.as_ref(),
            &cluster.cluster_id,
            &cluster.top_terms,
            &sample_entity_names,
        )
        .await;
        cluster.updated_at = chrono::Utc::now();
        let _: Option<Cluster> = state
            .db
            .client
            .update(("cluster", cluster.id.as_str()))
            .content(cluster.clone())
            .await
            .map_err(common::error::GraphRagError::from)?;
    }

    Ok(Json(ClusterSummariesResponse { summaries: clusters }))
}

/// `GET /cluster/summaries` (§6): cached summaries without recomputation.
pub async fn get_cluster_summaries(State(state): State<ApiState>, Query(params): Query<ClusterQuery>) -> Result<Json<ClusterSummariesResponse>, ApiError> {
    let summaries = clusters_for_namespace(&state, &params.namespace).await?;
    Ok(Json(ClusterSummariesResponse { summaries }))
}

#[derive(Debug, Deserialize)]
pub struct IndexRunRequest {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub force: bool,
}

#[derive(Debug, Serialize)]
pub struct IndexRunResponse {
    pub run_id: String,
    pub status: String,
}

/// `POST /index/run` (§4.9 C9): runs one batch orchestration pass to
/// completion and publishes `index_run_completed` once done.
pub async fn index_run(State(state): State<ApiState>, Json(body): Json<IndexRunRequest>) -> Result<Json<IndexRunResponse>, ApiError> {
    let record = state.orchestrator.run_once(&body.namespace, RunTrigger::Manual, body.force).await?;

    state.events.publish(GraphEvent::IndexRunCompleted {
        namespace: body.namespace,
        run_id: record.run_id.clone(),
        status: format!("{:?}", record.status),
        at: chrono::Utc::now(),
    });

    Ok(Json(IndexRunResponse {
        run_id: record.run_id,
        status: format!("{:?}", record.status),
    }))
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub namespaces: usize,
}

/// `GET /metrics` (§6): lightweight liveness-level counters.
pub async fn metrics(State(state): State<ApiState>) -> Result<Json<MetricsResponse>, ApiError> {
    let (namespaces, _store) = state.graph.namespaces().await?;
    Ok(Json(MetricsResponse { namespaces: namespaces.len() }))
}

#[derive(Debug, Serialize)]
pub struct NamespaceMetrics {
    pub namespace: String,
    pub node_count: usize,
    pub edge_count: usize,
}

#[derive(Debug, Serialize)]
pub struct MetricsExtendedResponse {
    pub namespaces: Vec<NamespaceMetrics>,
}

/// `GET /metrics/extended` (§6): per-namespace node/edge counts.
pub async fn metrics_extended(State(state): State<ApiState>) -> Result<Json<MetricsExtendedResponse>, ApiError> {
    let (namespace_names, _store) = state.graph.namespaces().await?;
    let mut namespaces = Vec::with_capacity(namespace_names.len());
    for namespace in namespace_names {
        let (nodes, edges) = state.graph.all_nodes_and_edges(&namespace).await?;
        namespaces.push(NamespaceMetrics {
            namespace,
            node_count: nodes.len(),
            edge_count: edges.len(),
        });
    }
    Ok(Json(MetricsExtendedResponse { namespaces }))
}
