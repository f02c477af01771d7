use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use common::error::GraphRagError;
use common::storage::db::{SampleMode, Viewport};
use common::storage::types::edge::Edge;
use common::storage::types::node::Node;
use retrieval::scoring::cosine_similarity;

use crate::{api_state::ApiState, error::ApiError};

fn default_namespace() -> String {
    "public".to_string()
}

fn default_limit() -> usize {
    100
}

fn default_sample() -> usize {
    500
}

#[derive(Debug, Deserialize)]
pub struct GraphQuery {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub mode: GraphSampleMode,
    #[serde(default = "default_sample")]
    pub sample: usize,
    pub min_x: Option<f64>,
    pub min_y: Option<f64>,
    pub max_x: Option<f64>,
    pub max_y: Option<f64>,
}

#[derive(Debug, Default, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum GraphSampleMode {
    #[default]
    Random,
    Viewport,
}

#[derive(Debug, Serialize)]
pub struct GraphResponse {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
    pub namespace: String,
}

/// `GET /graph` (§6): a bounded sample of one namespace's nodes/edges for
/// visualization, either uniformly random or restricted to a viewport.
pub async fn get_graph(State(state): State<ApiState>, Query(params): Query<GraphQuery>) -> Result<Json<GraphResponse>, ApiError> {
    let (mode, viewport) = match params.mode {
        GraphSampleMode::Random => (SampleMode::Random, None),
        GraphSampleMode::Viewport => (
            SampleMode::Viewport,
            Some(Viewport {
                min_x: params.min_x.unwrap_or(f64::MIN),
                min_y: params.min_y.unwrap_or(f64::MIN),
                max_x: params.max_x.unwrap_or(f64::MAX),
                max_y: params.max_y.unwrap_or(f64::MAX),
            }),
        ),
    };

    let (nodes, edges, _store) = state.graph.sample_subgraph(&params.namespace, mode, viewport, params.sample).await?;
    Ok(Json(GraphResponse {
        nodes,
        edges,
        namespace: params.namespace,
    }))
}

#[derive(Debug, Deserialize)]
pub struct NodesQuery {
    #[serde(default = "default_namespace")]
    pub namespace: String,
    pub cursor: Option<String>,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct NodesResponse {
    pub results: Vec<Node>,
    pub cursor: Option<String>,
}

/// `GET /nodes` (§6): cursor-paginated node listing for one namespace.
pub async fn list_nodes(State(state): State<ApiState>, Query(params): Query<NodesQuery>) -> Result<Json<NodesResponse>, ApiError> {
    let (results, cursor, _store) = state
        .graph
        .iterate_nodes(&params.namespace, params.cursor.as_deref(), params.limit)
        .await?;
    Ok(Json(NodesResponse { results, cursor }))
}

#[derive(Debug, Deserialize)]
pub struct EdgesQuery {
    pub node_ids: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct EdgesResponse {
    pub results: Vec<Edge>,
}

/// `GET /edges` (§6): edges touching any of a comma-separated `node_ids`
/// list.
pub async fn list_edges(State(state): State<ApiState>, Query(params): Query<EdgesQuery>) -> Result<Json<EdgesResponse>, ApiError> {
    let ids: Vec<String> = params.node_ids.split(',').map(str::trim).filter(|id| !id.is_empty()).map(String::from).collect();
    let (results, _store) = state.graph.edges_for_nodes(&ids, params.limit).await?;
    Ok(Json(EdgesResponse { results }))
}

#[derive(Debug, Deserialize)]
pub struct NeighborsQuery {
    #[serde(default = "default_depth")]
    pub depth: u8,
}

fn default_depth() -> u8 {
    1
}

#[derive(Debug, Serialize)]
pub struct NeighborsResponse {
    pub nodes: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// `GET /neighbors/{node_id}` (§6): BFS neighborhood up to `depth` (clamped to 2).
pub async fn get_neighbors(
    State(state): State<ApiState>,
    Path(node_id): Path<String>,
    Query(params): Query<NeighborsQuery>,
) -> Result<Json<NeighborsResponse>, ApiError> {
    let neighbors = state.graph.neighbors(&node_id, params.depth).await?;
    Ok(Json(NeighborsResponse {
        nodes: neighbors.nodes,
        edges: neighbors.edges,
    }))
}

#[derive(Debug, Deserialize)]
pub struct SearchQuery {
    pub q: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct SearchResponse {
    pub results: Vec<Node>,
}

/// `GET /search` (§6): case-insensitive name-prefix match within a namespace.
pub async fn search(State(state): State<ApiState>, Query(params): Query<SearchQuery>) -> Result<Json<SearchResponse>, ApiError> {
    let (results, _store) = state.graph.search_by_name(&params.q, &params.namespace, params.limit).await?;
    Ok(Json(SearchResponse { results }))
}

#[derive(Debug, Deserialize)]
pub struct StatsQuery {
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

#[derive(Debug, Default, Serialize)]
pub struct StatsResponse {
    pub node_count: usize,
    pub edge_count: usize,
    pub label_counts: std::collections::BTreeMap<String, usize>,
}

/// `GET /stats` (§6): aggregate node/edge counts for one namespace,
/// computed over the same full pull [`analytics::recompute`] already uses.
pub async fn stats(State(state): State<ApiState>, Query(params): Query<StatsQuery>) -> Result<Json<StatsResponse>, ApiError> {
    let (nodes, edges) = state.graph.all_nodes_and_edges(&params.namespace).await?;
    let mut label_counts = std::collections::BTreeMap::new();
    for node in &nodes {
        *label_counts.entry(node.label.as_str().to_string()).or_insert(0) += 1;
    }
    Ok(Json(StatsResponse {
        node_count: nodes.len(),
        edge_count: edges.len(),
        label_counts,
    }))
}

#[derive(Debug, Serialize)]
pub struct NamespacesResponse {
    pub namespaces: Vec<String>,
}

/// `GET /namespaces` (§6).
pub async fn namespaces(State(state): State<ApiState>) -> Result<Json<NamespacesResponse>, ApiError> {
    let (namespaces, _store) = state.graph.namespaces().await?;
    Ok(Json(NamespacesResponse { namespaces }))
}

#[derive(Debug, Deserialize)]
pub struct PathRequest {
    pub source_id: String,
    pub target_id: String,
    #[serde(default = "default_max_depth")]
    pub max_depth: u8,
}

fn default_max_depth() -> u8 {
    3
}

#[derive(Debug, Serialize)]
pub struct PathResponse {
    pub path: Vec<Node>,
    pub edges: Vec<Edge>,
}

/// `POST /path` (§6): shortest path between two nodes via BFS over the edge table.
pub async fn path(State(state): State<ApiState>, Json(body): Json<PathRequest>) -> Result<Json<PathResponse>, ApiError> {
    let (found, _store) = state.graph.shortest_path(&body.source_id, &body.target_id, body.max_depth).await?;
    let (path, edges) = found.unwrap_or_default();
    Ok(Json(PathResponse { path, edges }))
}

#[derive(Debug, Deserialize)]
pub struct SimilarQuery {
    pub node_id: String,
    #[serde(default = "default_limit")]
    pub limit: usize,
}

#[derive(Debug, Serialize)]
pub struct SimilarEntry {
    pub id: String,
    pub score: f32,
}

#[derive(Debug, Serialize)]
pub struct SimilarResponse {
    pub similar: Vec<SimilarEntry>,
}

/// `GET /similar` (§6): nearest neighbors of one node's embedding within
/// its own namespace, ranked by cosine similarity.
pub async fn similar(State(state): State<ApiState>, Query(params): Query<SimilarQuery>) -> Result<Json<SimilarResponse>, ApiError> {
    let (target, _store) = state.graph.get_node(&params.node_id).await?;
    let target = target.ok_or_else(|| ApiError(GraphRagError::NotFound(format!("no such node: {}", params.node_id))))?;
    let Some(target_embedding) = target.embedding.clone().filter(|v| !v.is_empty()) else {
        return Ok(Json(SimilarResponse { similar: Vec::new() }));
    };

    let (nodes, _edges) = state.graph.all_nodes_and_edges(&target.namespace).await?;
    let mut scored: Vec<SimilarEntry> = nodes
        .iter()
        .filter(|node| node.id != target.id)
        .filter_map(|node| {
            let embedding = node.embedding.as_ref()?;
            if embedding.is_empty() {
                return None;
            }
            Some(SimilarEntry {
                id: node.id.clone(),
                score: cosine_similarity(&target_embedding, embedding),
            })
        })
        .collect();
    scored.sort_by(|a, b| b.score.partial_cmp(&a.score).unwrap_or(std::cmp::Ordering::Equal).then_with(|| a.id.cmp(&b.id)));
    scored.truncate(params.limit);

    Ok(Json(SimilarResponse { similar: scored }))
}
