use axum::extract::{Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};

use common::error::GraphRagError;
use common::storage::types::node::Node;
use common::storage::types::snapshot::{diff, Snapshot, SnapshotDiff};
use orchestrator::snapshot::build_snapshot;

use crate::{api_state::ApiState, error::ApiError};

fn default_namespace() -> String {
    "public".to_string()
}

#[derive(Debug, Deserialize)]
pub struct SnapshotsQuery {
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

#[derive(Debug, Serialize)]
pub struct SnapshotsResponse {
    pub snapshots: Vec<Snapshot>,
}

/// `GET /snapshots` (§4.10 C10): stored point-in-time captures for a namespace.
pub async fn list_snapshots(State(state): State<ApiState>, Query(params): Query<SnapshotsQuery>) -> Result<Json<SnapshotsResponse>, ApiError> {
    let snapshots: Vec<Snapshot> = state
        .db
        .client
        .query("SELECT * FROM snapshot WHERE namespace = $namespace ORDER BY created_at DESC")
        .bind(("namespace", params.namespace))
        .await
        .map_err(GraphRagError::from)?
        .take(0)
        .map_err(GraphRagError::from)?;
    Ok(Json(SnapshotsResponse { snapshots }))
}

#[derive(Debug, Deserialize)]
pub struct CreateSnapshotRequest {
    #[serde(default = "default_namespace")]
    pub namespace: String,
}

/// `POST /snapshots` (§4.10): captures the namespace's current node/edge/
/// community id sets, carrying forward the last analytics modularity.
pub async fn create_snapshot(State(state): State<ApiState>, Json(body): Json<CreateSnapshotRequest>) -> Result<Json<Snapshot>, ApiError> {
    let modularity = latest_modularity(&state, &body.namespace).await?;
    let snapshot = build_snapshot(&state.graph, &state.db, &body.namespace, modularity).await?;
    let _: Option<Snapshot> = state
        .db
        .client
        .create(("snapshot", snapshot.id.as_str()))
        .content(snapshot.clone())
        .await
        .map_err(GraphRagError::from)?;
    Ok(Json(snapshot))
}

async fn latest_modularity(state: &ApiState, namespace: &str) -> Result<f64, ApiError> {
    let snapshots: Vec<Snapshot> = state
        .db
        .client
        .query("SELECT * FROM snapshot WHERE namespace = $namespace ORDER BY created_at DESC LIMIT 1")
        .bind(("namespace", namespace.to_string()))
        .await
        .map_err(GraphRagError::from)?
        .take(0)
        .map_err(GraphRagError::from)?;
    Ok(snapshots.into_iter().next().map_or(0.0, |snapshot| snapshot.aggregates.modularity))
}

#[derive(Debug, Deserialize)]
pub struct SnapshotDiffQuery {
    pub a: String,
    pub b: String,
}

/// `GET /snapshots/diff` (§4.10): pure structural/community diff between two stored snapshots.
pub async fn diff_snapshots(State(state): State<ApiState>, Query(params): Query<SnapshotDiffQuery>) -> Result<Json<SnapshotDiff>, ApiError> {
    let a: Option<Snapshot> = state.db.get_item(&params.a).await.map_err(GraphRagError::from)?;
    let b: Option<Snapshot> = state.db.get_item(&params.b).await.map_err(GraphRagError::from)?;
    let a = a.ok_or_else(|| ApiError(GraphRagError::NotFound(format!("no such snapshot: {}", params.a))))?;
    let b = b.ok_or_else(|| ApiError(GraphRagError::NotFound(format!("no such snapshot: {}", params.b))))?;
    Ok(Json(diff(&a, &b)))
}

#[derive(Debug, Deserialize)]
pub struct ProvenanceQuery {
    pub node_id: String,
}

#[derive(Debug, Serialize)]
pub struct ProvenanceResponse {
    pub neighbors: Vec<Node>,
    pub chunks: Vec<Node>,
}

/// `GET /provenance` (§6): the sources a node is grounded in, i.e. its
/// direct neighborhood split into chunk nodes vs. everything else.
pub async fn provenance(State(state): State<ApiState>, Query(params): Query<ProvenanceQuery>) -> Result<Json<ProvenanceResponse>, ApiError> {
    let found = state.graph.neighbors(&params.node_id, 1).await?;
    let (chunks, neighbors) = found
        .nodes
        .into_iter()
        .partition(|node| node.label == common::storage::types::node::NodeLabel::Chunk);
    Ok(Json(ProvenanceResponse { neighbors, chunks }))
}
