use axum::{
    extract::FromRef,
    middleware::from_fn_with_state,
    routing::{get, post},
    Router,
};

use middleware_api_auth::api_auth;
use routes::{analytics_routes, graph, ingest, liveness, readiness, retrieval, snapshots, stream};

pub mod api_state;
pub mod error;
mod middleware_api_auth;
mod routes;

use api_state::ApiState;

/// Router for `/graphrag` (spec.md §6). Probes are public; every mutating
/// endpoint plus `/answer` sits behind the optional `x-api-key` gate.
pub fn graphrag_routes<S>(app_state: &ApiState) -> Router<S>
where
    S: Clone + Send + Sync + 'static,
    ApiState: FromRef<S>,
{
    let public = Router::new()
        .route("/live", get(liveness::live))
        .route("/ready", get(readiness::ready))
        .route("/query", post(retrieval::query_handler))
        .route("/graph", get(graph::get_graph))
        .route("/nodes", get(graph::list_nodes))
        .route("/edges", get(graph::list_edges))
        .route("/neighbors/{node_id}", get(graph::get_neighbors))
        .route("/search", get(graph::search))
        .route("/stats", get(graph::stats))
        .route("/namespaces", get(graph::namespaces))
        .route("/path", post(graph::path))
        .route("/similar", get(graph::similar))
        .route("/cluster", get(analytics_routes::list_clusters))
        .route("/cluster/summaries", get(analytics_routes::get_cluster_summaries))
        .route("/metrics", get(analytics_routes::metrics))
        .route("/metrics/extended", get(analytics_routes::metrics_extended))
        .route("/snapshots", get(snapshots::list_snapshots))
        .route("/snapshots/diff", get(snapshots::diff_snapshots))
        .route("/provenance", get(snapshots::provenance))
        .route("/stream", get(stream::stream));

    let protected = Router::new()
        .route("/ingest", post(ingest::ingest))
        .route("/ingest-file", post(ingest::ingest_file))
        .route("/ingest-batch", post(ingest::ingest_batch))
        .route("/answer", post(retrieval::answer_handler))
        .route("/centrality/recompute", post(analytics_routes::recompute_centrality))
        .route("/layout/recompute", post(analytics_routes::recompute_layout))
        .route("/cluster/summarize", post(analytics_routes::summarize_clusters))
        .route("/index/run", post(analytics_routes::index_run))
        .route("/snapshots", post(snapshots::create_snapshot))
        .route_layer(from_fn_with_state(app_state.clone(), api_auth));

    public.merge(protected)
}
