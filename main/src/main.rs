use std::sync::Arc;

use api::{api_state::ApiState, graphrag_routes};
use axum::{extract::FromRef, Router};
use common::events::EventBus;
use common::utils::config::get_config;
use ingestion::run_worker_loop;
use tracing::{error, info};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const WORKER_POLL_INTERVAL: std::time::Duration = std::time::Duration::from_secs(5);

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = Arc::new(get_config()?);
    let events = Arc::new(EventBus::new(config.event_buffer));

    let api_state = ApiState::new(config.clone(), events).await?;

    let worker_db = api_state.db.clone();
    let worker_graph = api_state.graph.clone();
    let worker_pipeline = api_state.pipeline.clone();
    tokio::spawn(async move {
        info!("starting ingestion worker loop");
        if let Err(err) = run_worker_loop(worker_db, worker_graph, worker_pipeline, WORKER_POLL_INTERVAL).await {
            error!(%err, "ingestion worker loop exited");
        }
    });

    let app = Router::new()
        .nest("/graphrag", graphrag_routes(&api_state))
        .with_state(AppState { api_state });

    let serve_address = format!("0.0.0.0:{}", config.http_port);
    info!(address = %serve_address, "starting graphrag server");
    let listener = tokio::net::TcpListener::bind(serve_address).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

#[derive(Clone, FromRef)]
struct AppState {
    api_state: ApiState,
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::{
        body::Body,
        http::{Request, StatusCode},
    };
    use common::utils::config::{AppConfig, EmbeddingProviderKind};
    use tower::ServiceExt;
    use uuid::Uuid;

    fn smoke_test_config(namespace: &str, database: &str) -> AppConfig {
        AppConfig {
            openai_api_key: String::new(),
            embedding_provider: EmbeddingProviderKind::None,
            surrealdb_address: "mem://".into(),
            surrealdb_namespace: namespace.into(),
            surrealdb_database: database.into(),
            http_port: 0,
            ..Default::default()
        }
    }

    async fn build_test_app() -> Router {
        let namespace = "test_ns";
        let database = format!("test_db_{}", Uuid::new_v4());
        let config = Arc::new(smoke_test_config(namespace, &database));
        let events = Arc::new(EventBus::new(config.event_buffer));

        let api_state = ApiState::new(config, events).await.expect("failed to build api state");

        Router::new()
            .nest("/graphrag", graphrag_routes(&api_state))
            .with_state(AppState { api_state })
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn live_and_ready_report_ok() {
        let app = build_test_app().await;

        let live = app
            .clone()
            .oneshot(Request::builder().uri("/graphrag/live").body(Body::empty()).expect("request"))
            .await
            .expect("live response");
        assert_eq!(live.status(), StatusCode::OK);

        let ready = app
            .oneshot(Request::builder().uri("/graphrag/ready").body(Body::empty()).expect("request"))
            .await
            .expect("ready response");
        assert_eq!(ready.status(), StatusCode::OK);
    }
}
