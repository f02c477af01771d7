use std::sync::Arc;

use api::{api_state::ApiState, graphrag_routes};
use axum::{extract::FromRef, Router};
use common::events::EventBus;
use common::utils::config::get_config;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

#[tokio::main(flavor = "multi_thread", worker_threads = 2)]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = Arc::new(get_config()?);
    let events = Arc::new(EventBus::new(config.event_buffer));

    let api_state = ApiState::new(config.clone(), events).await?;

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
