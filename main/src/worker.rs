use std::sync::Arc;
use std::time::Duration;

use async_openai::config::OpenAIConfig;
use async_openai::Client;
use common::storage::db::{GraphStore, SurrealDbClient};
use common::utils::config::get_config;
use common::utils::embedding::{provider_from_config, EmbeddingProvider};
use ingestion::pipeline::DefaultPipelineServices;
use ingestion::{run_worker_loop, IngestionConfig, IngestionPipeline};
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

const POLL_INTERVAL: Duration = Duration::from_secs(5);
const CHAT_MODEL: &str = "gpt-4o-mini";

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    tracing_subscriber::registry()
        .with(fmt::layer())
        .with(EnvFilter::from_default_env())
        .try_init()
        .ok();

    let config = get_config()?;

    let db = Arc::new(
        SurrealDbClient::new(
            &config.surrealdb_address,
            &config.surrealdb_username,
            &config.surrealdb_password,
            &config.surrealdb_namespace,
            &config.surrealdb_database,
        )
        .await?,
    );

    let graph = Arc::new(GraphStore::connect(&config).await?);

    let openai_config = OpenAIConfig::new()
        .with_api_key(config.openai_api_key.clone())
        .with_api_base(config.openai_base_url.clone());
    let openai_client = Client::with_config(openai_config);
    let llm_client = if config.openai_api_key.is_empty() { None } else { Some(openai_client.clone()) };

    let embedding_provider: Arc<dyn EmbeddingProvider> = Arc::from(provider_from_config(&config, openai_client).await?);
    graph.ensure_initialized(embedding_provider.dimension()).await?;

    let services = Arc::new(DefaultPipelineServices::new(llm_client, CHAT_MODEL, embedding_provider));
    let pipeline_config = IngestionConfig {
        graph_backend_configured: config.graph_backend_address.is_some(),
        ..IngestionConfig::default()
    };
    let pipeline = Arc::new(IngestionPipeline::with_services(services, pipeline_config, None));

    run_worker_loop(db, graph, pipeline, POLL_INTERVAL).await
}
