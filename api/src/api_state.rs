use std::sync::Arc;

use async_openai::config::OpenAIConfig;
use async_openai::Client;

use analytics::DailyTokenBudget;
use common::error::GraphRagError;
use common::events::EventBus;
use common::storage::db::{GraphStore, SurrealDbClient};
use common::storage::store::StorageManager;
use common::utils::config::AppConfig;
use common::utils::embedding::{provider_from_config, EmbeddingProvider};
use ingestion::pipeline::DefaultPipelineServices;
use ingestion::{IngestionConfig, IngestionPipeline};
use orchestrator::Orchestrator;
use retrieval::RetrievalTuning;

/// Chat/extraction model. Nothing in [`AppConfig`] names one (its
/// configuration surface only covers the embedding model), so this mirrors
/// the literal the ingestion and orchestrator test helpers already use.
pub(crate) const CHAT_MODEL: &str = "gpt-4o-mini";

/// Everything a route handler needs, built once at startup and cloned into
/// each request via axum's `State` extractor.
#[derive(Clone)]
pub struct ApiState {
    /// Raw connection for job-queue records (ingest logs, run records,
    /// clusters, snapshots) that are written directly, not through
    /// [`GraphStore`]. Always the embedded/primary address, even when
    /// `graph_backend_address` points graph reads/writes elsewhere.
    pub db: Arc<SurrealDbClient>,
    pub graph: Arc<GraphStore>,
    pub storage: Arc<StorageManager>,
    pub pipeline: Arc<IngestionPipeline>,
    pub orchestrator: Arc<Orchestrator>,
    pub events: Arc<EventBus>,
    pub config: Arc<AppConfig>,
    pub embedding_provider: Arc<dyn EmbeddingProvider>,
    pub llm_client: Option<Client<OpenAIConfig>>,
    pub summary_budget: Arc<DailyTokenBudget>,
    pub retrieval_tuning: Arc<RetrievalTuning>,
}

impl ApiState {
    pub async fn new(config: Arc<AppConfig>, events: Arc<EventBus>) -> Result<Self, GraphRagError> {
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
        let llm_client = if config.openai_api_key.is_empty() {
            None
        } else {
            Some(openai_client.clone())
        };

        let embedding_provider: Arc<dyn EmbeddingProvider> = Arc::from(provider_from_config(&config, openai_client).await?);
        graph.ensure_initialized(embedding_provider.dimension()).await?;

        let services = Arc::new(DefaultPipelineServices::new(
            llm_client.clone(),
            CHAT_MODEL,
            embedding_provider.clone(),
        ));
        let pipeline_config = IngestionConfig {
            graph_backend_configured: config.graph_backend_address.is_some(),
            ..IngestionConfig::default()
        };
        let pipeline = Arc::new(IngestionPipeline::with_services(services, pipeline_config, Some(events.clone())));

        let storage = Arc::new(
            StorageManager::new(&config)
                .await
                .map_err(|err| GraphRagError::Fatal(err.to_string()))?,
        );

        let orchestrator = Arc::new(Orchestrator::new(
            db.clone(),
            graph.clone(),
            pipeline.clone(),
            storage.clone(),
            config.clone(),
        ));

        let summary_budget = Arc::new(DailyTokenBudget::new(config.analytics.summary_daily_token_budget));

        Ok(Self {
            db,
            graph,
            storage,
            pipeline,
            orchestrator,
            events,
            config,
            embedding_provider,
            llm_client,
            summary_budget,
            retrieval_tuning: Arc::new(RetrievalTuning::default()),
        })
    }
}
