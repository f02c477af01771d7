use config::{Config, ConfigError, Environment, File};
use serde::Deserialize;

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum GraphStoreBackend {
    #[default]
    Sqlite,
    Neo4j,
}

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum IngestMode {
    Legacy,
    #[default]
    Graphrag,
}

#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingProviderKind {
    #[default]
    Openai,
    Fastembed,
    None,
}

/// Backend for orchestrator run-directory artifacts (§4.9).
#[derive(Clone, Copy, Deserialize, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "lowercase")]
pub enum StorageKind {
    #[default]
    Local,
    Memory,
}

/// Per-mode structural rerank weights, `(w_sim, w_deg, w_cent, w_lex)`.
#[derive(Clone, Copy, Deserialize, Debug, PartialEq)]
pub struct ModeWeights {
    pub sim: f32,
    pub deg: f32,
    pub cent: f32,
    pub lex: f32,
}

#[derive(Clone, Deserialize, Debug)]
pub struct RetrievalWeightsConfig {
    #[serde(default = "default_local_weights")]
    pub local: ModeWeights,
    #[serde(default = "default_global_weights")]
    pub global: ModeWeights,
    #[serde(default = "default_drift_weights")]
    pub drift: ModeWeights,
    #[serde(default = "default_auto_threshold")]
    pub auto_threshold: f32,
}

impl Default for RetrievalWeightsConfig {
    fn default() -> Self {
        Self {
            local: default_local_weights(),
            global: default_global_weights(),
            drift: default_drift_weights(),
            auto_threshold: default_auto_threshold(),
        }
    }
}

fn default_local_weights() -> ModeWeights {
    ModeWeights {
        sim: 0.60,
        deg: 0.10,
        cent: 0.10,
        lex: 0.20,
    }
}

fn default_global_weights() -> ModeWeights {
    ModeWeights {
        sim: 0.30,
        deg: 0.25,
        cent: 0.30,
        lex: 0.15,
    }
}

fn default_drift_weights() -> ModeWeights {
    ModeWeights {
        sim: 0.40,
        deg: 0.10,
        cent: 0.30,
        lex: 0.20,
    }
}

fn default_auto_threshold() -> f32 {
    0.35
}

/// Tunables for the C8 analytics recompute (§4.8).
#[derive(Clone, Copy, Deserialize, Debug, PartialEq)]
pub struct AnalyticsConfig {
    #[serde(default = "default_betweenness_exact_max_nodes")]
    pub betweenness_exact_max_nodes: usize,
    #[serde(default = "default_pagerank_damping")]
    pub pagerank_damping: f64,
    #[serde(default = "default_pagerank_max_iterations")]
    pub pagerank_max_iterations: usize,
    #[serde(default = "default_pagerank_epsilon")]
    pub pagerank_epsilon: f64,
    #[serde(default = "default_recompute_threshold")]
    pub recompute_threshold: f64,
    #[serde(default = "default_cluster_top_terms")]
    pub cluster_top_terms: usize,
    #[serde(default = "default_cluster_sample_entities")]
    pub cluster_sample_entities: usize,
    #[serde(default = "default_summary_daily_token_budget")]
    pub summary_daily_token_budget: u64,
}

impl Default for AnalyticsConfig {
    fn default() -> Self {
        Self {
            betweenness_exact_max_nodes: default_betweenness_exact_max_nodes(),
            pagerank_damping: default_pagerank_damping(),
            pagerank_max_iterations: default_pagerank_max_iterations(),
            pagerank_epsilon: default_pagerank_epsilon(),
            recompute_threshold: default_recompute_threshold(),
            cluster_top_terms: default_cluster_top_terms(),
            cluster_sample_entities: default_cluster_sample_entities(),
            summary_daily_token_budget: default_summary_daily_token_budget(),
        }
    }
}

fn default_betweenness_exact_max_nodes() -> usize {
    5000
}
fn default_pagerank_damping() -> f64 {
    0.85
}
fn default_pagerank_max_iterations() -> usize {
    100
}
fn default_pagerank_epsilon() -> f64 {
    1e-6
}
fn default_recompute_threshold() -> f64 {
    0.10
}
fn default_cluster_top_terms() -> usize {
    8
}
fn default_cluster_sample_entities() -> usize {
    10
}
fn default_summary_daily_token_budget() -> u64 {
    50_000
}

#[derive(Clone, Deserialize, Debug)]
pub struct AppConfig {
    #[serde(default = "default_true")]
    pub enable_graphrag: bool,
    #[serde(default)]
    pub graph_store: GraphStoreBackend,
    #[serde(default)]
    pub default_ingest_mode: IngestMode,
    #[serde(default)]
    pub embedding_provider: EmbeddingProviderKind,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default)]
    pub graphrag_api_key: Option<String>,
    #[serde(default)]
    pub llm_provider_key: Option<String>,
    #[serde(default = "default_openai_api_key")]
    pub openai_api_key: String,

    #[serde(default = "default_surrealdb_address")]
    pub surrealdb_address: String,
    #[serde(default = "default_surrealdb_username")]
    pub surrealdb_username: String,
    #[serde(default = "default_surrealdb_password")]
    pub surrealdb_password: String,
    #[serde(default = "default_surrealdb_namespace")]
    pub surrealdb_namespace: String,
    #[serde(default = "default_surrealdb_database")]
    pub surrealdb_database: String,
    /// Set when a graph-DB backend address is also configured; absence
    /// means the embedded store is the only backend (no fallback needed).
    #[serde(default)]
    pub graph_backend_address: Option<String>,

    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    #[serde(default = "default_base_url")]
    pub openai_base_url: String,

    #[serde(default = "default_retention_k")]
    pub retention_k: usize,
    #[serde(default = "default_mentioned_in_cap_embedded")]
    pub mentioned_in_cap_embedded: usize,
    #[serde(default = "default_mentioned_in_cap_graph")]
    pub mentioned_in_cap_graph: usize,

    #[serde(default = "default_llm_timeout_secs")]
    pub llm_timeout_secs: u64,
    #[serde(default = "default_embedding_timeout_secs")]
    pub embedding_timeout_secs: u64,
    #[serde(default = "default_storage_timeout_secs")]
    pub storage_timeout_secs: u64,

    #[serde(default = "default_bulk_upsert_chunk")]
    pub bulk_upsert_chunk: usize,
    #[serde(default = "default_event_buffer")]
    pub event_buffer: usize,

    #[serde(default)]
    pub retrieval_weights: RetrievalWeightsConfig,

    #[serde(default = "default_ingest_max_files")]
    pub ingest_max_files: usize,
    #[serde(default = "default_ingest_max_content_bytes")]
    pub ingest_max_content_bytes: usize,
    #[serde(default = "default_ingest_max_context_bytes")]
    pub ingest_max_context_bytes: usize,
    #[serde(default = "default_ingest_max_category_bytes")]
    pub ingest_max_category_bytes: usize,
    #[serde(default = "default_ingest_batch_max_docs")]
    pub ingest_batch_max_docs: usize,

    #[serde(default)]
    pub storage: StorageKind,

    #[serde(default)]
    pub analytics: AnalyticsConfig,
}

fn default_true() -> bool {
    true
}
fn default_openai_api_key() -> String {
    String::new()
}
fn default_embedding_model() -> String {
    "text-embedding-3-small".to_string()
}
fn default_surrealdb_address() -> String {
    "mem://".to_string()
}
fn default_surrealdb_username() -> String {
    "root".to_string()
}
fn default_surrealdb_password() -> String {
    "root".to_string()
}
fn default_surrealdb_namespace() -> String {
    "graphrag".to_string()
}
fn default_surrealdb_database() -> String {
    "graphrag".to_string()
}
fn default_data_dir() -> String {
    "./data".to_string()
}
fn default_http_port() -> u16 {
    8080
}
fn default_base_url() -> String {
    "https://api.openai.com/v1".to_string()
}
fn default_retention_k() -> usize {
    7
}
fn default_mentioned_in_cap_embedded() -> usize {
    10
}
fn default_mentioned_in_cap_graph() -> usize {
    5
}
fn default_llm_timeout_secs() -> u64 {
    30
}
fn default_embedding_timeout_secs() -> u64 {
    15
}
fn default_storage_timeout_secs() -> u64 {
    5
}
fn default_bulk_upsert_chunk() -> usize {
    500
}
fn default_event_buffer() -> usize {
    1000
}
fn default_ingest_max_files() -> usize {
    20
}
fn default_ingest_max_content_bytes() -> usize {
    5_000_000
}
fn default_ingest_max_context_bytes() -> usize {
    10_000
}
fn default_ingest_max_category_bytes() -> usize {
    256
}
fn default_ingest_batch_max_docs() -> usize {
    100
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            enable_graphrag: default_true(),
            graph_store: GraphStoreBackend::default(),
            default_ingest_mode: IngestMode::default(),
            embedding_provider: EmbeddingProviderKind::default(),
            embedding_model: default_embedding_model(),
            graphrag_api_key: None,
            llm_provider_key: None,
            openai_api_key: default_openai_api_key(),
            surrealdb_address: default_surrealdb_address(),
            surrealdb_username: default_surrealdb_username(),
            surrealdb_password: default_surrealdb_password(),
            surrealdb_namespace: default_surrealdb_namespace(),
            surrealdb_database: default_surrealdb_database(),
            graph_backend_address: None,
            data_dir: default_data_dir(),
            http_port: default_http_port(),
            openai_base_url: default_base_url(),
            retention_k: default_retention_k(),
            mentioned_in_cap_embedded: default_mentioned_in_cap_embedded(),
            mentioned_in_cap_graph: default_mentioned_in_cap_graph(),
            llm_timeout_secs: default_llm_timeout_secs(),
            embedding_timeout_secs: default_embedding_timeout_secs(),
            storage_timeout_secs: default_storage_timeout_secs(),
            bulk_upsert_chunk: default_bulk_upsert_chunk(),
            event_buffer: default_event_buffer(),
            retrieval_weights: RetrievalWeightsConfig::default(),
            ingest_max_files: default_ingest_max_files(),
            ingest_max_content_bytes: default_ingest_max_content_bytes(),
            ingest_max_context_bytes: default_ingest_max_context_bytes(),
            ingest_max_category_bytes: default_ingest_max_category_bytes(),
            ingest_batch_max_docs: default_ingest_batch_max_docs(),
            storage: StorageKind::default(),
            analytics: AnalyticsConfig::default(),
        }
    }
}

pub fn get_config() -> Result<AppConfig, ConfigError> {
    let config = Config::builder()
        .add_source(File::with_name("config").required(false))
        .add_source(Environment::default().separator("__"))
        .build()?;

    config.try_deserialize()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let config = AppConfig::default();
        assert_eq!(config.retention_k, 7);
        assert_eq!(config.mentioned_in_cap_embedded, 10);
        assert_eq!(config.mentioned_in_cap_graph, 5);
        assert_eq!(config.bulk_upsert_chunk, 500);
        assert_eq!(config.event_buffer, 1000);
        assert!((config.retrieval_weights.auto_threshold - 0.35).abs() < f32::EPSILON);
        assert_eq!(config.retrieval_weights.local.sim, 0.60);
        assert_eq!(config.retrieval_weights.global.cent, 0.30);
    }
}
