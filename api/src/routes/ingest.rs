use axum::extract::{Multipart, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::Map;

use common::error::GraphRagError;
use common::storage::types::ingestion_task::{IngestionDocument, IngestionTask};

use crate::{api_state::ApiState, error::ApiError};

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub doc_id: String,
    pub text: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default)]
    pub metadata: Map<String, serde_json::Value>,
    #[serde(default)]
    pub force_heuristic: bool,
    #[serde(default)]
    pub disable_embeddings: bool,
}

fn default_namespace() -> String {
    "public".to_string()
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub status: String,
    pub nodes_created: usize,
    pub edges_created: usize,
    pub chunks: usize,
    pub extraction_mode: String,
}

fn validate_size(text: &str, max_bytes: usize) -> Result<(), ApiError> {
    if text.len() > max_bytes {
        return Err(ApiError(GraphRagError::Validation(format!(
            "document text exceeds {max_bytes} bytes"
        ))));
    }
    Ok(())
}

async fn run_ingest(state: &ApiState, request: IngestRequest) -> Result<IngestResponse, ApiError> {
    validate_size(&request.text, state.config.ingest_max_content_bytes)?;

    let document = IngestionDocument {
        doc_id: request.doc_id,
        namespace: request.namespace,
        text: request.text,
        metadata: request.metadata,
        force_heuristic: request.force_heuristic,
        disable_embeddings: request.disable_embeddings,
    };
    let task = IngestionTask::create_and_add_to_db(document, &state.db).await?;
    let outcome = state.pipeline.process_task(&state.db, &state.graph, task).await?;

    Ok(IngestResponse {
        status: outcome.status,
        nodes_created: outcome.nodes_created,
        edges_created: outcome.edges_created,
        chunks: outcome.chunks,
        extraction_mode: outcome.extraction_mode,
    })
}

/// `POST /ingest` (spec.md §6): runs one document through the pipeline
/// synchronously and returns its outcome counters.
pub async fn ingest(State(state): State<ApiState>, Json(request): Json<IngestRequest>) -> Result<Json<IngestResponse>, ApiError> {
    Ok(Json(run_ingest(&state, request).await?))
}

/// `POST /ingest-file`: same contract as `/ingest`, sourced from a
/// multipart upload (`doc_id`, `text`, optional `namespace`/`metadata`
/// fields) instead of a JSON body.
pub async fn ingest_file(State(state): State<ApiState>, mut multipart: Multipart) -> Result<Json<IngestResponse>, ApiError> {
    let mut doc_id = None;
    let mut text = None;
    let mut namespace = default_namespace();
    let mut metadata = Map::new();
    let mut force_heuristic = false;
    let mut disable_embeddings = false;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|err| ApiError(GraphRagError::Validation(err.to_string())))?
    {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "doc_id" => doc_id = Some(field.text().await.unwrap_or_default()),
            "namespace" => namespace = field.text().await.unwrap_or_default(),
            "force_heuristic" => force_heuristic = field.text().await.unwrap_or_default() == "true",
            "disable_embeddings" => disable_embeddings = field.text().await.unwrap_or_default() == "true",
            "metadata" => {
                let raw = field.text().await.unwrap_or_default();
                if let Ok(serde_json::Value::Object(map)) = serde_json::from_str(&raw) {
                    metadata = map;
                }
            }
            "text" | "file" => {
                let bytes = field
                    .bytes()
                    .await
                    .map_err(|err| ApiError(GraphRagError::Validation(err.to_string())))?;
                text = Some(String::from_utf8_lossy(&bytes).into_owned());
            }
            _ => {}
        }
    }

    let doc_id = doc_id.ok_or_else(|| ApiError(GraphRagError::Validation("missing doc_id field".to_string())))?;
    let text = text.ok_or_else(|| ApiError(GraphRagError::Validation("missing text/file field".to_string())))?;

    let request = IngestRequest {
        doc_id,
        text,
        namespace,
        metadata,
        force_heuristic,
        disable_embeddings,
    };
    Ok(Json(run_ingest(&state, request).await?))
}

#[derive(Debug, Deserialize)]
pub struct IngestBatchRequest {
    pub documents: Vec<IngestRequest>,
}

#[derive(Debug, Default, Serialize)]
pub struct IngestBatchResponse {
    pub documents: usize,
    pub nodes_created: usize,
    pub edges_created: usize,
    pub chunks: usize,
    pub noop: usize,
    pub failed: usize,
}

/// `POST /ingest-batch` (§6): runs up to `ingest_batch_max_docs` documents
/// through the pipeline and aggregates their counters. A single
/// document's failure doesn't abort the rest of the batch.
pub async fn ingest_batch(
    State(state): State<ApiState>,
    Json(request): Json<IngestBatchRequest>,
) -> Result<Json<IngestBatchResponse>, ApiError> {
    if request.documents.len() > state.config.ingest_batch_max_docs {
        return Err(ApiError(GraphRagError::Validation(format!(
            "batch exceeds {} documents",
            state.config.ingest_batch_max_docs
        ))));
    }

    let mut response = IngestBatchResponse {
        documents: request.documents.len(),
        ..IngestBatchResponse::default()
    };

    for document in request.documents {
        match run_ingest(&state, document).await {
            Ok(outcome) => {
                response.nodes_created += outcome.nodes_created;
                response.edges_created += outcome.edges_created;
                response.chunks += outcome.chunks;
                if outcome.status == "noop" {
                    response.noop += 1;
                }
            }
            Err(_) => response.failed += 1,
        }
    }

    Ok(Json(response))
}
