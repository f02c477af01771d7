use axum::extract::State;
use axum::Json;
use serde::{Deserialize, Serialize};

use common::storage::types::node::NodeLabel;
use retrieval::answer::{synthesize_answer, AnswerRequest, AnswerResult};
use retrieval::{query, RetrieveFilters, RetrieveRequest, RetrieveResponse, RetrievalMode};

use crate::{api_state::ApiState, error::ApiError};

const ANSWER_BUDGET_TOKENS: usize = 2000;

#[derive(Debug, Deserialize)]
pub struct QueryRequest {
    pub query: String,
    #[serde(default = "default_namespace")]
    pub namespace: String,
    #[serde(default = "default_top_k")]
    pub top_k: usize,
    #[serde(default = "default_mode")]
    pub mode: RetrievalMode,
    #[serde(default)]
    pub filters: QueryFilters,
}

#[derive(Debug, Default, Deserialize)]
pub struct QueryFilters {
    pub labels: Option<Vec<NodeLabel>>,
    pub relations: Option<Vec<String>>,
}

fn default_mode() -> RetrievalMode {
    RetrievalMode::Auto
}

fn default_namespace() -> String {
    "public".to_string()
}

fn default_top_k() -> usize {
    10
}

fn build_request(body: QueryRequest) -> RetrieveRequest {
    RetrieveRequest {
        question: body.query,
        namespace: body.namespace,
        mode: body.mode,
        top_k: body.top_k,
        filters: RetrieveFilters {
            labels: body.filters.labels,
            relations: body.filters.relations,
        },
    }
}

/// `POST /query` (§6 C6): dispatches to the hybrid ranking pipeline.
pub async fn query_handler(State(state): State<ApiState>, Json(body): Json<QueryRequest>) -> Result<Json<RetrieveResponse>, ApiError> {
    let request = build_request(body);
    let response = query(
        &state.graph,
        Some(&state.embedding_provider),
        &state.config.retrieval_weights,
        &state.retrieval_tuning,
        request,
    )
    .await?;
    Ok(Json(response))
}

#[derive(Debug, Serialize)]
pub struct AnswerResponse {
    pub answer_text: String,
    pub contributing_node_ids: Vec<String>,
    pub retrieval: RetrieveResponse,
}

/// `POST /answer` (§6 C7): retrieves then synthesizes a grounded answer.
/// Behind the `x-api-key` gate when configured (§6 Auth).
pub async fn answer_handler(State(state): State<ApiState>, Json(body): Json<QueryRequest>) -> Result<Json<AnswerResponse>, ApiError> {
    let question = body.query.clone();
    let request = build_request(body);
    let retrieval = query(
        &state.graph,
        Some(&state.embedding_provider),
        &state.config.retrieval_weights,
        &state.retrieval_tuning,
        request,
    )
    .await?;

    let AnswerResult {
        answer_text,
        contributing_node_ids,
        ..
    } = synthesize_answer(
        state.llm_client.as_ref(),
        crate::api_state::CHAT_MODEL,
        AnswerRequest {
            question,
            passages: retrieval.passages.clone(),
            budget_tokens: ANSWER_BUDGET_TOKENS,
        },
    )
    .await;

    Ok(Json(AnswerResponse {
        answer_text,
        contributing_node_ids,
        retrieval,
    }))
}
