use axum::{
    extract::{Request, State},
    middleware::Next,
    response::Response,
};

use common::error::GraphRagError;

use crate::{api_state::ApiState, error::ApiError};

/// Shared-secret gate for mutating endpoints and `/answer`. A no-op when
/// `graphrag_api_key` isn't configured.
pub async fn api_auth(State(state): State<ApiState>, request: Request, next: Next) -> Result<Response, ApiError> {
    let Some(expected) = state.config.graphrag_api_key.as_deref().filter(|key| !key.is_empty()) else {
        return Ok(next.run(request).await);
    };

    let presented = extract_api_key(&request);
    if presented.as_deref() != Some(expected) {
        return Err(ApiError(GraphRagError::Validation("missing or invalid x-api-key".to_string())));
    }

    Ok(next.run(request).await)
}

fn extract_api_key(request: &Request) -> Option<String> {
    request
        .headers()
        .get("x-api-key")
        .and_then(|value| value.to_str().ok())
        .map(String::from)
}
