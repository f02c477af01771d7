use axum::{http::StatusCode, response::IntoResponse, response::Response, Json};
use common::error::{ErrorKind, GraphRagError};
use serde::Serialize;
use serde_json::Value;

/// Wraps [`GraphRagError`] for the `{error: {code, message, details?}}`
/// envelope (spec.md §7). `BackendUnavailable`/`ProviderFailure` still
/// carry a `GraphRagError` (they surface as HTTP 200 with a populated
/// `error` field, not a rejected response).
#[derive(Debug)]
pub struct ApiError(pub GraphRagError);

impl From<GraphRagError> for ApiError {
    fn from(err: GraphRagError) -> Self {
        Self(err)
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorPayload,
}

#[derive(Serialize)]
struct ErrorPayload {
    code: ErrorKind,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let kind = self.0.kind();
        let status = StatusCode::from_u16(kind.status_code()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
        if status.is_server_error() {
            tracing::error!(error = %self.0, ?kind, "request failed");
        } else {
            tracing::warn!(error = %self.0, ?kind, "request rejected");
        }

        let body = ErrorBody {
            error: ErrorPayload {
                code: kind,
                message: self.0.to_string(),
                details: None,
            },
        };
        (status, Json(body)).into_response()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn validation_errors_map_to_bad_request() {
        let response = ApiError(GraphRagError::Validation("bad input".into())).into_response();
        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn backend_unavailable_degrades_to_200() {
        let response = ApiError(GraphRagError::BackendUnavailable("fallback used".into())).into_response();
        assert_eq!(response.status(), StatusCode::OK);
    }

    #[test]
    fn not_found_maps_to_404() {
        let response = ApiError(GraphRagError::NotFound("no such node".into())).into_response();
        assert_eq!(response.status(), StatusCode::NOT_FOUND);
    }
}
