use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;

/// The error taxonomy surfaced at the HTTP boundary. Executors and the
/// authorization kernel return this directly instead of a generic
/// `anyhow::Error` so the response code and envelope are determined by the
/// failure kind rather than by string sniffing at the edge.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("not authorized")]
    Unauthenticated,
    #[error("forbidden")]
    Forbidden,
    #[error("bad request: {0}")]
    BadRequest(String),
    #[error("not found")]
    NotFound,
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("upstream failure: {0}")]
    UpstreamFailure(String),
    #[error("store failure")]
    StoreFailure(#[from] anyhow::Error),
}

#[derive(Serialize)]
struct ErrorEnvelope {
    kind: &'static str,
    message: String,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match &self {
            ApiError::Unauthenticated => (StatusCode::FORBIDDEN, "Error", "Not authorized".to_string()),
            ApiError::Forbidden => (StatusCode::FORBIDDEN, "Error", "Not authorized".to_string()),
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "Error", msg.clone()),
            ApiError::NotFound => (StatusCode::NOT_FOUND, "Error", "not found".to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, "Error", msg.clone()),
            ApiError::UpstreamFailure(msg) => (StatusCode::INTERNAL_SERVER_ERROR, "Error", msg.clone()),
            ApiError::StoreFailure(err) => {
                tracing::error!(error = ?err, "store failure");
                (StatusCode::INTERNAL_SERVER_ERROR, "Error", "internal store failure".to_string())
            }
        };
        (status, Json(ErrorEnvelope { kind, message })).into_response()
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
