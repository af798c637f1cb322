use alimtalk_agent::AgentError;
use axum::Json;
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Serialize;
use tracing::{error, warn};

#[derive(Debug, Serialize)]
pub struct ErrorBody {
    pub error: &'static str,
    pub message: String,
}

/// An [`AgentError`] rendered as a JSON error response.
#[derive(Debug)]
pub struct ApiError(pub AgentError);

impl From<AgentError> for ApiError {
    fn from(e: AgentError) -> Self {
        Self(e)
    }
}

impl ApiError {
    pub fn status(&self) -> StatusCode {
        match &self.0 {
            AgentError::Validation(_) => StatusCode::UNPROCESSABLE_ENTITY,
            AgentError::Generation(_)
            | AgentError::GenerationExhausted { .. }
            | AgentError::Classification(_) => StatusCode::BAD_GATEWAY,
            AgentError::Indexing(_) | AgentError::Retrieval(_) => StatusCode::SERVICE_UNAVAILABLE,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        if status.is_server_error() {
            error!(kind = self.0.kind(), error = %self.0, "request failed");
        } else {
            warn!(kind = self.0.kind(), error = %self.0, "request rejected");
        }
        let body = ErrorBody {
            error: self.0.kind(),
            message: self.0.to_string(),
        };
        (status, Json(body)).into_response()
    }
}
