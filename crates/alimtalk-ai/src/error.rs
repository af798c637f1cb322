use thiserror::Error;

#[derive(Debug, Error)]
pub enum AiError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("server returned {status}: {body}")]
    Server { status: u16, body: String },

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("empty response: {0}")]
    EmptyResponse(&'static str),

    #[error("backend does not support {0}")]
    Unsupported(&'static str),

    #[error("model error: {0}")]
    Model(String),
}
