//! HTTP API.
//!
//! - `POST /template/template` drafts or revises a template.
//! - `POST /validate/validate` predicts whether a template would be approved.
//! - `GET /health` reports liveness and the indexed passage count.

use std::net::SocketAddr;
use std::sync::Arc;

use alimtalk_agent::{AgentError, Resources};
use alimtalk_core::{
    TemplateRequest, TemplateResponse, ValidateRequest, ValidateResponse,
};
use axum::extract::State;
use axum::response::Redirect;
use axum::routing::{get, post};
use axum::{Json, Router};
use serde::Serialize;
use tracing::info;

mod error;
pub use error::{ApiError, ErrorBody};

#[derive(Clone)]
pub struct AppState {
    resources: Arc<Resources>,
}

pub fn router(resources: Arc<Resources>) -> Router {
    Router::new()
        .route("/", get(root))
        .route("/health", get(health))
        .route("/template/template", post(template))
        .route("/validate/validate", post(validate))
        .with_state(AppState { resources })
}

/// Bind and serve until the process is stopped.
pub async fn serve(addr: SocketAddr, resources: Arc<Resources>) -> std::io::Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!(addr = %addr, "listening");
    axum::serve(listener, router(resources)).await
}

async fn root() -> Redirect {
    Redirect::temporary("/health")
}

#[derive(Debug, Serialize)]
struct HealthResponse {
    status: &'static str,
    passages: Option<usize>,
}

async fn health(State(state): State<AppState>) -> Json<HealthResponse> {
    let passages = state.resources.indexer().count().await.ok();
    Json(HealthResponse {
        status: "ok",
        passages,
    })
}

async fn template(
    State(state): State<AppState>,
    Json(request): Json<TemplateRequest>,
) -> Result<Json<TemplateResponse>, ApiError> {
    info!(chars = request.user_input.chars().count(), "template request");
    let output = state.resources.orchestrator().run(&request).await?;
    Ok(Json(TemplateResponse {
        template: output.template,
        chat_response: output.chat_message,
    }))
}

async fn validate(
    State(state): State<AppState>,
    Json(request): Json<ValidateRequest>,
) -> Result<Json<ValidateResponse>, ApiError> {
    request.validate().map_err(AgentError::from)?;
    let result = state.resources.classifier().classify(&request.template).await?;
    let response = ValidateResponse::from(&result);
    info!(result = ?response.result, probability = %response.probability, "validate request");
    Ok(Json(response))
}

#[cfg(test)]
mod tests {
    use super::*;
    use alimtalk_agent::testing::{BagOfWords, FixedLogits, ScriptedBackend, StaticObjectStore};
    use alimtalk_agent::{ClassifierBackend, Collaborators, GeneratorKind, Settings, SourceLocation};
    use alimtalk_ai::GenerationBackend;
    use alimtalk_store::MemoryIndex;
    use axum::body::Body;
    use axum::http::{Request, StatusCode, header};
    use serde_json::{Value, json};
    use tower::ServiceExt;

    fn app(generation: Arc<dyn GenerationBackend>, classifier: ClassifierBackend) -> Router {
        let resources = Resources::new(
            Collaborators {
                store: Arc::new(StaticObjectStore::new(
                    "Titles must describe the notice.\n\nNo advertising.",
                )),
                index: Arc::new(MemoryIndex::new()),
                embedder: Arc::new(BagOfWords::new(32)),
                generation,
                classifier,
            },
            Settings::new(
                SourceLocation {
                    bucket: "dr.hong-s3".into(),
                    key: "dataset/Guidelines.txt".into(),
                },
                GeneratorKind::Llm,
            ),
        );
        router(Arc::new(resources))
    }

    fn direct(logits: [f32; 2]) -> ClassifierBackend {
        ClassifierBackend::Direct(Arc::new(FixedLogits::new(logits)))
    }

    async fn post_json(app: Router, uri: &str, body: Value) -> (StatusCode, Value) {
        let resp = app
            .oneshot(
                Request::post(uri)
                    .header(header::CONTENT_TYPE, "application/json")
                    .body(Body::from(body.to_string()))
                    .unwrap(),
            )
            .await
            .unwrap();
        let status = resp.status();
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap_or(Value::Null))
    }

    #[tokio::test]
    async fn template_preserves_unaddressed_fields() {
        let backend = Arc::new(ScriptedBackend::new([
            r#"{"title":"C","text":"","button_name":null}"#,
        ]));
        let (status, body) = post_json(
            app(backend, direct([0.0, 1.0])),
            "/template/template",
            json!({
                "original_template": {"title": "A", "text": "B", "button_name": null},
                "user_input": "change the title to C"
            }),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["template"], json!({"title": "C", "text": "B", "button_name": null}));
        assert_eq!(body["chat_response"], "Updated title. Kept text unchanged.");
    }

    #[tokio::test]
    async fn template_exhaustion_is_bad_gateway() {
        let backend = Arc::new(ScriptedBackend::new(["no", "no", "no"]));
        let (status, body) = post_json(
            app(backend, direct([0.0, 1.0])),
            "/template/template",
            json!({"user_input": "welcome notice"}),
        )
        .await;

        assert_eq!(status, StatusCode::BAD_GATEWAY);
        assert_eq!(body["error"], "generation_exhausted");
        assert!(body.get("template").is_none());
    }

    #[tokio::test]
    async fn blank_user_input_is_unprocessable() {
        let backend = Arc::new(ScriptedBackend::default());
        let (status, body) = post_json(
            app(backend.clone(), direct([0.0, 1.0])),
            "/template/template",
            json!({"user_input": "  "}),
        )
        .await;

        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "validation");
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn validate_reports_verdict_and_percentage() {
        let (status, body) = post_json(
            app(Arc::new(ScriptedBackend::default()), direct([0.0, 0.0])),
            "/validate/validate",
            json!({"template": {"title": "T", "text": "X", "button_name": null}}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"result": "reject", "probability": "50.00%"}));
    }

    #[tokio::test]
    async fn validate_with_judge() {
        let judge = Arc::new(ScriptedBackend::new([
            r#"{"prediction":"Approved","confidence":0.9,"probabilities":{"Approved":0.875,"Not Approved":0.125}}"#,
        ]));
        let (status, body) = post_json(
            app(Arc::new(ScriptedBackend::default()), ClassifierBackend::Judge(judge)),
            "/validate/validate",
            json!({"template": {"title": "T", "text": "X"}}),
        )
        .await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, json!({"result": "approve", "probability": "87.50%"}));
    }

    #[tokio::test]
    async fn validate_rejects_malformed_placeholder() {
        let (status, body) = post_json(
            app(Arc::new(ScriptedBackend::default()), direct([0.0, 1.0])),
            "/validate/validate",
            json!({"template": {"title": "T", "text": "Hi #{name"}}),
        )
        .await;
        assert_eq!(status, StatusCode::UNPROCESSABLE_ENTITY);
        assert_eq!(body["error"], "validation");
    }

    #[tokio::test]
    async fn malformed_body_is_rejected_before_orchestration() {
        let backend = Arc::new(ScriptedBackend::default());
        let (status, _) = post_json(
            app(backend.clone(), direct([0.0, 1.0])),
            "/template/template",
            json!({"original_template": "not an object"}),
        )
        .await;
        assert!(status.is_client_error());
        assert_eq!(backend.calls(), 0);
    }

    #[tokio::test]
    async fn health_and_root_redirect() {
        let app = app(Arc::new(ScriptedBackend::default()), direct([0.0, 1.0]));

        let resp = app
            .clone()
            .oneshot(Request::get("/").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::TEMPORARY_REDIRECT);
        assert_eq!(resp.headers()[header::LOCATION], "/health");

        let resp = app
            .oneshot(Request::get("/health").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(resp.status(), StatusCode::OK);
        let bytes = axum::body::to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        let body: Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body, json!({"status": "ok", "passages": 0}));
    }
}
