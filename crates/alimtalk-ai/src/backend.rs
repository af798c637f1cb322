//! Text generation backends.
//!
//! [`GenerationBackend`] is the seam between the template generators and
//! whatever model produces text: a fine-tuned model behind a text-generation
//! server, or a hosted chat model (see [`crate::openai`]).

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::AiError;

/// Decoding parameters for a single completion.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SamplingParams {
    /// `None` leaves the limit to the backend.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_new_tokens: Option<u32>,
    pub temperature: f32,
    pub do_sample: bool,
}

impl SamplingParams {
    /// Short, mildly random completions for the fine-tuned template model.
    pub const FINE_TUNED: SamplingParams = SamplingParams {
        max_new_tokens: Some(150),
        temperature: 0.3,
        do_sample: true,
    };

    /// Near-deterministic completions for instruction-following chat models.
    pub const INSTRUCT: SamplingParams = SamplingParams {
        max_new_tokens: None,
        temperature: 0.2,
        do_sample: true,
    };
}

/// A named JSON schema the backend must conform its output to.
#[derive(Debug, Clone)]
pub struct OutputSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

#[async_trait]
pub trait GenerationBackend: Send + Sync {
    /// Free-form completion of `prompt`.
    async fn complete(&self, prompt: &str, params: &SamplingParams) -> Result<String, AiError>;

    /// Completion constrained to `schema`, returned as parsed JSON.
    async fn complete_structured(
        &self,
        _prompt: &str,
        _schema: &OutputSchema,
    ) -> Result<serde_json::Value, AiError> {
        Err(AiError::Unsupported("structured output"))
    }
}

/// Send a request and decode a JSON body, mapping non-2xx to `Server`.
pub(crate) async fn send_json<T: DeserializeOwned>(
    request: reqwest::RequestBuilder,
) -> Result<T, AiError> {
    let resp = request.send().await?;
    let status = resp.status();
    if !status.is_success() {
        let body = resp.text().await.unwrap_or_default();
        return Err(AiError::Server {
            status: status.as_u16(),
            body,
        });
    }
    let bytes = resp.bytes().await?;
    Ok(serde_json::from_slice(&bytes)?)
}

/// Client for a text-generation server hosting the fine-tuned template model.
///
/// Speaks the `POST /generate` protocol: `{inputs, parameters}` in,
/// `{generated_text}` out.
pub struct TextGenerationClient {
    client: reqwest::Client,
    base_url: String,
}

#[derive(Serialize)]
struct GenerateRequest<'a> {
    inputs: &'a str,
    parameters: GenerateParameters,
}

#[derive(Serialize)]
struct GenerateParameters {
    #[serde(flatten)]
    sampling: SamplingParams,
    return_full_text: bool,
}

#[derive(Deserialize)]
struct GenerateResponse {
    generated_text: String,
}

impl TextGenerationClient {
    /// `base_url` should be like `http://localhost:8080` (no trailing slash needed).
    pub fn new(base_url: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
        }
    }
}

#[async_trait]
impl GenerationBackend for TextGenerationClient {
    async fn complete(&self, prompt: &str, params: &SamplingParams) -> Result<String, AiError> {
        let url = format!("{}/generate", self.base_url);
        info!(url = %url, max_new_tokens = ?params.max_new_tokens, "requesting completion");

        let body = GenerateRequest {
            inputs: prompt,
            parameters: GenerateParameters {
                sampling: *params,
                return_full_text: false,
            },
        };
        let resp: GenerateResponse = send_json(self.client.post(&url).json(&body)).await?;
        debug!(chars = resp.generated_text.len(), "completion received");
        Ok(resp.generated_text)
    }
}
