//! OpenAI-compatible HTTP API: embeddings and chat completions.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tracing::{debug, info};

use crate::backend::send_json;
use crate::embedder::normalize;
use crate::{AiError, Embed, GenerationBackend, OutputSchema, SamplingParams};

/// Connection to an OpenAI-compatible endpoint.
#[derive(Clone)]
pub struct OpenAiApi {
    client: reqwest::Client,
    base_url: String,
    api_key: Option<String>,
}

impl OpenAiApi {
    /// `base_url` should include the version prefix, like
    /// `https://api.openai.com/v1` (no trailing slash needed).
    pub fn new(base_url: String, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.trim_end_matches('/').to_string(),
            api_key,
        }
    }

    fn post(&self, path: &str) -> reqwest::RequestBuilder {
        let req = self.client.post(format!("{}/{path}", self.base_url));
        match &self.api_key {
            Some(key) => req.bearer_auth(key),
            None => req,
        }
    }
}

// ── Embeddings ──

#[derive(Serialize)]
struct EmbeddingsRequest<'a> {
    model: &'a str,
    input: &'a [String],
}

#[derive(Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingItem>,
}

#[derive(Deserialize)]
struct EmbeddingItem {
    index: usize,
    embedding: Vec<f32>,
}

/// Remote embedding model, e.g. `text-embedding-3-large` (3072 dimensions).
pub struct OpenAiEmbedder {
    api: OpenAiApi,
    model: String,
    dim: usize,
}

impl OpenAiEmbedder {
    pub fn new(api: OpenAiApi, model: String, dim: usize) -> Self {
        Self { api, model, dim }
    }
}

#[async_trait]
impl Embed for OpenAiEmbedder {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        info!(model = %self.model, count = texts.len(), "requesting embeddings");
        let body = EmbeddingsRequest {
            model: &self.model,
            input: texts,
        };
        let resp: EmbeddingsResponse = send_json(self.api.post("embeddings").json(&body)).await?;
        ordered_embeddings(resp, texts.len(), self.dim)
    }
}

/// Put embeddings back in input order and check their shape.
fn ordered_embeddings(
    resp: EmbeddingsResponse,
    expected: usize,
    dim: usize,
) -> Result<Vec<Vec<f32>>, AiError> {
    if resp.data.len() != expected {
        return Err(AiError::Model(format!(
            "requested {expected} embeddings, received {}",
            resp.data.len()
        )));
    }
    let mut items = resp.data;
    items.sort_by_key(|item| item.index);
    items
        .into_iter()
        .map(|item| {
            if item.embedding.len() != dim {
                return Err(AiError::Model(format!(
                    "embedding has {} dimensions, expected {dim}",
                    item.embedding.len()
                )));
            }
            let mut v = item.embedding;
            normalize(&mut v);
            Ok(v)
        })
        .collect()
}

// ── Chat completions ──

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatMessage,
}

#[derive(Deserialize)]
struct ChatMessage {
    content: Option<String>,
}

/// Hosted chat model used for instruction-driven generation and as the
/// approval judge.
pub struct ChatCompletionsClient {
    api: OpenAiApi,
    model: String,
}

impl ChatCompletionsClient {
    pub fn new(api: OpenAiApi, model: String) -> Self {
        Self { api, model }
    }

    async fn chat(&self, body: serde_json::Value) -> Result<String, AiError> {
        info!(model = %self.model, "requesting chat completion");
        let resp: ChatResponse = send_json(self.api.post("chat/completions").json(&body)).await?;
        let content = first_content(resp)?;
        debug!(chars = content.len(), "chat completion received");
        Ok(content)
    }
}

fn first_content(resp: ChatResponse) -> Result<String, AiError> {
    resp.choices
        .into_iter()
        .next()
        .and_then(|c| c.message.content)
        .filter(|c| !c.trim().is_empty())
        .ok_or(AiError::EmptyResponse("chat completion"))
}

fn chat_body(model: &str, prompt: &str, params: &SamplingParams) -> serde_json::Value {
    let temperature = if params.do_sample { params.temperature } else { 0.0 };
    let mut body = json!({
        "model": model,
        "messages": [{ "role": "user", "content": prompt }],
        "temperature": temperature,
    });
    if let Some(max) = params.max_new_tokens {
        body["max_tokens"] = json!(max);
    }
    body
}

#[async_trait]
impl GenerationBackend for ChatCompletionsClient {
    async fn complete(&self, prompt: &str, params: &SamplingParams) -> Result<String, AiError> {
        self.chat(chat_body(&self.model, prompt, params)).await
    }

    async fn complete_structured(
        &self,
        prompt: &str,
        schema: &OutputSchema,
    ) -> Result<serde_json::Value, AiError> {
        let mut body = chat_body(&self.model, prompt, &SamplingParams::INSTRUCT);
        body["temperature"] = json!(0.0);
        body["response_format"] = json!({
            "type": "json_schema",
            "json_schema": {
                "name": schema.name,
                "schema": schema.schema,
                "strict": true,
            }
        });
        let content = self.chat(body).await?;
        Ok(serde_json::from_str(&content)?)
    }
}
