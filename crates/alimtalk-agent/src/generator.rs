//! Template drafting strategies.
//!
//! A generator turns one [`GenerationRequest`] into raw model output. It does
//! not parse; the orchestrator owns parsing and retries.

use std::sync::Arc;

use alimtalk_ai::{AiError, GenerationBackend, SamplingParams};
use alimtalk_core::{GenerationRequest, Template};
use async_trait::async_trait;
use tracing::debug;

/// Extra guidance for one drafting attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DraftHint {
    Initial,
    /// The previous draft could not be parsed.
    Regenerate { error: String },
}

impl DraftHint {
    fn instruction(&self) -> Option<String> {
        match self {
            Self::Initial => None,
            Self::Regenerate { error } => Some(format!(
                "The previous output could not be parsed ({error}). Regenerate the template as \
                 exactly one JSON object with string fields \"title\" and \"text\" and a \
                 \"button_name\" that is a string or null."
            )),
        }
    }
}

#[async_trait]
pub trait TemplateGenerator: Send + Sync {
    async fn draft(&self, request: &GenerationRequest, hint: &DraftHint) -> Result<String, AiError>;
}

fn template_json(template: Option<&Template>) -> String {
    match template {
        Some(t) => t.to_compact_json(),
        None => Template::default().to_compact_json(),
    }
}

// ── Fine-tuned completion model ──

/// Prompts a model fine-tuned on `original_template / user_input / policy /
/// template` records and reads back the completion after the last
/// `template: ` marker.
pub struct FineTunedGenerator {
    backend: Arc<dyn GenerationBackend>,
}

impl FineTunedGenerator {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    fn prompt(request: &GenerationRequest, hint: &DraftHint) -> String {
        let policy = serde_json::to_string(&request.related_policy).unwrap_or_default();
        let mut prompt = format!(
            "original_template: {}\nuser_input: {}\npolicy: {policy}\n",
            template_json(request.original_template.as_ref()),
            request.user_input,
        );
        if let Some(instruction) = hint.instruction() {
            prompt.push_str(&format!("note: {instruction}\n"));
        }
        prompt.push_str("template: ");
        prompt
    }
}

/// The text after the last `template: ` marker, or all of it.
fn after_template_marker(raw: &str) -> &str {
    raw.rsplit_once("template: ")
        .map_or(raw, |(_, tail)| tail)
        .trim()
}

#[async_trait]
impl TemplateGenerator for FineTunedGenerator {
    async fn draft(&self, request: &GenerationRequest, hint: &DraftHint) -> Result<String, AiError> {
        let prompt = Self::prompt(request, hint);
        let raw = self.backend.complete(&prompt, &SamplingParams::FINE_TUNED).await?;
        debug!(chars = raw.len(), "fine-tuned draft received");
        Ok(after_template_marker(&raw).to_string())
    }
}

// ── Instruction-following chat model ──

const LLM_INSTRUCTIONS: &str = "\
You modify Kakao AlimTalk message templates.

Template syntax:
- A template has three fields: \"title\", \"text\" and \"button_name\".
- Values filled in at send time are written as #{variable_name} and must stay unresolved.

Task:
- If a field of the original template is an empty string, POPULATE it from the user request.
- If a field already has content, REFINE it according to the user request.

Rules:
1. Preserve unchanged fields. Copy the exact content of every field the request does not ask \
to change. Never leave such a field empty. For example, with the original template \
{\"title\": \"A\", \"text\": \"B\"} and the request \"Change the title to C\", the result is \
{\"title\": \"C\", \"text\": \"B\"}.
2. Always start from the original template.
3. Stay on the topic of the original template.
4. Follow every related policy.
5. Write the template in Korean.

Answer with exactly one JSON object of the form \
{\"title\": string, \"text\": string, \"button_name\": string or null} and nothing else.";

/// Drafts with a general instruction-following model.
pub struct LlmGenerator {
    backend: Arc<dyn GenerationBackend>,
}

impl LlmGenerator {
    pub fn new(backend: Arc<dyn GenerationBackend>) -> Self {
        Self { backend }
    }

    fn prompt(request: &GenerationRequest, hint: &DraftHint) -> String {
        let mut prompt = format!(
            "{LLM_INSTRUCTIONS}\n\nOriginal Template:\n{}\n\nUser Request: {}\n\nRelated Policies:\n",
            template_json(request.original_template.as_ref()),
            request.user_input,
        );
        for policy in &request.related_policy {
            prompt.push_str("- ");
            prompt.push_str(policy);
            prompt.push('\n');
        }
        if let Some(instruction) = hint.instruction() {
            prompt.push('\n');
            prompt.push_str(&instruction);
            prompt.push('\n');
        }
        prompt
    }
}

#[async_trait]
impl TemplateGenerator for LlmGenerator {
    async fn draft(&self, request: &GenerationRequest, hint: &DraftHint) -> Result<String, AiError> {
        let prompt = Self::prompt(request, hint);
        self.backend.complete(&prompt, &SamplingParams::INSTRUCT).await
    }
}
