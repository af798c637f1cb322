//! The template drafting loop.
//!
//! ```text
//! Start -> Retrieve -> Draft -> Parse -> Finalize -> Done
//!                        ^        |
//!                        +--------+  (parse failure, at most `max_retries` times)
//! ```
//!
//! Only parse failures are retried. Retrieval and backend failures end the
//! run immediately.

use std::sync::Arc;

use alimtalk_ai::parser;
use alimtalk_core::{AgentOutput, Field, FieldScope, GenerationRequest, Template, TemplateRequest};
use tracing::{debug, info, warn};

use crate::{AgentError, DraftHint, Retriever, TemplateGenerator};

pub const DEFAULT_MAX_RETRIES: u32 = 2;

enum State {
    Draft(DraftHint),
    Parse(String),
    Finalize(Template),
}

pub struct Orchestrator {
    retriever: Arc<Retriever>,
    generator: Arc<dyn TemplateGenerator>,
    max_retries: u32,
    top_k: usize,
}

impl Orchestrator {
    pub fn new(
        retriever: Arc<Retriever>,
        generator: Arc<dyn TemplateGenerator>,
        max_retries: u32,
        top_k: usize,
    ) -> Self {
        Self {
            retriever,
            generator,
            max_retries,
            top_k,
        }
    }

    pub async fn run(&self, request: &TemplateRequest) -> Result<AgentOutput, AgentError> {
        request.validate()?;
        let original = &request.original_template;
        let scope = FieldScope::from_request(&request.user_input);
        debug!(?scope, "state: start");

        debug!(k = self.top_k, "state: retrieve");
        let hits = self.retriever.retrieve(&request.user_input, self.top_k).await?;
        let generation = GenerationRequest {
            original_template: (!original.is_blank()).then(|| original.clone()),
            user_input: request.user_input.clone(),
            related_policy: hits.into_iter().map(|h| h.text).collect(),
        };

        let mut attempts = 0u32;
        let mut retries = 0u32;
        let mut state = State::Draft(DraftHint::Initial);
        loop {
            state = match state {
                State::Draft(hint) => {
                    attempts += 1;
                    debug!(attempt = attempts, "state: draft");
                    let raw = self
                        .generator
                        .draft(&generation, &hint)
                        .await
                        .map_err(AgentError::Generation)?;
                    State::Parse(raw)
                }
                State::Parse(raw) => {
                    debug!(attempt = attempts, "state: parse");
                    match parser::parse(&raw) {
                        Ok(draft) => State::Finalize(draft),
                        Err(e) if retries >= self.max_retries => {
                            warn!(attempts, error = %e, "giving up on unparseable drafts");
                            return Err(AgentError::GenerationExhausted {
                                attempts,
                                last_error: e,
                            });
                        }
                        Err(e) => {
                            retries += 1;
                            warn!(attempt = attempts, retry = retries, error = %e, "draft did not parse, regenerating");
                            State::Draft(DraftHint::Regenerate {
                                error: e.to_string(),
                            })
                        }
                    }
                }
                State::Finalize(draft) => {
                    debug!("state: finalize");
                    let output = finalize(original, draft, scope);
                    info!(attempts, "template drafted");
                    return Ok(output);
                }
            };
        }
    }
}

/// Merge a parsed draft with the original and describe what changed.
pub fn finalize(original: &Template, draft: Template, scope: FieldScope) -> AgentOutput {
    let template = draft.preserve_from(original, scope);
    let chat_message = summarize(original, &template);
    AgentOutput {
        template,
        chat_message,
    }
}

fn summarize(original: &Template, result: &Template) -> String {
    let changed: Vec<Field> = Field::ALL
        .into_iter()
        .filter(|f| original.get(*f) != result.get(*f))
        .collect();
    if changed.is_empty() {
        return "No changes were needed to satisfy the request.".into();
    }
    if original.is_blank() {
        return format!("Drafted a new template with {}.", list(&changed));
    }

    let kept: Vec<Field> = Field::ALL
        .into_iter()
        .filter(|f| !changed.contains(f) && !original.get(*f).trim().is_empty())
        .collect();
    let mut message = format!("Updated {}.", list(&changed));
    if !kept.is_empty() {
        message.push_str(&format!(" Kept {} unchanged.", list(&kept)));
    }
    message
}

fn label(field: Field) -> &'static str {
    match field {
        Field::Title => "title",
        Field::Text => "text",
        Field::ButtonName => "button name",
    }
}

fn list(fields: &[Field]) -> String {
    match fields {
        [] => String::new(),
        [one] => label(*one).to_string(),
        [init @ .., last] => {
            let head: Vec<&str> = init.iter().map(|f| label(*f)).collect();
            format!("{} and {}", head.join(", "), label(*last))
        }
    }
}
