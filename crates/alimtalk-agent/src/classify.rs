//! Approval classification strategies.

use std::sync::Arc;

use alimtalk_ai::{GenerationBackend, OutputSchema, SequenceClassifier};
use alimtalk_core::{Template, ValidateResult};
use async_trait::async_trait;
use tracing::{debug, info};

use crate::{AgentError, Retriever};

#[async_trait]
pub trait TemplateClassifier: Send + Sync {
    async fn classify(&self, template: &Template) -> Result<ValidateResult, AgentError>;
}

/// Runs a fine-tuned sequence classifier over the template's compact JSON.
pub struct DirectClassifier {
    model: Arc<dyn SequenceClassifier>,
}

impl DirectClassifier {
    pub fn new(model: Arc<dyn SequenceClassifier>) -> Self {
        Self { model }
    }
}

#[async_trait]
impl TemplateClassifier for DirectClassifier {
    async fn classify(&self, template: &Template) -> Result<ValidateResult, AgentError> {
        let logits = self
            .model
            .logits(&template.to_compact_json())
            .await
            .map_err(|e| AgentError::Classification(e.to_string()))?;
        let result = ValidateResult::from_logits(logits);
        info!(prediction = result.prediction.as_str(), confidence = result.confidence, "classified template");
        Ok(result)
    }
}

/// Asks a chat model to judge the template against retrieved policies.
pub struct JudgeClassifier {
    retriever: Arc<Retriever>,
    backend: Arc<dyn GenerationBackend>,
    top_k: usize,
}

impl JudgeClassifier {
    pub fn new(retriever: Arc<Retriever>, backend: Arc<dyn GenerationBackend>, top_k: usize) -> Self {
        Self {
            retriever,
            backend,
            top_k,
        }
    }

    fn prompt(template_json: &str, policies: &str) -> String {
        format!(
            "You are an experienced reviewer deciding whether Kakao AlimTalk templates are approved.\n\
             Check the template below against every review policy provided.\n\n\
             ### Template (JSON)\n```json\n{template_json}\n```\n\n\
             ### Review policies\n{policies}\n\n\
             ### Instructions\n\
             Read every field of the template. Compare it with each policy in turn. Consider \
             policy violations, misleading wording, and advertising or promotional content.\n\
             Decide \"Approved\" or \"Not Approved\" and give your confidence together with the \
             probability of each class. Output only the JSON object."
        )
    }
}

#[async_trait]
impl TemplateClassifier for JudgeClassifier {
    async fn classify(&self, template: &Template) -> Result<ValidateResult, AgentError> {
        let template_json = template.to_compact_json();
        let hits = self.retriever.retrieve(&template_json, self.top_k).await?;
        let policies = hits
            .iter()
            .map(|h| h.text.as_str())
            .collect::<Vec<_>>()
            .join("\n");
        debug!(policies = hits.len(), "judging template");

        let schema = OutputSchema {
            name: "ValidateResult".into(),
            schema: ValidateResult::json_schema(),
        };
        let value = self
            .backend
            .complete_structured(&Self::prompt(&template_json, &policies), &schema)
            .await
            .map_err(|e| AgentError::Classification(e.to_string()))?;
        let result: ValidateResult = serde_json::from_value(value)
            .map_err(|e| AgentError::Classification(format!("judge output: {e}")))?;
        result.check().map_err(AgentError::Classification)?;

        info!(prediction = result.prediction.as_str(), confidence = result.confidence, "judged template");
        Ok(result)
    }
}
