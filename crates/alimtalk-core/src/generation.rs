//! Inputs and outputs of one template generation request.

use serde::{Deserialize, Serialize};

use crate::template::Template;

/// Everything a generator sees for one drafting attempt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct GenerationRequest {
    pub original_template: Option<Template>,
    pub user_input: String,
    pub related_policy: Vec<String>,
}

/// Final artifact of a successful orchestration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentOutput {
    pub template: Template,
    pub chat_message: String,
}
