//! HTTP request and response bodies.

use serde::{Deserialize, Serialize};

use crate::error::InputError;
use crate::template::Template;

/// Longest accepted `user_input`, in characters.
pub const MAX_USER_INPUT_CHARS: usize = 2000;

/// Body of `POST /template/template`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateRequest {
    #[serde(default)]
    pub original_template: Template,
    pub user_input: String,
}

impl TemplateRequest {
    pub fn validate(&self) -> Result<(), InputError> {
        if self.user_input.trim().is_empty() {
            return Err(InputError::EmptyUserInput);
        }
        let len = self.user_input.chars().count();
        if len > MAX_USER_INPUT_CHARS {
            return Err(InputError::UserInputTooLong {
                len,
                max: MAX_USER_INPUT_CHARS,
            });
        }
        self.original_template.check_placeholders()
    }
}

/// Response of `POST /template/template`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TemplateResponse {
    pub template: Template,
    pub chat_response: String,
}

/// Body of `POST /validate/validate`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidateRequest {
    pub template: Template,
}

impl ValidateRequest {
    pub fn validate(&self) -> Result<(), InputError> {
        self.template.check_placeholders()
    }
}
