//! Recover a [`Template`] from raw generation output.
//!
//! Models wrap the JSON object in prose, code fences, or a trailing
//! continuation. The first balanced `{...}` object is taken; braces inside
//! JSON strings (including `#{name}` placeholders) do not count.

use alimtalk_core::Template;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ParseError {
    #[error("no balanced object found")]
    NoBalancedObject,

    #[error("invalid template object: {0}")]
    Invalid(#[source] serde_json::Error),
}

/// The first balanced object starting at the first `{` in `raw`.
pub fn extract_object(raw: &str) -> Result<&str, ParseError> {
    let start = raw.find('{').ok_or(ParseError::NoBalancedObject)?;
    let mut depth = 0usize;
    let mut in_string = false;
    let mut escaped = false;

    for (i, c) in raw[start..].char_indices() {
        if in_string {
            match c {
                _ if escaped => escaped = false,
                '\\' => escaped = true,
                '"' => in_string = false,
                _ => {}
            }
            continue;
        }
        match c {
            '"' => in_string = true,
            '{' => depth += 1,
            '}' => {
                depth -= 1;
                if depth == 0 {
                    return Ok(&raw[start..start + i + 1]);
                }
            }
            _ => {}
        }
    }
    Err(ParseError::NoBalancedObject)
}

/// Extract and decode a template. Unknown keys are ignored; a missing
/// `button_name` decodes as `None`.
pub fn parse(raw: &str) -> Result<Template, ParseError> {
    let object = extract_object(raw)?;
    serde_json::from_str(object).map_err(ParseError::Invalid)
}
