use thiserror::Error;

/// Malformed caller input, rejected before any retrieval or generation.
#[derive(Debug, Error)]
pub enum InputError {
    #[error("user_input must not be empty")]
    EmptyUserInput,

    #[error("user_input is {len} characters, the limit is {max}")]
    UserInputTooLong { len: usize, max: usize },

    #[error("malformed placeholder in {field}: {detail}")]
    Placeholder { field: &'static str, detail: String },
}
