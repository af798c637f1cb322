use alimtalk_ai::{AiError, ParseError};
use alimtalk_core::InputError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("invalid request: {0}")]
    Validation(#[from] InputError),

    #[error("indexing failed: {0}")]
    Indexing(String),

    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error("generation backend failed: {0}")]
    Generation(#[source] AiError),

    #[error("no valid template after {attempts} attempts: {last_error}")]
    GenerationExhausted { attempts: u32, last_error: ParseError },

    #[error("classification failed: {0}")]
    Classification(String),
}

impl AgentError {
    /// Stable machine-readable name, used in error responses.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Validation(_) => "validation",
            Self::Indexing(_) => "indexing",
            Self::Retrieval(_) => "retrieval",
            Self::Generation(_) => "generation",
            Self::GenerationExhausted { .. } => "generation_exhausted",
            Self::Classification(_) => "classification",
        }
    }
}
