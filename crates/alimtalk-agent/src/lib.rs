//! Template agent: policy indexing and retrieval, the drafting loop, and
//! approval classification, wired together by [`Resources`].

mod error;
pub use error::AgentError;

pub mod classify;
pub mod context;
pub mod generator;
pub mod indexer;
pub mod orchestrator;
pub mod retriever;

#[cfg(any(test, feature = "test-util"))]
pub mod testing;

pub use classify::{DirectClassifier, JudgeClassifier, TemplateClassifier};
pub use context::{
    ClassifierBackend, ClassifierKind, Collaborators, GeneratorKind, Resources, Settings,
};
pub use generator::{DraftHint, FineTunedGenerator, LlmGenerator, TemplateGenerator};
pub use indexer::{Indexer, SourceLocation, split_paragraphs};
pub use orchestrator::{DEFAULT_MAX_RETRIES, Orchestrator};
pub use retriever::{DEFAULT_DEBUG_CHARS, DEFAULT_TOP_K, Retriever, debug_summary};
