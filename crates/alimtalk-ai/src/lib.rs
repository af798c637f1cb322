//! AI layer: embeddings, generation backends, approval classification, and
//! extraction of structured templates from raw generation output.

mod error;
pub use error::AiError;

pub mod backend;
pub mod classifier;
pub mod embedder;
pub mod openai;
pub mod parser;

pub use backend::{GenerationBackend, OutputSchema, SamplingParams, TextGenerationClient};
pub use classifier::SequenceClassifier;
pub use embedder::Embed;
pub use openai::{ChatCompletionsClient, OpenAiApi, OpenAiEmbedder};
pub use parser::{ParseError, extract_object, parse};

#[cfg(feature = "onnx")]
pub use classifier::OnnxClassifier;
#[cfg(feature = "onnx")]
pub use embedder::OnnxEmbedder;
