//! Domain types shared by every crate: templates, approval results, policy
//! passages and the HTTP request and response bodies.

pub mod api;
pub mod error;
pub mod generation;
pub mod passage;
pub mod schema;
pub mod template;
pub mod validate;

pub use api::{TemplateRequest, TemplateResponse, ValidateRequest};
pub use error::InputError;
pub use generation::{AgentOutput, GenerationRequest};
pub use passage::{Passage, RetrievalResult, ScoredPassage, relevance_order};
pub use schema::passages;
pub use template::{Field, FieldScope, Template};
pub use validate::{Prediction, Probabilities, ValidateResponse, ValidateResult, Verdict};
