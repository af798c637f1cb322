//! Policy passages: the paragraph-level retrieval unit.

use std::cmp::Ordering;

use serde::{Deserialize, Serialize};

/// One paragraph of the policy document, embedded and stored in the index.
///
/// `id` is the 0-based paragraph index within the source snapshot.
#[derive(Debug, Clone, PartialEq)]
pub struct Passage {
    pub id: u32,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A passage returned by similarity search. Higher `score` is more relevant.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredPassage {
    pub id: u32,
    pub text: String,
    pub score: f32,
}

/// Search results, most relevant first.
pub type RetrievalResult = Vec<ScoredPassage>;

/// Order by descending score, breaking ties by ascending paragraph id.
pub fn relevance_order(a: &ScoredPassage, b: &ScoredPassage) -> Ordering {
    b.score.total_cmp(&a.score).then(a.id.cmp(&b.id))
}
