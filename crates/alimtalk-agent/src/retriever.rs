//! Similarity search over the policy passages.

use std::fmt::Write;
use std::sync::Arc;

use alimtalk_core::{RetrievalResult, relevance_order};
use tracing::debug;

use crate::{AgentError, Indexer};

/// Passages returned when the caller does not say otherwise.
pub const DEFAULT_TOP_K: usize = 10;

/// Passage text shown per chunk by [`debug_summary`] unless overridden.
pub const DEFAULT_DEBUG_CHARS: usize = 1000;

pub struct Retriever {
    indexer: Arc<Indexer>,
}

impl Retriever {
    pub fn new(indexer: Arc<Indexer>) -> Self {
        Self { indexer }
    }

    /// The `k` passages most similar to `query`, building the index first
    /// if it is empty.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<RetrievalResult, AgentError> {
        self.indexer.ensure_index().await?;
        self.retrieve_without_build(query, k).await
    }

    /// Search whatever is currently indexed.
    pub async fn retrieve_without_build(
        &self,
        query: &str,
        k: usize,
    ) -> Result<RetrievalResult, AgentError> {
        if k == 0 {
            return Ok(Vec::new());
        }
        let vector = self
            .indexer
            .embedder
            .embed(query)
            .await
            .map_err(|e| AgentError::Retrieval(format!("embedding query: {e}")))?;
        let mut hits = self
            .indexer
            .index
            .search(&vector, k)
            .await
            .map_err(|e| AgentError::Retrieval(format!("searching passages: {e}")))?;
        hits.sort_by(relevance_order);
        hits.truncate(k);
        debug!(k, hits = hits.len(), "retrieved passages");
        Ok(hits)
    }
}

/// Human-readable dump of a retrieval result, each passage cut to
/// `max_chars` characters.
pub fn debug_summary(result: &RetrievalResult, max_chars: usize) -> String {
    let mut out = format!("[DEBUG] retrieved {} chunks\n", result.len());
    for (i, hit) in result.iter().enumerate() {
        let text: String = hit.text.chars().take(max_chars).collect();
        let _ = writeln!(out, "\n--- Chunk #{} --- (score={:.4})", i + 1, hit.score);
        let _ = writeln!(out, "{text}");
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::SourceLocation;
    use crate::testing::{BagOfWords, StaticObjectStore};
    use alimtalk_core::ScoredPassage;
    use alimtalk_store::{MemoryIndex, PassageIndex};

    const GUIDE: &str = "button names must be short\n\n\
                         advertising content is not allowed\n\n\
                         button labels and button names need review\n\n\
                         advertising content is not allowed";

    fn retriever_over(text: &str) -> (Arc<MemoryIndex>, Retriever) {
        let index = Arc::new(MemoryIndex::new());
        let indexer = Indexer::new(
            Arc::new(StaticObjectStore::new(text)),
            index.clone(),
            Arc::new(BagOfWords::new(64)),
            SourceLocation {
                bucket: "b".into(),
                key: "k".into(),
            },
        );
        (index, Retriever::new(Arc::new(indexer)))
    }

    #[tokio::test]
    async fn results_are_ordered_and_bounded() {
        let (_, retriever) = retriever_over(GUIDE);
        let hits = retriever
            .retrieve("is advertising content allowed", 3)
            .await
            .unwrap();

        assert_eq!(hits.len(), 3);
        for pair in hits.windows(2) {
            assert!(pair[0].score >= pair[1].score);
            if pair[0].score == pair[1].score {
                assert!(pair[0].id < pair[1].id);
            }
        }
        // Paragraphs 1 and 3 are identical: equal scores, lower id first.
        assert_eq!(hits[0].id, 1);
        assert_eq!(hits[1].id, 3);
    }

    #[tokio::test]
    async fn retrieve_builds_lazily() {
        let (index, retriever) = retriever_over(GUIDE);
        assert_eq!(index.count().await.unwrap(), 0);
        retriever.retrieve("button", DEFAULT_TOP_K).await.unwrap();
        assert_eq!(index.count().await.unwrap(), 4);
    }

    #[tokio::test]
    async fn empty_corpus_gives_empty_result() {
        let (_, retriever) = retriever_over("   \n\n  ");
        assert!(retriever.retrieve("anything", 5).await.unwrap().is_empty());
        assert!(
            retriever
                .retrieve_without_build("anything", 5)
                .await
                .unwrap()
                .is_empty()
        );
    }

    #[tokio::test]
    async fn zero_k_returns_nothing() {
        let (_, retriever) = retriever_over(GUIDE);
        assert!(retriever.retrieve("button", 0).await.unwrap().is_empty());
    }

    #[test]
    fn debug_summary_formats_and_truncates() {
        let result = vec![
            ScoredPassage {
                id: 4,
                text: "광고성 정보 금지".into(),
                score: 0.87654,
            },
            ScoredPassage {
                id: 0,
                text: "short".into(),
                score: 0.5,
            },
        ];
        let out = debug_summary(&result, 3);
        assert!(out.starts_with("[DEBUG] retrieved 2 chunks\n"));
        assert!(out.contains("--- Chunk #1 --- (score=0.8765)\n광고성\n"));
        assert!(out.contains("--- Chunk #2 --- (score=0.5000)\nsho\n"));
    }
}
