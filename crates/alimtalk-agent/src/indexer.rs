//! Builds the passage index from the policy document.
//!
//! The document is split into paragraphs on blank lines; each paragraph is
//! one passage whose id is its 0-based position. Builds and resets hold a
//! process-local lock. Two processes sharing one index can still race.

use std::sync::Arc;

use alimtalk_ai::Embed;
use alimtalk_core::Passage;
use alimtalk_store::{ObjectStore, PassageIndex, source_text};
use tokio::sync::Mutex;
use tracing::{info, warn};

use crate::AgentError;

/// Paragraphs per embedding call.
const EMBED_BATCH_SIZE: usize = 64;

/// Where the policy document lives in the object store.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SourceLocation {
    pub bucket: String,
    pub key: String,
}

/// Split text into trimmed, non-empty paragraphs.
///
/// Line endings are normalized first; a line holding only whitespace ends a
/// paragraph.
pub fn split_paragraphs(text: &str) -> Vec<String> {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");
    let mut paragraphs = Vec::new();
    let mut current: Vec<&str> = Vec::new();

    for line in text.split('\n') {
        if line.trim().is_empty() {
            push_paragraph(&mut paragraphs, &mut current);
        } else {
            current.push(line);
        }
    }
    push_paragraph(&mut paragraphs, &mut current);
    paragraphs
}

fn push_paragraph(paragraphs: &mut Vec<String>, lines: &mut Vec<&str>) {
    let joined = lines.join("\n");
    let trimmed = joined.trim();
    if !trimmed.is_empty() {
        paragraphs.push(trimmed.to_string());
    }
    lines.clear();
}

pub struct Indexer {
    store: Arc<dyn ObjectStore>,
    pub(crate) index: Arc<dyn PassageIndex>,
    pub(crate) embedder: Arc<dyn Embed>,
    source: SourceLocation,
    build_lock: Mutex<()>,
}

impl Indexer {
    pub fn new(
        store: Arc<dyn ObjectStore>,
        index: Arc<dyn PassageIndex>,
        embedder: Arc<dyn Embed>,
        source: SourceLocation,
    ) -> Self {
        Self {
            store,
            index,
            embedder,
            source,
            build_lock: Mutex::new(()),
        }
    }

    /// Number of indexed passages.
    pub async fn count(&self) -> Result<usize, AgentError> {
        self.index
            .count()
            .await
            .map_err(|e| AgentError::Indexing(e.to_string()))
    }

    /// Build the index if it is empty. Returns how many passages were
    /// inserted, 0 when the index was already populated.
    ///
    /// A failing count is treated as an empty index.
    pub async fn ensure_index(&self) -> Result<usize, AgentError> {
        let _guard = self.build_lock.lock().await;
        match self.index.count().await {
            Ok(count) if count > 0 => {
                info!(count, "passage index already built, skipping");
                return Ok(0);
            }
            Ok(_) => info!("passage index is empty, building"),
            Err(e) => warn!(error = %e, "could not count passages, building"),
        }
        self.build().await
    }

    /// Delete every passage and rebuild from the source document.
    ///
    /// With `hard`, the collection itself is also dropped before the rebuild.
    /// Failed deletes are logged and the rebuild proceeds, which can leave
    /// duplicate passages behind.
    pub async fn reset(&self, hard: bool) -> Result<usize, AgentError> {
        let _guard = self.build_lock.lock().await;

        match self.index.ids().await {
            Ok(ids) => match self.index.delete(&ids).await {
                Ok(deleted) => info!(deleted, "cleared passages"),
                Err(e) => warn!(error = %e, "passage delete failed, rebuilding anyway"),
            },
            Err(e) => warn!(error = %e, "could not list passage ids, rebuilding anyway"),
        }
        if hard && let Err(e) = self.index.clear().await {
            warn!(error = %e, "dropping passage collection failed, rebuilding anyway");
        }

        let count = self.build().await?;
        info!(count, hard, "re-indexed policy document");
        Ok(count)
    }

    async fn build(&self) -> Result<usize, AgentError> {
        let SourceLocation { bucket, key } = &self.source;
        let text = source_text(self.store.as_ref(), bucket, key)
            .await
            .map_err(|e| AgentError::Indexing(format!("fetching {bucket}/{key}: {e}")))?;

        let paragraphs = split_paragraphs(&text);
        if paragraphs.is_empty() {
            warn!(bucket = %bucket, key = %key, "policy document has no paragraphs");
            return Ok(0);
        }
        info!(paragraphs = paragraphs.len(), bucket = %bucket, key = %key, "embedding policy paragraphs");

        let mut passages = Vec::with_capacity(paragraphs.len());
        for chunk in paragraphs.chunks(EMBED_BATCH_SIZE) {
            let embeddings = self
                .embedder
                .embed_batch(chunk)
                .await
                .map_err(|e| AgentError::Indexing(format!("embedding paragraphs: {e}")))?;
            if embeddings.len() != chunk.len() {
                return Err(AgentError::Indexing(format!(
                    "embedder returned {} vectors for {} paragraphs",
                    embeddings.len(),
                    chunk.len()
                )));
            }
            for (text, embedding) in chunk.iter().zip(embeddings) {
                let id = u32::try_from(passages.len())
                    .map_err(|_| AgentError::Indexing("too many paragraphs".into()))?;
                passages.push(Passage {
                    id,
                    text: text.clone(),
                    embedding,
                });
            }
        }

        let count = passages.len();
        self.index
            .add(passages)
            .await
            .map_err(|e| AgentError::Indexing(format!("inserting passages: {e}")))?;
        info!(count, "indexed policy paragraphs");
        Ok(count)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BagOfWords, StaticObjectStore, UndeletableIndex};
    use alimtalk_store::{FsObjectStore, MemoryIndex};

    const GUIDE: &str = "정보성 메시지만 발송할 수 있습니다.\r\n\r\n광고 문구는 금지됩니다.\n  \n버튼명은 14자 이내로 작성합니다.\n\n\n";

    fn source() -> SourceLocation {
        SourceLocation {
            bucket: "dr.hong-s3".into(),
            key: "dataset/Guidelines.txt".into(),
        }
    }

    fn indexer_with(index: Arc<dyn PassageIndex>, text: &str) -> Indexer {
        Indexer::new(
            Arc::new(StaticObjectStore::new(text)),
            index,
            Arc::new(BagOfWords::new(32)),
            source(),
        )
    }

    #[test]
    fn splits_on_blank_lines() {
        let paragraphs = split_paragraphs(GUIDE);
        assert_eq!(
            paragraphs,
            vec![
                "정보성 메시지만 발송할 수 있습니다.",
                "광고 문구는 금지됩니다.",
                "버튼명은 14자 이내로 작성합니다.",
            ]
        );
    }

    #[test]
    fn keeps_single_newlines_inside_a_paragraph() {
        let paragraphs = split_paragraphs("  line one\n  line two  \n\t\nnext");
        assert_eq!(paragraphs, vec!["line one\n  line two", "next"]);
    }

    #[test]
    fn blank_document_has_no_paragraphs() {
        assert!(split_paragraphs(" \r\n \n\t").is_empty());
    }

    #[tokio::test]
    async fn ensure_index_is_idempotent() {
        let index = Arc::new(MemoryIndex::new());
        let indexer = indexer_with(index.clone(), GUIDE);

        assert_eq!(indexer.ensure_index().await.unwrap(), 3);
        assert_eq!(indexer.ensure_index().await.unwrap(), 0);
        assert_eq!(index.count().await.unwrap(), 3);

        let mut ids = index.ids().await.unwrap();
        ids.sort();
        assert_eq!(ids, vec![0, 1, 2]);
    }

    #[tokio::test]
    async fn concurrent_ensure_builds_once() {
        let index = Arc::new(MemoryIndex::new());
        let indexer = Arc::new(indexer_with(index.clone(), GUIDE));

        let (a, b) = tokio::join!(indexer.ensure_index(), indexer.ensure_index());
        assert_eq!(a.unwrap() + b.unwrap(), 3);
        assert_eq!(index.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn soft_reset_rebuilds_same_count() {
        let index = Arc::new(MemoryIndex::new());
        let indexer = indexer_with(index.clone(), GUIDE);
        indexer.ensure_index().await.unwrap();

        assert_eq!(indexer.reset(false).await.unwrap(), 3);
        assert_eq!(index.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn hard_reset_rebuilds_same_count() {
        let index = Arc::new(MemoryIndex::new());
        let indexer = indexer_with(index.clone(), GUIDE);
        indexer.ensure_index().await.unwrap();

        assert_eq!(indexer.reset(true).await.unwrap(), 3);
        assert_eq!(index.count().await.unwrap(), 3);
    }

    #[tokio::test]
    async fn failed_delete_is_not_fatal() {
        let index = Arc::new(UndeletableIndex::default());
        let indexer = indexer_with(index.clone(), GUIDE);
        indexer.ensure_index().await.unwrap();

        assert_eq!(indexer.reset(true).await.unwrap(), 3);
        // The old passages could not be removed, so they are duplicated.
        assert_eq!(index.count().await.unwrap(), 6);
    }

    #[tokio::test]
    async fn missing_source_is_an_indexing_error() {
        let tmp = tempfile::TempDir::new().unwrap();
        let indexer = Indexer::new(
            Arc::new(FsObjectStore::new(tmp.path())),
            Arc::new(MemoryIndex::new()),
            Arc::new(BagOfWords::new(32)),
            source(),
        );
        assert!(matches!(
            indexer.ensure_index().await,
            Err(AgentError::Indexing(_))
        ));
    }
}
