//! The passage index: a collection of embedded paragraphs keyed by id.
//!
//! [`PassageIndex`] is the seam between retrieval and storage. Scores are
//! cosine similarities, so higher means more relevant. [`MemoryIndex`] keeps
//! everything in process memory and is used when no index path is configured.

use std::sync::RwLock;

use alimtalk_core::{Passage, ScoredPassage, relevance_order};
use async_trait::async_trait;

use crate::StoreError;

#[async_trait]
pub trait PassageIndex: Send + Sync {
    /// Number of stored passages.
    async fn count(&self) -> Result<usize, StoreError>;

    /// Append passages as one batch.
    async fn add(&self, passages: Vec<Passage>) -> Result<(), StoreError>;

    /// The `k` nearest passages to `query`, most relevant first.
    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredPassage>, StoreError>;

    /// Ids of every stored passage.
    async fn ids(&self) -> Result<Vec<u32>, StoreError>;

    /// Delete passages by id. Returns how many ids were requested.
    async fn delete(&self, ids: &[u32]) -> Result<usize, StoreError>;

    /// Drop the whole collection; the next `add` recreates it.
    async fn clear(&self) -> Result<(), StoreError>;
}

/// In-process passage index with brute-force cosine search.
#[derive(Default)]
pub struct MemoryIndex {
    passages: RwLock<Vec<Passage>>,
}

impl MemoryIndex {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Vec<Passage>>, StoreError> {
        self.passages
            .read()
            .map_err(|_| StoreError::Other("memory index lock poisoned".into()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Vec<Passage>>, StoreError> {
        self.passages
            .write()
            .map_err(|_| StoreError::Other("memory index lock poisoned".into()))
    }
}

#[async_trait]
impl PassageIndex for MemoryIndex {
    async fn count(&self) -> Result<usize, StoreError> {
        Ok(self.read()?.len())
    }

    async fn add(&self, passages: Vec<Passage>) -> Result<(), StoreError> {
        self.write()?.extend(passages);
        Ok(())
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredPassage>, StoreError> {
        let passages = self.read()?;
        let mut hits: Vec<ScoredPassage> = passages
            .iter()
            .map(|p| ScoredPassage {
                id: p.id,
                text: p.text.clone(),
                score: cosine_sim(query, &p.embedding),
            })
            .collect();
        hits.sort_by(relevance_order);
        hits.truncate(k);
        Ok(hits)
    }

    async fn ids(&self) -> Result<Vec<u32>, StoreError> {
        Ok(self.read()?.iter().map(|p| p.id).collect())
    }

    async fn delete(&self, ids: &[u32]) -> Result<usize, StoreError> {
        self.write()?.retain(|p| !ids.contains(&p.id));
        Ok(ids.len())
    }

    async fn clear(&self) -> Result<(), StoreError> {
        self.write()?.clear();
        Ok(())
    }
}

/// Cosine similarity; zero when either vector has zero length.
pub fn cosine_sim(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let na: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let nb: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}
