//! In-process fakes for the collaborator traits.

use std::collections::VecDeque;
use std::sync::Mutex;

use alimtalk_ai::{AiError, Embed, GenerationBackend, OutputSchema, SamplingParams, SequenceClassifier};
use alimtalk_core::{Passage, ScoredPassage};
use alimtalk_store::{MemoryIndex, ObjectStore, PassageIndex, StoreError};
use async_trait::async_trait;

/// Serves the same document for every bucket and key.
pub struct StaticObjectStore {
    text: String,
}

impl StaticObjectStore {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into() }
    }
}

#[async_trait]
impl ObjectStore for StaticObjectStore {
    async fn get_object(&self, _bucket: &str, _key: &str) -> Result<Vec<u8>, StoreError> {
        Ok(self.text.clone().into_bytes())
    }
}

/// Hashed bag-of-words vectors: texts sharing words land close together.
pub struct BagOfWords {
    dim: usize,
}

impl BagOfWords {
    pub fn new(dim: usize) -> Self {
        Self { dim }
    }

    pub fn vector(&self, text: &str) -> Vec<f32> {
        let mut v = vec![0.0f32; self.dim];
        for word in text
            .to_lowercase()
            .split(|c: char| !c.is_alphanumeric())
            .filter(|w| !w.is_empty())
        {
            // FNV-1a
            let hash = word
                .bytes()
                .fold(0xcbf2_9ce4_8422_2325u64, |h, b| {
                    (h ^ u64::from(b)).wrapping_mul(0x0100_0000_01b3)
                });
            v[(hash % self.dim as u64) as usize] += 1.0;
        }
        let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
        if norm > 0.0 {
            v.iter_mut().for_each(|x| *x /= norm);
        }
        v
    }
}

#[async_trait]
impl Embed for BagOfWords {
    fn dim(&self) -> usize {
        self.dim
    }

    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
        Ok(texts.iter().map(|t| self.vector(t)).collect())
    }
}

/// Replays canned completions in order and records every prompt.
#[derive(Default)]
pub struct ScriptedBackend {
    replies: Mutex<VecDeque<Result<String, AiError>>>,
    prompts: Mutex<Vec<String>>,
}

impl ScriptedBackend {
    pub fn new<I, S>(replies: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            replies: Mutex::new(replies.into_iter().map(|r| Ok(r.into())).collect()),
            prompts: Mutex::new(Vec::new()),
        }
    }

    /// A backend whose next call fails.
    pub fn failing(error: AiError) -> Self {
        Self {
            replies: Mutex::new(VecDeque::from([Err(error)])),
            prompts: Mutex::new(Vec::new()),
        }
    }

    pub fn prompts(&self) -> Vec<String> {
        self.prompts.lock().map(|p| p.clone()).unwrap_or_default()
    }

    pub fn calls(&self) -> usize {
        self.prompts().len()
    }

    fn next(&self, prompt: &str) -> Result<String, AiError> {
        if let Ok(mut prompts) = self.prompts.lock() {
            prompts.push(prompt.to_string());
        }
        self.replies
            .lock()
            .ok()
            .and_then(|mut r| r.pop_front())
            .unwrap_or(Err(AiError::EmptyResponse("script exhausted")))
    }
}

#[async_trait]
impl GenerationBackend for ScriptedBackend {
    async fn complete(&self, prompt: &str, _params: &SamplingParams) -> Result<String, AiError> {
        self.next(prompt)
    }

    async fn complete_structured(
        &self,
        prompt: &str,
        _schema: &OutputSchema,
    ) -> Result<serde_json::Value, AiError> {
        let reply = self.next(prompt)?;
        Ok(serde_json::from_str(&reply)?)
    }
}

/// Returns fixed logits and remembers the last input.
pub struct FixedLogits {
    logits: [f32; 2],
    last_input: Mutex<Option<String>>,
}

impl FixedLogits {
    pub fn new(logits: [f32; 2]) -> Self {
        Self {
            logits,
            last_input: Mutex::new(None),
        }
    }

    pub fn last_input(&self) -> Option<String> {
        self.last_input.lock().ok().and_then(|s| s.clone())
    }
}

#[async_trait]
impl SequenceClassifier for FixedLogits {
    async fn logits(&self, text: &str) -> Result<[f32; 2], AiError> {
        if let Ok(mut last) = self.last_input.lock() {
            *last = Some(text.to_string());
        }
        Ok(self.logits)
    }
}

/// A [`MemoryIndex`] whose `delete` and `clear` always fail.
#[derive(Default)]
pub struct UndeletableIndex {
    inner: MemoryIndex,
}

#[async_trait]
impl PassageIndex for UndeletableIndex {
    async fn count(&self) -> Result<usize, StoreError> {
        self.inner.count().await
    }

    async fn add(&self, passages: Vec<Passage>) -> Result<(), StoreError> {
        self.inner.add(passages).await
    }

    async fn search(&self, query: &[f32], k: usize) -> Result<Vec<ScoredPassage>, StoreError> {
        self.inner.search(query, k).await
    }

    async fn ids(&self) -> Result<Vec<u32>, StoreError> {
        self.inner.ids().await
    }

    async fn delete(&self, _ids: &[u32]) -> Result<usize, StoreError> {
        Err(StoreError::Other("delete not permitted".into()))
    }

    async fn clear(&self) -> Result<(), StoreError> {
        Err(StoreError::Other("clear not permitted".into()))
    }
}
