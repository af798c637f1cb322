//! Sentence embeddings for passages and retrieval queries.
//!
//! [`Embed`] is the seam the indexer and retriever depend on. The local
//! implementation runs a sentence-transformers ONNX model with mean pooling
//! (feature `onnx`); the remote one lives in [`crate::openai`].

use async_trait::async_trait;

use crate::AiError;

/// Turns text into fixed-length vectors.
#[async_trait]
pub trait Embed: Send + Sync {
    /// Length of every vector this embedder returns.
    fn dim(&self) -> usize;

    /// One vector per input, in input order.
    async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError>;

    async fn embed(&self, text: &str) -> Result<Vec<f32>, AiError> {
        self.embed_batch(&[text.to_string()])
            .await?
            .into_iter()
            .next()
            .ok_or(AiError::EmptyResponse("embedding"))
    }
}

/// L2-normalize a vector in place.
pub(crate) fn normalize(v: &mut [f32]) {
    let norm: f32 = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm > 0.0 {
        for x in v.iter_mut() {
            *x /= norm;
        }
    }
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxEmbedder;
#[cfg(feature = "onnx")]
pub(crate) use onnx::{Encoded, load_session, load_tokenizer, model_err};

#[cfg(feature = "onnx")]
mod onnx {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use ort::session::Session;
    use ort::value::Tensor;
    use tokenizers::Tokenizer;
    use tracing::{debug, info};

    use super::{Embed, normalize};
    use crate::AiError;

    pub(crate) fn model_err<E: std::fmt::Display>(what: &'static str) -> impl FnOnce(E) -> AiError {
        move |e| AiError::Model(format!("{what}: {e}"))
    }

    /// Load `tokenizer.json` with truncation and batch padding configured.
    pub(crate) fn load_tokenizer(model_dir: &Path, max_length: usize) -> Result<Tokenizer, AiError> {
        let path = model_dir.join("tokenizer.json");
        if !path.exists() {
            return Err(AiError::Model(format!(
                "tokenizer.json not found in {}",
                model_dir.display()
            )));
        }
        let mut tokenizer = Tokenizer::from_file(&path).map_err(model_err("load tokenizer"))?;
        tokenizer
            .with_truncation(Some(tokenizers::TruncationParams {
                max_length,
                ..Default::default()
            }))
            .map_err(model_err("set truncation"))?;
        tokenizer.with_padding(Some(tokenizers::PaddingParams::default()));
        Ok(tokenizer)
    }

    pub(crate) fn load_session(model_dir: &Path) -> Result<Session, AiError> {
        let path = model_dir.join("model.onnx");
        if !path.exists() {
            return Err(AiError::Model(format!(
                "model.onnx not found in {}",
                model_dir.display()
            )));
        }
        Session::builder()
            .map_err(model_err("session builder"))?
            .commit_from_file(&path)
            .map_err(model_err("load model"))
    }

    /// Tokenized batch as flat `[batch, seq_len]` tensors.
    pub(crate) struct Encoded {
        pub batch: usize,
        pub seq_len: usize,
        pub input_ids: Vec<i64>,
        pub attention_mask: Vec<i64>,
        pub token_type_ids: Vec<i64>,
    }

    impl Encoded {
        pub fn new(tokenizer: &Tokenizer, texts: &[&str]) -> Result<Self, AiError> {
            let encodings = tokenizer
                .encode_batch(texts.to_vec(), true)
                .map_err(model_err("tokenize"))?;
            let batch = encodings.len();
            let seq_len = encodings
                .iter()
                .map(|e| e.get_ids().len())
                .max()
                .unwrap_or(0);

            let mut input_ids = vec![0i64; batch * seq_len];
            let mut attention_mask = vec![0i64; batch * seq_len];
            let mut token_type_ids = vec![0i64; batch * seq_len];
            for (i, enc) in encodings.iter().enumerate() {
                let row = i * seq_len;
                for (j, ((&id, &mask), &tid)) in enc
                    .get_ids()
                    .iter()
                    .zip(enc.get_attention_mask())
                    .zip(enc.get_type_ids())
                    .enumerate()
                {
                    input_ids[row + j] = i64::from(id);
                    attention_mask[row + j] = i64::from(mask);
                    token_type_ids[row + j] = i64::from(tid);
                }
            }
            Ok(Self {
                batch,
                seq_len,
                input_ids,
                attention_mask,
                token_type_ids,
            })
        }

        /// Run the session on this batch and return the first output as
        /// `(shape, data)`.
        pub fn run(&self, session: &mut Session) -> Result<(Vec<i64>, Vec<f32>), AiError> {
            let shape = [self.batch as i64, self.seq_len as i64];
            let ids = Tensor::from_array((shape, self.input_ids.clone().into_boxed_slice()))
                .map_err(model_err("input_ids tensor"))?;
            let mask = Tensor::from_array((shape, self.attention_mask.clone().into_boxed_slice()))
                .map_err(model_err("attention_mask tensor"))?;
            let types = Tensor::from_array((shape, self.token_type_ids.clone().into_boxed_slice()))
                .map_err(model_err("token_type_ids tensor"))?;

            let outputs = session
                .run(ort::inputs![
                    "input_ids" => ids,
                    "attention_mask" => mask,
                    "token_type_ids" => types,
                ])
                .map_err(model_err("inference"))?;
            let (out_shape, data) = outputs[0]
                .try_extract_tensor::<f32>()
                .map_err(model_err("extract output"))?;
            let dims: &[i64] = out_shape;
            Ok((dims.to_vec(), data.to_vec()))
        }
    }

    struct Model {
        session: Session,
        tokenizer: Tokenizer,
        dim: usize,
    }

    impl Model {
        fn embed_batch(&mut self, texts: &[&str]) -> Result<Vec<Vec<f32>>, AiError> {
            let enc = Encoded::new(&self.tokenizer, texts)?;
            let (dims, data) = enc.run(&mut self.session)?;
            if dims.len() != 3 || dims[0] as usize != enc.batch || dims[2] as usize != self.dim {
                return Err(AiError::Model(format!(
                    "unexpected output shape {dims:?}, expected [{}, {}, {}]",
                    enc.batch, enc.seq_len, self.dim
                )));
            }
            let out_len = dims[1] as usize;

            // Mean pooling over attended tokens.
            let mut embeddings = Vec::with_capacity(enc.batch);
            for i in 0..enc.batch {
                let mut pooled = vec![0.0f32; self.dim];
                let mut tokens = 0.0f32;
                for j in 0..out_len.min(enc.seq_len) {
                    if enc.attention_mask[i * enc.seq_len + j] == 0 {
                        continue;
                    }
                    let offset = (i * out_len + j) * self.dim;
                    for (d, p) in pooled.iter_mut().enumerate() {
                        *p += data[offset + d];
                    }
                    tokens += 1.0;
                }
                if tokens > 0.0 {
                    for p in &mut pooled {
                        *p /= tokens;
                    }
                }
                normalize(&mut pooled);
                embeddings.push(pooled);
            }
            Ok(embeddings)
        }
    }

    /// Sentence-transformers model run locally through ONNX Runtime.
    ///
    /// The model directory must contain `model.onnx` and `tokenizer.json`.
    /// Inference runs on the blocking pool; one session serves all callers.
    #[derive(Clone)]
    pub struct OnnxEmbedder {
        model: Arc<Mutex<Model>>,
        dim: usize,
    }

    impl OnnxEmbedder {
        pub fn load(model_dir: &Path) -> Result<Self, AiError> {
            let session = load_session(model_dir)?;
            let dim = infer_dim(session.outputs()[0].dtype()).unwrap_or(384);
            let tokenizer = load_tokenizer(model_dir, 256)?;
            info!(dim, model = %model_dir.display(), "loaded embedding model");
            Ok(Self {
                model: Arc::new(Mutex::new(Model {
                    session,
                    tokenizer,
                    dim,
                })),
                dim,
            })
        }
    }

    #[async_trait]
    impl Embed for OnnxEmbedder {
        fn dim(&self) -> usize {
            self.dim
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
            if texts.is_empty() {
                return Ok(Vec::new());
            }
            let model = Arc::clone(&self.model);
            let texts = texts.to_vec();
            debug!(count = texts.len(), "embedding batch");
            tokio::task::spawn_blocking(move || {
                let refs: Vec<&str> = texts.iter().map(String::as_str).collect();
                let mut model = model
                    .lock()
                    .map_err(|_| AiError::Model("embedding session lock poisoned".into()))?;
                model.embed_batch(&refs)
            })
            .await
            .map_err(model_err("embedding task"))?
        }
    }

    /// Last dimension of the model output, when the graph declares it.
    fn infer_dim(output_type: &ort::value::ValueType) -> Option<usize> {
        match output_type {
            ort::value::ValueType::Tensor { shape, .. } => shape
                .last()
                .and_then(|&d| if d > 0 { Some(d as usize) } else { None }),
            _ => None,
        }
    }

}

#[cfg(test)]
mod tests {
    use super::*;

    struct Fixed;

    #[async_trait]
    impl Embed for Fixed {
        fn dim(&self) -> usize {
            2
        }

        async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, AiError> {
            Ok(texts.iter().map(|t| vec![t.len() as f32, 1.0]).collect())
        }
    }

    #[tokio::test]
    async fn embed_single_uses_batch() {
        assert_eq!(Fixed.embed("abc").await.unwrap(), vec![3.0, 1.0]);
    }

    #[test]
    fn normalize_gives_unit_length() {
        let mut v = vec![3.0, 4.0];
        normalize(&mut v);
        assert!((v[0] - 0.6).abs() < 1e-6 && (v[1] - 0.8).abs() < 1e-6);

        let mut zero = vec![0.0, 0.0];
        normalize(&mut zero);
        assert_eq!(zero, vec![0.0, 0.0]);
    }
}
