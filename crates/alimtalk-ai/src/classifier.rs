//! Binary approval classifier over template text.

use async_trait::async_trait;

use crate::AiError;

/// A two-class sequence classifier. Index 0 is "Not Approved", index 1 is
/// "Approved".
#[async_trait]
pub trait SequenceClassifier: Send + Sync {
    async fn logits(&self, text: &str) -> Result<[f32; 2], AiError>;
}

#[cfg(feature = "onnx")]
pub use onnx::OnnxClassifier;

#[cfg(feature = "onnx")]
mod onnx {
    use std::path::Path;
    use std::sync::{Arc, Mutex};

    use async_trait::async_trait;
    use ort::session::Session;
    use tokenizers::Tokenizer;
    use tracing::info;

    use super::SequenceClassifier;
    use crate::AiError;
    use crate::embedder::{Encoded, load_session, load_tokenizer, model_err};

    /// Inputs longer than this many tokens are truncated.
    const MAX_LENGTH: usize = 512;

    struct Model {
        session: Session,
        tokenizer: Tokenizer,
    }

    /// Fine-tuned BERT-style classifier run through ONNX Runtime.
    ///
    /// The model directory must contain `model.onnx` (outputting `[1, 2]`
    /// logits) and `tokenizer.json`.
    #[derive(Clone)]
    pub struct OnnxClassifier {
        model: Arc<Mutex<Model>>,
    }

    impl OnnxClassifier {
        pub fn load(model_dir: &Path) -> Result<Self, AiError> {
            let session = load_session(model_dir)?;
            let tokenizer = load_tokenizer(model_dir, MAX_LENGTH)?;
            info!(model = %model_dir.display(), "loaded approval classifier");
            Ok(Self {
                model: Arc::new(Mutex::new(Model { session, tokenizer })),
            })
        }
    }

    #[async_trait]
    impl SequenceClassifier for OnnxClassifier {
        async fn logits(&self, text: &str) -> Result<[f32; 2], AiError> {
            let model = Arc::clone(&self.model);
            let text = text.to_string();
            tokio::task::spawn_blocking(move || {
                let mut model = model
                    .lock()
                    .map_err(|_| AiError::Model("classifier session lock poisoned".into()))?;
                let Model { session, tokenizer } = &mut *model;
                let enc = Encoded::new(tokenizer, &[text.as_str()])?;
                let (dims, data) = enc.run(session)?;
                match (dims.as_slice(), data.as_slice()) {
                    ([1, 2], [l0, l1]) => Ok([*l0, *l1]),
                    _ => Err(AiError::Model(format!(
                        "unexpected classifier output shape {dims:?}"
                    ))),
                }
            })
            .await
            .map_err(model_err("classifier task"))?
        }
    }

}
