//! Command-line and environment configuration, and construction of the
//! runtime [`Resources`] from it.

use std::path::PathBuf;
use std::sync::Arc;

use alimtalk_agent::{
    ClassifierBackend, Collaborators, GeneratorKind, Resources, Settings, SourceLocation,
};
use alimtalk_ai::{
    ChatCompletionsClient, Embed, GenerationBackend, OnnxClassifier, OnnxEmbedder, OpenAiApi,
    OpenAiEmbedder, TextGenerationClient,
};
use alimtalk_store::{
    FsObjectStore, HttpObjectStore, LanceIndex, MemoryIndex, ObjectStore, PassageIndex,
};
use anyhow::Context;
use clap::{Args, ValueEnum};
use tracing::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum EmbedderArg {
    /// Local sentence-transformers model.
    Onnx,
    /// OpenAI-compatible embeddings endpoint.
    Openai,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum GeneratorArg {
    FineTuned,
    Llm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ClassifierArg {
    Direct,
    Judge,
}

#[derive(Debug, Args)]
pub struct Config {
    /// S3-compatible endpoint serving the policy document.
    #[arg(
        long,
        env = "OBJECT_ENDPOINT",
        default_value = "https://s3.ap-northeast-2.amazonaws.com",
        global = true
    )]
    pub object_endpoint: String,

    /// Read the policy document from `<root>/<bucket>/<key>` on disk instead.
    #[arg(long, env = "OBJECT_ROOT", global = true)]
    pub object_root: Option<PathBuf>,

    #[arg(long, env = "S3_BUCKET", default_value = "dr.hong-s3", global = true)]
    pub bucket: String,

    #[arg(long, env = "S3_KEY", default_value = "dataset/Guidelines.txt", global = true)]
    pub key: String,

    /// LanceDB directory. Without it the index lives in memory.
    #[arg(long, env = "INDEX_PATH", global = true)]
    pub index_path: Option<PathBuf>,

    #[arg(long, env = "COLLECTION", default_value = "template_guide", global = true)]
    pub collection: String,

    #[arg(long, env = "EMBEDDER", value_enum, default_value_t = EmbedderArg::Openai, global = true)]
    pub embedder: EmbedderArg,

    /// Directory with `model.onnx` and `tokenizer.json` for `--embedder onnx`.
    #[arg(long, env = "EMBED_MODEL_DIR", default_value = "models/embedding", global = true)]
    pub embed_model_dir: PathBuf,

    #[arg(long, env = "EMBEDDING_MODEL", default_value = "text-embedding-3-large", global = true)]
    pub embedding_model: String,

    /// Vector length produced by `--embedding-model`.
    #[arg(long, env = "EMBEDDING_DIM", default_value_t = 3072, global = true)]
    pub embedding_dim: usize,

    #[arg(long, env = "OPENAI_BASE_URL", default_value = "https://api.openai.com/v1", global = true)]
    pub openai_base_url: String,

    #[arg(long, env = "OPENAI_API_KEY", hide_env_values = true, global = true)]
    pub openai_api_key: Option<String>,

    #[arg(long, env = "LLM_MODEL", default_value = "gpt-4o-mini", global = true)]
    pub llm_model: String,

    #[arg(long, env = "GENERATOR", value_enum, default_value_t = GeneratorArg::Llm, global = true)]
    pub generator: GeneratorArg,

    /// Text-generation server hosting the fine-tuned model.
    #[arg(long, env = "GENERATOR_URL", default_value = "http://localhost:8080", global = true)]
    pub generator_url: String,

    #[arg(long, env = "CLASSIFIER", value_enum, default_value_t = ClassifierArg::Judge, global = true)]
    pub classifier: ClassifierArg,

    #[arg(long, env = "CLASSIFIER_MODEL_DIR", default_value = "models/classifier", global = true)]
    pub classifier_model_dir: PathBuf,

    /// Regeneration attempts after an unparseable draft.
    #[arg(long, env = "MAX_RETRIES", default_value_t = alimtalk_agent::DEFAULT_MAX_RETRIES, global = true)]
    pub max_retries: u32,

    #[arg(long, env = "TOP_K", default_value_t = alimtalk_agent::DEFAULT_TOP_K, global = true)]
    pub top_k: usize,
}

impl Config {
    fn openai(&self) -> OpenAiApi {
        OpenAiApi::new(self.openai_base_url.clone(), self.openai_api_key.clone())
    }

    fn object_store(&self) -> Arc<dyn ObjectStore> {
        match &self.object_root {
            Some(root) => {
                info!(root = %root.display(), "reading policy document from disk");
                Arc::new(FsObjectStore::new(root.clone()))
            }
            None => Arc::new(HttpObjectStore::new(self.object_endpoint.clone())),
        }
    }

    fn embedder(&self) -> anyhow::Result<Arc<dyn Embed>> {
        Ok(match self.embedder {
            EmbedderArg::Onnx => Arc::new(
                OnnxEmbedder::load(&self.embed_model_dir).with_context(|| {
                    format!("loading embedding model from {}", self.embed_model_dir.display())
                })?,
            ),
            EmbedderArg::Openai => Arc::new(OpenAiEmbedder::new(
                self.openai(),
                self.embedding_model.clone(),
                self.embedding_dim,
            )),
        })
    }

    async fn index(&self, dim: usize) -> anyhow::Result<Arc<dyn PassageIndex>> {
        Ok(match &self.index_path {
            Some(path) => Arc::new(
                LanceIndex::open(path, &self.collection, dim)
                    .await
                    .with_context(|| format!("opening LanceDB at {}", path.display()))?,
            ),
            None => {
                info!("no index path configured, using an in-memory index");
                Arc::new(MemoryIndex::new())
            }
        })
    }

    fn generation(&self) -> Arc<dyn GenerationBackend> {
        match self.generator {
            GeneratorArg::FineTuned => Arc::new(TextGenerationClient::new(self.generator_url.clone())),
            GeneratorArg::Llm => Arc::new(ChatCompletionsClient::new(self.openai(), self.llm_model.clone())),
        }
    }

    fn classifier(&self) -> anyhow::Result<ClassifierBackend> {
        Ok(match self.classifier {
            ClassifierArg::Direct => ClassifierBackend::Direct(Arc::new(
                OnnxClassifier::load(&self.classifier_model_dir).with_context(|| {
                    format!("loading classifier from {}", self.classifier_model_dir.display())
                })?,
            )),
            ClassifierArg::Judge => ClassifierBackend::Judge(Arc::new(ChatCompletionsClient::new(
                self.openai(),
                self.llm_model.clone(),
            ))),
        })
    }

    /// Load models and open the index. Runs once per process.
    pub async fn resources(&self) -> anyhow::Result<Resources> {
        let embedder = self.embedder()?;
        let index = self.index(embedder.dim()).await?;
        let collaborators = Collaborators {
            store: self.object_store(),
            index,
            embedder,
            generation: self.generation(),
            classifier: self.classifier()?,
        };

        let generator = match self.generator {
            GeneratorArg::FineTuned => GeneratorKind::FineTuned,
            GeneratorArg::Llm => GeneratorKind::Llm,
        };
        let mut settings = Settings::new(
            SourceLocation {
                bucket: self.bucket.clone(),
                key: self.key.clone(),
            },
            generator,
        );
        settings.max_retries = self.max_retries;
        settings.top_k = self.top_k;

        let resources = Resources::new(collaborators, settings);
        info!(
            generator = ?resources.generator_kind(),
            classifier = ?resources.classifier_kind(),
            top_k = resources.top_k(),
            "resources ready"
        );
        Ok(resources)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alimtalk_agent::ClassifierKind;
    use clap::{CommandFactory, FromArgMatches, Parser};

    #[derive(Parser)]
    struct TestCli {
        #[command(flatten)]
        config: Config,
    }

    /// Parse with every `env` source detached, so the host environment
    /// cannot shadow defaults.
    fn parse_isolated(args: &[&str]) -> TestCli {
        let matches = TestCli::command()
            .mut_args(|arg| arg.env(None::<&'static str>))
            .try_get_matches_from(args)
            .unwrap();
        TestCli::from_arg_matches(&matches).unwrap()
    }

    #[test]
    fn defaults_match_the_deployed_service() {
        let c = parse_isolated(&["alimtalk"]).config;
        assert_eq!(c.bucket, "dr.hong-s3");
        assert_eq!(c.key, "dataset/Guidelines.txt");
        assert_eq!(c.collection, "template_guide");
        assert_eq!(c.embedding_model, "text-embedding-3-large");
        assert_eq!(c.llm_model, "gpt-4o-mini");
        assert_eq!(c.generator, GeneratorArg::Llm);
        assert_eq!(c.classifier, ClassifierArg::Judge);
        assert_eq!(c.max_retries, 2);
        assert_eq!(c.top_k, 10);
        assert_eq!(c.embedding_dim, 3072);
        assert!(c.index_path.is_none());
    }

    #[test]
    fn strategies_parse_from_kebab_case() {
        let cli = TestCli::try_parse_from([
            "alimtalk",
            "--generator",
            "fine-tuned",
            "--classifier",
            "direct",
            "--embedder",
            "onnx",
        ])
        .unwrap();
        assert_eq!(cli.config.generator, GeneratorArg::FineTuned);
        assert_eq!(cli.config.classifier, ClassifierArg::Direct);
        assert_eq!(cli.config.embedder, EmbedderArg::Onnx);
    }

    #[tokio::test]
    async fn offline_setup_needs_no_models() {
        let cli = TestCli::try_parse_from([
            "alimtalk",
            "--object-root",
            "/nonexistent",
            "--embedding-dim",
            "8",
        ])
        .unwrap();
        let resources = cli.config.resources().await.unwrap();
        assert_eq!(resources.classifier_kind(), ClassifierKind::Judge);
        assert_eq!(resources.generator_kind(), GeneratorKind::Llm);
    }
}
