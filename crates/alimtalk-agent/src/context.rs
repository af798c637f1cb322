//! Process-lifetime resource handles.
//!
//! Everything a request needs is owned here and passed explicitly; the
//! strategies are chosen once when the context is built.

use std::sync::Arc;

use alimtalk_ai::{Embed, GenerationBackend, SequenceClassifier};
use alimtalk_store::{ObjectStore, PassageIndex};

use crate::{
    DEFAULT_MAX_RETRIES, DEFAULT_TOP_K, DirectClassifier, FineTunedGenerator, Indexer,
    JudgeClassifier, LlmGenerator, Orchestrator, Retriever, SourceLocation, TemplateClassifier,
    TemplateGenerator,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GeneratorKind {
    /// Completion model fine-tuned on template records.
    FineTuned,
    /// General instruction-following chat model.
    Llm,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ClassifierKind {
    Direct,
    Judge,
}

/// Model behind the selected classifier strategy.
pub enum ClassifierBackend {
    Direct(Arc<dyn SequenceClassifier>),
    Judge(Arc<dyn GenerationBackend>),
}

impl ClassifierBackend {
    pub fn kind(&self) -> ClassifierKind {
        match self {
            Self::Direct(_) => ClassifierKind::Direct,
            Self::Judge(_) => ClassifierKind::Judge,
        }
    }
}

/// External collaborators, constructed by the caller.
pub struct Collaborators {
    pub store: Arc<dyn ObjectStore>,
    pub index: Arc<dyn PassageIndex>,
    pub embedder: Arc<dyn Embed>,
    /// Backend for the selected generator strategy.
    pub generation: Arc<dyn GenerationBackend>,
    pub classifier: ClassifierBackend,
}

#[derive(Debug, Clone)]
pub struct Settings {
    pub source: SourceLocation,
    pub generator: GeneratorKind,
    pub max_retries: u32,
    pub top_k: usize,
}

impl Settings {
    pub fn new(source: SourceLocation, generator: GeneratorKind) -> Self {
        Self {
            source,
            generator,
            max_retries: DEFAULT_MAX_RETRIES,
            top_k: DEFAULT_TOP_K,
        }
    }
}

pub struct Resources {
    indexer: Arc<Indexer>,
    retriever: Arc<Retriever>,
    generator: Arc<dyn TemplateGenerator>,
    classifier: Arc<dyn TemplateClassifier>,
    generator_kind: GeneratorKind,
    classifier_kind: ClassifierKind,
    max_retries: u32,
    top_k: usize,
}

impl Resources {
    pub fn new(collaborators: Collaborators, settings: Settings) -> Self {
        let Collaborators {
            store,
            index,
            embedder,
            generation,
            classifier,
        } = collaborators;

        let indexer = Arc::new(Indexer::new(store, index, embedder, settings.source));
        let retriever = Arc::new(Retriever::new(indexer.clone()));

        let generator: Arc<dyn TemplateGenerator> = match settings.generator {
            GeneratorKind::FineTuned => Arc::new(FineTunedGenerator::new(generation)),
            GeneratorKind::Llm => Arc::new(LlmGenerator::new(generation)),
        };
        let classifier_kind = classifier.kind();
        let classifier: Arc<dyn TemplateClassifier> = match classifier {
            ClassifierBackend::Direct(model) => Arc::new(DirectClassifier::new(model)),
            ClassifierBackend::Judge(backend) => Arc::new(JudgeClassifier::new(
                retriever.clone(),
                backend,
                settings.top_k,
            )),
        };

        Self {
            indexer,
            retriever,
            generator,
            classifier,
            generator_kind: settings.generator,
            classifier_kind,
            max_retries: settings.max_retries,
            top_k: settings.top_k,
        }
    }

    pub fn indexer(&self) -> &Arc<Indexer> {
        &self.indexer
    }

    pub fn retriever(&self) -> &Arc<Retriever> {
        &self.retriever
    }

    pub fn classifier(&self) -> &Arc<dyn TemplateClassifier> {
        &self.classifier
    }

    /// A drafting loop over the shared retriever and generator.
    pub fn orchestrator(&self) -> Orchestrator {
        Orchestrator::new(
            self.retriever.clone(),
            self.generator.clone(),
            self.max_retries,
            self.top_k,
        )
    }

    pub fn generator_kind(&self) -> GeneratorKind {
        self.generator_kind
    }

    pub fn classifier_kind(&self) -> ClassifierKind {
        self.classifier_kind
    }

    pub fn top_k(&self) -> usize {
        self.top_k
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::{BagOfWords, FixedLogits, ScriptedBackend, StaticObjectStore};
    use alimtalk_core::{Template, TemplateRequest};
    use alimtalk_store::MemoryIndex;

    fn resources(classifier: ClassifierBackend, generation: Arc<ScriptedBackend>) -> Resources {
        Resources::new(
            Collaborators {
                store: Arc::new(StaticObjectStore::new("one\n\ntwo")),
                index: Arc::new(MemoryIndex::new()),
                embedder: Arc::new(BagOfWords::new(16)),
                generation,
                classifier,
            },
            Settings::new(
                SourceLocation {
                    bucket: "b".into(),
                    key: "k".into(),
                },
                GeneratorKind::FineTuned,
            ),
        )
    }

    #[tokio::test]
    async fn wires_selected_strategies() {
        let generation = Arc::new(ScriptedBackend::new(["template: {\"title\":\"T\",\"text\":\"X\"}"]));
        let res = resources(
            ClassifierBackend::Direct(Arc::new(FixedLogits::new([2.0, 0.0]))),
            generation.clone(),
        );
        assert_eq!(res.generator_kind(), GeneratorKind::FineTuned);
        assert_eq!(res.classifier_kind(), ClassifierKind::Direct);

        let output = res
            .orchestrator()
            .run(&TemplateRequest {
                original_template: Template::default(),
                user_input: "new notice".into(),
            })
            .await
            .unwrap();
        assert_eq!(output.template, Template::new("T", "X"));
        assert!(generation.prompts()[0].starts_with("original_template: "));
        assert_eq!(res.indexer().count().await.unwrap(), 2);
    }

    #[tokio::test]
    async fn judge_shares_the_retriever() {
        let judge = Arc::new(ScriptedBackend::new([
            r#"{"prediction":"Approved","confidence":0.9,"probabilities":{"Approved":0.9,"Not Approved":0.1}}"#,
        ]));
        let res = resources(ClassifierBackend::Judge(judge), Arc::new(ScriptedBackend::default()));
        assert_eq!(res.classifier_kind(), ClassifierKind::Judge);

        let result = res.classifier().classify(&Template::new("T", "X")).await.unwrap();
        assert!(result.confidence > 0.5);
        // Judging built the index through the shared indexer.
        assert_eq!(res.indexer().count().await.unwrap(), 2);
    }
}
