//! Pipeline component contracts
//!
//! A pipeline is assembled from independently developed components, one
//! list per stage:
//! - Question analysis: mutate the question before generation
//! - Answer generation: produce lazy candidate streams
//! - Evidence retrieval: attach supporting content to a candidate
//! - Search-result analysis: analyze candidate document, title and variant texts
//! - Scoring: add feature values
//! - Merge and rank: consume a stream, produce a new one
//! - Post-processing: see the final ranked list (apply mode only)
//!
//! Components are shared by every question in flight and must be safe for
//! concurrent use.

pub mod analysis;
pub mod generation;
pub mod scoring;

use answerforge_common::{
    AnalyzedText, AppConfig, CandidateAnswer, CorrectAnswer, Question, QuestionAnswerSet, Result,
};
use async_trait::async_trait;
use futures::stream::BoxStream;
use std::collections::HashSet;
use std::fmt;
use std::sync::Arc;

pub use analysis::LowercaseTokenizer;
pub use generation::{Corpus, CorpusAnswerGenerator, CorpusDocument};
pub use scoring::TitleOverlapScorer;

/// Lazy, finite stream of candidates flowing between stages
pub type AnswerStream = BoxStream<'static, Result<CandidateAnswer>>;

/// Ground truth shared between a question set and the stages
pub type CorrectAnswers = Arc<[CorrectAnswer]>;

/// Pipeline stage, used for error context and logs
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    QuestionAnalysis,
    AnswerGeneration,
    EvidenceRetrieval,
    SearchResultAnalysis,
    Scoring,
    MergeAndRank,
    Postprocessing,
    Training,
}

impl Stage {
    pub fn as_str(&self) -> &'static str {
        match self {
            Stage::QuestionAnalysis => "question_analysis",
            Stage::AnswerGeneration => "answer_generation",
            Stage::EvidenceRetrieval => "evidence_retrieval",
            Stage::SearchResultAnalysis => "search_result_analysis",
            Stage::Scoring => "scoring",
            Stage::MergeAndRank => "merge_and_rank",
            Stage::Postprocessing => "postprocessing",
            Stage::Training => "training",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Behaviour shared by every pipeline component
#[async_trait]
pub trait Component: Send + Sync {
    /// Stable identifier, stamped on generated candidates and used in logs
    fn id(&self) -> &str;

    /// Receive the run configuration. Called once, before any question.
    async fn initialize(&self, _config: &AppConfig) -> Result<()> {
        Ok(())
    }
}

/// Question-level analysis
#[async_trait]
pub trait QuestionAnalyzer: Component {
    async fn analyze_question(&self, question: &mut Question) -> Result<()>;
}

/// Text analysis applied to candidate search-result texts
pub trait TextAnalyzer: Component {
    fn analyze(&self, text: &mut AnalyzedText) -> Result<()>;
}

#[async_trait]
pub trait AnswerGenerator: Component {
    async fn generate(&self, question: Arc<Question>) -> Result<AnswerStream>;
}

#[async_trait]
pub trait EvidenceRetriever: Component {
    async fn retrieve_evidence(&self, question: &Question, answer: &mut CandidateAnswer)
        -> Result<()>;
}

#[async_trait]
pub trait AnswerScorer: Component {
    async fn score(&self, question: &Question, answer: &mut CandidateAnswer) -> Result<()>;
}

/// Merge and rank stage
///
/// `correct` is present only in train mode.
#[async_trait]
pub trait MergerAndRanker: Component {
    async fn merge_and_rank(
        &self,
        question: Arc<Question>,
        answers: AnswerStream,
        correct: Option<CorrectAnswers>,
    ) -> Result<AnswerStream>;

    /// Finalize whatever was learned during training. Called once per training run.
    async fn finish_training(&self) -> Result<()> {
        Ok(())
    }
}

#[async_trait]
pub trait AnswerPostprocessor: Component {
    async fn postprocess(
        &self,
        question: &Question,
        answers: &[CandidateAnswer],
        correct: Option<&[CorrectAnswer]>,
    ) -> Result<()>;

    async fn finish_postprocessing(&self) -> Result<()> {
        Ok(())
    }
}

/// Components that learn from a question set between folds
#[async_trait]
pub trait Trainable: Component {
    async fn train(&self, questions: &QuestionAnswerSet) -> Result<()>;
}

/// Registered components, one append-only list per stage
#[derive(Default, Clone)]
pub struct Stages {
    pub(crate) question_analyzers: Vec<Arc<dyn QuestionAnalyzer>>,
    pub(crate) generators: Vec<Arc<dyn AnswerGenerator>>,
    pub(crate) evidence_retrievers: Vec<Arc<dyn EvidenceRetriever>>,
    pub(crate) search_analyzers: Vec<Arc<dyn TextAnalyzer>>,
    pub(crate) scorers: Vec<Arc<dyn AnswerScorer>>,
    pub(crate) merge_rankers: Vec<Arc<dyn MergerAndRanker>>,
    pub(crate) postprocessors: Vec<Arc<dyn AnswerPostprocessor>>,
    pub(crate) trainables: Vec<Arc<dyn Trainable>>,
    // Every distinct component in registration order
    registered: Vec<Arc<dyn Component>>,
    seen: HashSet<usize>,
}

impl Stages {
    pub fn new() -> Self {
        Self::default()
    }

    fn register<T: Component + 'static>(&mut self, component: &Arc<T>) {
        let key = Arc::as_ptr(component) as *const () as usize;
        if self.seen.insert(key) {
            self.registered.push(component.clone());
        }
    }

    pub fn add_question_analyzer<T: QuestionAnalyzer + 'static>(&mut self, c: Arc<T>) -> &mut Self {
        self.register(&c);
        self.question_analyzers.push(c);
        self
    }

    pub fn add_generator<T: AnswerGenerator + 'static>(&mut self, c: Arc<T>) -> &mut Self {
        self.register(&c);
        self.generators.push(c);
        self
    }

    pub fn add_evidence_retriever<T: EvidenceRetriever + 'static>(&mut self, c: Arc<T>) -> &mut Self {
        self.register(&c);
        self.evidence_retrievers.push(c);
        self
    }

    pub fn add_search_analyzer<T: TextAnalyzer + 'static>(&mut self, c: Arc<T>) -> &mut Self {
        self.register(&c);
        self.search_analyzers.push(c);
        self
    }

    pub fn add_scorer<T: AnswerScorer + 'static>(&mut self, c: Arc<T>) -> &mut Self {
        self.register(&c);
        self.scorers.push(c);
        self
    }

    pub fn add_merge_ranker<T: MergerAndRanker + 'static>(&mut self, c: Arc<T>) -> &mut Self {
        self.register(&c);
        self.merge_rankers.push(c);
        self
    }

    pub fn add_postprocessor<T: AnswerPostprocessor + 'static>(&mut self, c: Arc<T>) -> &mut Self {
        self.register(&c);
        self.postprocessors.push(c);
        self
    }

    /// Mark a component as trainable. It may also be registered in a stage.
    pub fn add_trainable<T: Trainable + 'static>(&mut self, c: Arc<T>) -> &mut Self {
        self.register(&c);
        self.trainables.push(c);
        self
    }

    /// Distinct components in the order they were first registered
    pub fn components(&self) -> impl Iterator<Item = &Arc<dyn Component>> {
        self.registered.iter()
    }

    pub fn trainables(&self) -> &[Arc<dyn Trainable>] {
        &self.trainables
    }

    pub fn merge_rankers(&self) -> &[Arc<dyn MergerAndRanker>] {
        &self.merge_rankers
    }

    pub fn postprocessors(&self) -> &[Arc<dyn AnswerPostprocessor>] {
        &self.postprocessors
    }

    pub fn is_empty(&self) -> bool {
        self.registered.is_empty()
    }
}
