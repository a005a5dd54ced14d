//! Question answering orchestrator
//!
//! Composes the registered stages and runs every question through them:
//! 1. Question analysis, sequentially in registration order
//! 2. Answer generation, all generator streams merged into one
//! 3. Optional duplicate filtering by answer label, scoped to the question
//! 4. Evidence retrieval, search-result analysis, scoring per candidate
//! 5. The merge-and-rank chain, each stage consuming the previous stream
//! 6. Materialization into a list in natural order
//!
//! Questions run concurrently on the worker pool; the stages of one
//! question run strictly in sequence.

use crate::components::{AnswerStream, CorrectAnswers, Stage, Stages};
use crate::pool::WorkerPool;
use crate::training::{TrainingController, TrainingReport};
use answerforge_common::metrics::{self, QuestionMetrics};
use answerforge_common::{
    AnsweredQuestion, AppConfig, AppError, CandidateAnswer, PipelineSettings, Question,
    QuestionAnswerSet, Result,
};
use futures::future::BoxFuture;
use futures::stream::{self, BoxStream, StreamExt, TryStreamExt};
use futures::FutureExt;
use parking_lot::Mutex;
use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::{debug, error, info, info_span, instrument, warn, Instrument};

/// Result of one question of an apply run
#[derive(Debug)]
pub struct QuestionOutcome {
    pub question_id: String,
    pub result: Result<AnsweredQuestion>,
}

/// Outcome of one in-fold question during training
pub type TrainingOutcome = (String, Result<Vec<CandidateAnswer>>);

pub struct Orchestrator {
    stages: Arc<Stages>,
    settings: Option<PipelineSettings>,
    pool: Option<WorkerPool>,
    finished: AtomicBool,
}

impl Orchestrator {
    pub fn new(stages: Stages) -> Self {
        Self {
            stages: Arc::new(stages),
            settings: None,
            pool: None,
            finished: AtomicBool::new(false),
        }
    }

    pub fn stages(&self) -> &Stages {
        &self.stages
    }

    /// Hand the configuration to every component once, in registration
    /// order, then start the worker pool. The first failure is returned
    /// as is.
    pub async fn initialize(&mut self, config: &AppConfig) -> Result<()> {
        if self.settings.is_some() {
            return Err(AppError::config("orchestrator is already initialized"));
        }
        let settings = config.pipeline_settings()?;

        for component in self.stages.components() {
            debug!(component = component.id(), "Initializing component");
            component.initialize(config).await?;
        }

        self.pool = Some(WorkerPool::new(settings.num_threads, settings.queue_capacity));
        self.settings = Some(settings);

        info!(
            threads = settings.num_threads,
            num_folds = settings.num_folds,
            filter_duplicates = settings.filter_duplicates,
            components = self.stages.components().count(),
            "Orchestrator initialized"
        );
        Ok(())
    }

    /// Settings read at initialization
    pub fn settings(&self) -> Result<PipelineSettings> {
        self.settings
            .ok_or_else(|| AppError::config("orchestrator used before initialize"))
    }

    fn engine(&self) -> Result<Engine> {
        Ok(Engine {
            stages: self.stages.clone(),
            filter_duplicates: self.settings()?.filter_duplicates,
        })
    }

    fn pool(&self) -> Result<&WorkerPool> {
        self.pool
            .as_ref()
            .ok_or_else(|| AppError::config("orchestrator used before initialize"))
    }

    /// Run one question through the pipeline on the calling task.
    /// `correct` is present in train mode only.
    #[instrument(skip_all, fields(question_id = %question.id))]
    pub async fn process(
        &self,
        question: &Question,
        correct: Option<CorrectAnswers>,
    ) -> Result<Vec<CandidateAnswer>> {
        self.engine()?.process(question.clone(), correct).await
    }

    /// Apply-mode unit of work: process, post-process, compact
    #[instrument(skip_all, fields(question_id = %question.id))]
    pub async fn answer(
        &self,
        question: &Question,
        correct: Option<CorrectAnswers>,
    ) -> Result<AnsweredQuestion> {
        self.engine()?.answer(question.clone(), correct).await
    }

    /// Answer every question of the set on the worker pool.
    ///
    /// Outcomes are yielded as questions finish, in no particular order. A
    /// failed question yields an error outcome and does not affect the rest.
    pub fn apply(&self, questions: &QuestionAnswerSet) -> Result<BoxStream<'static, QuestionOutcome>> {
        let engine = self.engine()?;

        let tasks: Vec<(String, BoxFuture<'static, Result<AnsweredQuestion>>)> = questions
            .questions()
            .map(|question| {
                let correct = questions.correct_answers(&question.id);
                let correct = (!correct.is_empty()).then_some(correct);
                let span = info_span!("apply", question_id = %question.id);
                let engine = engine.clone();
                let id = question.id.clone();
                let question = Question::clone(question);

                let task = async move {
                    let timer = QuestionMetrics::start("apply");
                    let result = engine.answer(question, correct).await;
                    timer.finish(result.is_ok());
                    result
                }
                .instrument(span)
                .boxed();
                (id, task)
            })
            .collect();

        let batch = self.pool()?.run_batch(tasks)?;
        info!(questions = batch.len(), "Apply batch queued");

        Ok(batch
            .into_stream()
            .map(|(question_id, result)| {
                let result = result.map_err(|e| e.in_stage("worker", &question_id));
                if let Err(e) = &result {
                    log_question_failure(&question_id, e);
                }
                QuestionOutcome {
                    question_id,
                    result,
                }
            })
            .boxed())
    }

    /// Train-mode batch: process every question with its correct answers
    /// attached and wait for all of them to finish.
    pub async fn process_batch(&self, questions: &QuestionAnswerSet) -> Result<Vec<TrainingOutcome>> {
        let engine = self.engine()?;

        let tasks: Vec<(String, BoxFuture<'static, Result<Vec<CandidateAnswer>>>)> = questions
            .questions()
            .map(|question| {
                let correct = questions.correct_answers(&question.id);
                let span = info_span!("train", question_id = %question.id);
                let engine = engine.clone();
                let id = question.id.clone();
                let question = Question::clone(question);

                let task = async move {
                    let timer = QuestionMetrics::start("train");
                    let result = engine.process(question, Some(correct)).await;
                    timer.finish(result.is_ok());
                    result
                }
                .instrument(span)
                .boxed();
                (id, task)
            })
            .collect();

        let outcomes = self.pool()?.run_batch(tasks)?.join().await;

        Ok(outcomes
            .into_iter()
            .map(|(question_id, result)| {
                let result = result.map_err(|e| e.in_stage("worker", &question_id));
                if let Err(e) = &result {
                    log_question_failure(&question_id, e);
                }
                (question_id, result)
            })
            .collect())
    }

    /// Run the full training protocol; see [`TrainingController`]
    pub async fn train(
        &self,
        train_set: &QuestionAnswerSet,
        component_train_set: Option<&QuestionAnswerSet>,
    ) -> Result<TrainingReport> {
        TrainingController::new(self)
            .run(train_set, component_train_set)
            .await
    }

    /// Flush post-processors and shut the worker pool down.
    /// Terminal and idempotent.
    pub async fn finish(&self) -> Result<()> {
        if self.finished.swap(true, Ordering::SeqCst) {
            return Ok(());
        }

        let mut first_error = None;
        for postprocessor in self.stages.postprocessors() {
            if let Err(e) = postprocessor.finish_postprocessing().await {
                error!(component = postprocessor.id(), error = %e, "Post-processor failed to finish");
                first_error.get_or_insert(e);
            }
        }

        if let Some(pool) = &self.pool {
            pool.shutdown().await;
        }
        info!("Orchestrator finished");

        match first_error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

fn log_question_failure(question_id: &str, error: &AppError) {
    match error {
        AppError::Component { stage, .. } => {
            error!(question_id, stage = %stage, error = %error, "Question failed")
        }
        _ => error!(question_id, error = %error, "Question failed"),
    }
}

/// Per-question label set; never shared between questions
struct DuplicateFilter {
    enabled: bool,
    seen: Mutex<HashSet<String>>,
}

impl DuplicateFilter {
    fn new(enabled: bool) -> Self {
        Self {
            enabled,
            seen: Mutex::new(HashSet::new()),
        }
    }

    /// True the first time a label is offered
    fn admit(&self, label: &str) -> bool {
        !self.enabled || self.seen.lock().insert(label.to_string())
    }
}

/// The per-question work, cheap to clone into pool tasks
#[derive(Clone)]
struct Engine {
    stages: Arc<Stages>,
    filter_duplicates: bool,
}

impl Engine {
    async fn process(&self, question: Question, correct: Option<CorrectAnswers>) -> Result<Vec<CandidateAnswer>> {
        Ok(self.run(question, correct).await?.1)
    }

    async fn answer(&self, question: Question, correct: Option<CorrectAnswers>) -> Result<AnsweredQuestion> {
        let (question, mut answers) = self.run(question, None).await?;

        for postprocessor in &self.stages.postprocessors {
            postprocessor
                .postprocess(&question, &answers, correct.as_deref())
                .await
                .map_err(|e| e.in_stage(Stage::Postprocessing, &question.id))?;
        }

        answers.iter_mut().for_each(CandidateAnswer::compact);
        Ok(AnsweredQuestion { question, answers })
    }

    async fn run(
        &self,
        mut question: Question,
        correct: Option<CorrectAnswers>,
    ) -> Result<(Arc<Question>, Vec<CandidateAnswer>)> {
        let question_id = question.id.clone();

        for analyzer in &self.stages.question_analyzers {
            analyzer
                .analyze_question(&mut question)
                .await
                .map_err(|e| e.in_stage(Stage::QuestionAnalysis, &question_id))?;
        }
        let question = Arc::new(question);

        let mut streams = Vec::with_capacity(self.stages.generators.len());
        for generator in &self.stages.generators {
            let answers = generator
                .generate(question.clone())
                .await
                .map_err(|e| e.in_stage(Stage::AnswerGeneration, &question_id))?;
            streams.push(answers);
        }

        let filter = Arc::new(DuplicateFilter::new(self.filter_duplicates));
        let engine = self.clone();
        let current = question.clone();
        let mut answers: AnswerStream = stream::select_all(streams)
            .filter_map(move |item| {
                let engine = engine.clone();
                let question = current.clone();
                let filter = filter.clone();
                async move {
                    let answer = match item {
                        Ok(answer) => answer,
                        Err(e) => return Some(Err(e.in_stage(Stage::AnswerGeneration, &question.id))),
                    };
                    metrics::record_candidate_generated();

                    if !filter.admit(&answer.label) {
                        metrics::record_duplicate_dropped();
                        debug!(question_id = %question.id, label = %answer.label, "Duplicate answer dropped");
                        return None;
                    }
                    engine.enrich(&question, answer).await.transpose()
                }
            })
            .boxed();

        for ranker in &self.stages.merge_rankers {
            answers = ranker
                .merge_and_rank(question.clone(), answers, correct.clone())
                .await
                .map_err(|e| e.in_stage(Stage::MergeAndRank, &question_id))?;
        }

        let mut ranked: Vec<CandidateAnswer> = answers
            .try_collect()
            .await
            .map_err(|e| e.in_stage(Stage::MergeAndRank, &question_id))?;
        ranked.sort();

        debug!(question_id = %question_id, answers = ranked.len(), "Question processed");
        Ok((question, ranked))
    }

    /// Evidence, search-result analysis and scoring for one candidate.
    /// A non-fatal failure drops only this candidate.
    async fn enrich(&self, question: &Question, mut answer: CandidateAnswer) -> Result<Option<CandidateAnswer>> {
        for retriever in &self.stages.evidence_retrievers {
            if let Err(e) = retriever.retrieve_evidence(question, &mut answer).await {
                return isolate(Stage::EvidenceRetrieval, question, &answer, e);
            }
        }

        for analyzer in &self.stages.search_analyzers {
            let failure = answer
                .search_texts_mut()
                .map(|text| analyzer.analyze(text))
                .find_map(Result::err);
            if let Some(e) = failure {
                return isolate(Stage::SearchResultAnalysis, question, &answer, e);
            }
        }

        for scorer in &self.stages.scorers {
            if let Err(e) = scorer.score(question, &mut answer).await {
                return isolate(Stage::Scoring, question, &answer, e);
            }
        }

        Ok(Some(answer))
    }
}

fn isolate(
    stage: Stage,
    question: &Question,
    answer: &CandidateAnswer,
    error: AppError,
) -> Result<Option<CandidateAnswer>> {
    if error.is_fatal() {
        return Err(error);
    }
    warn!(
        question_id = %question.id,
        stage = %stage,
        label = %answer.label,
        error = %error,
        "Candidate dropped after stage failure"
    );
    metrics::record_candidate_isolated(stage.as_str());
    Ok(None)
}
