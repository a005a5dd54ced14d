//! Scripted components shared by the unit tests

use crate::components::{
    AnswerGenerator, AnswerPostprocessor, AnswerScorer, AnswerStream, Component, CorrectAnswers,
    EvidenceRetriever, MergerAndRanker, QuestionAnalyzer, TextAnalyzer, Trainable,
};
use answerforge_common::ranking::{FeatureTable, RankedAnswer, RankerStatus, RankingService};
use answerforge_common::{
    AnalyzedText, AnswerPayload, AppConfig, AppError, CandidateAnswer, CorrectAnswer, IdSequence,
    Question, QuestionAnswerSet, Result,
};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;

/// Shared record of component calls in the order they happened
pub type EventLog = Arc<Mutex<Vec<String>>>;

fn log_event(log: &Option<EventLog>, event: &str) {
    if let Some(log) = log {
        log.lock().push(event.to_string());
    }
}

/// Candidate ids shared by every scripted generator in the test binary
fn shared_ids() -> Arc<IdSequence> {
    static IDS: OnceLock<Arc<IdSequence>> = OnceLock::new();
    IDS.get_or_init(|| Arc::new(IdSequence::new())).clone()
}

/// Emits a fixed label list, optionally per question.
/// Earlier labels get a higher `search_score`.
pub struct ScriptedGenerator {
    id: String,
    labels: Vec<String>,
    per_question: HashMap<String, Vec<String>>,
    failing: Option<String>,
    ids: Arc<IdSequence>,
    payload: Option<AnswerPayload>,
    delay: Option<Duration>,
    init_log: Option<EventLog>,
    pub initialized: AtomicUsize,
}

impl ScriptedGenerator {
    pub fn new(id: &str, labels: Vec<&str>) -> Self {
        Self {
            id: id.to_string(),
            labels: labels.into_iter().map(String::from).collect(),
            per_question: HashMap::new(),
            failing: None,
            ids: shared_ids(),
            payload: None,
            delay: None,
            init_log: None,
            initialized: AtomicUsize::new(0),
        }
    }

    pub fn on(mut self, question_id: &str, labels: Vec<&str>) -> Self {
        self.per_question
            .insert(question_id.to_string(), labels.into_iter().map(String::from).collect());
        self
    }

    pub fn failing_for(mut self, question_id: &str) -> Self {
        self.failing = Some(question_id.to_string());
        self
    }

    pub fn with_ids(mut self, ids: Arc<IdSequence>) -> Self {
        self.ids = ids;
        self
    }

    /// Attach a copy of `payload` to every candidate
    pub fn with_payload(mut self, payload: AnswerPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn with_delay(mut self, delay: Duration) -> Self {
        self.delay = Some(delay);
        self
    }

    pub fn logging_to(mut self, log: EventLog) -> Self {
        self.init_log = Some(log);
        self
    }
}

#[async_trait]
impl Component for ScriptedGenerator {
    fn id(&self) -> &str {
        &self.id
    }

    async fn initialize(&self, _config: &AppConfig) -> Result<()> {
        self.initialized.fetch_add(1, Ordering::SeqCst);
        log_event(&self.init_log, &self.id);
        Ok(())
    }
}

#[async_trait]
impl AnswerGenerator for ScriptedGenerator {
    async fn generate(&self, question: Arc<Question>) -> Result<AnswerStream> {
        if self.failing.as_deref() == Some(question.id.as_str()) {
            return Err(AppError::InvalidData {
                message: format!("no answers for {}", question.id),
            });
        }
        if let Some(delay) = self.delay {
            tokio::time::sleep(delay).await;
        }

        let labels = self.per_question.get(&question.id).unwrap_or(&self.labels);
        let count = labels.len();
        let answers: Vec<Result<CandidateAnswer>> = labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let mut answer = CandidateAnswer::new(&self.ids, label.as_str(), self.id.as_str());
                if let Some(payload) = &self.payload {
                    answer = answer.with_payload(payload.clone());
                }
                answer.set_feature("search_score", (count - i) as f64 / count as f64);
                Ok(answer)
            })
            .collect();

        Ok(stream::iter(answers).boxed())
    }
}

/// Counts score calls per label and can fail or panic on chosen labels
pub struct CountingScorer {
    id: String,
    calls: Mutex<HashMap<String, usize>>,
    fail_on: Option<String>,
    panic_on: Option<String>,
    in_flight: Option<Arc<AtomicUsize>>,
    init_log: Option<EventLog>,
    events: Option<EventLog>,
}

impl CountingScorer {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            calls: Mutex::new(HashMap::new()),
            fail_on: None,
            panic_on: None,
            in_flight: None,
            init_log: None,
            events: None,
        }
    }

    /// Log `score:<label>` for every call
    pub fn recording(mut self, events: EventLog) -> Self {
        self.events = Some(events);
        self
    }

    pub fn fail_on(mut self, label: &str) -> Self {
        self.fail_on = Some(label.to_string());
        self
    }

    pub fn panic_on(mut self, label: &str) -> Self {
        self.panic_on = Some(label.to_string());
        self
    }

    /// Track how many score calls are running at once
    pub fn tracking(mut self, in_flight: Arc<AtomicUsize>) -> Self {
        self.in_flight = Some(in_flight);
        self
    }

    pub fn logging_to(mut self, log: EventLog) -> Self {
        self.init_log = Some(log);
        self
    }

    pub fn calls(&self, label: &str) -> usize {
        self.calls.lock().get(label).copied().unwrap_or(0)
    }

    pub fn total_calls(&self) -> usize {
        self.calls.lock().values().sum()
    }
}

#[async_trait]
impl Component for CountingScorer {
    fn id(&self) -> &str {
        &self.id
    }

    async fn initialize(&self, _config: &AppConfig) -> Result<()> {
        log_event(&self.init_log, &self.id);
        Ok(())
    }
}

#[async_trait]
impl AnswerScorer for CountingScorer {
    async fn score(&self, _question: &Question, answer: &mut CandidateAnswer) -> Result<()> {
        *self.calls.lock().entry(answer.label.clone()).or_default() += 1;
        log_event(&self.events, &format!("score:{}", answer.label));

        if self.panic_on.as_deref() == Some(answer.label.as_str()) {
            panic!("scorer panicked on {}", answer.label);
        }
        if self.fail_on.as_deref() == Some(answer.label.as_str()) {
            return Err(AppError::InvalidData {
                message: format!("cannot score {}", answer.label),
            });
        }

        if let Some(in_flight) = &self.in_flight {
            in_flight.fetch_add(1, Ordering::SeqCst);
            tokio::time::sleep(Duration::from_millis(5)).await;
            in_flight.fetch_sub(1, Ordering::SeqCst);
        }

        answer.set_feature(self.id.clone(), 1.0);
        Ok(())
    }
}

/// Fails analysis for one question id
pub struct FailingAnalyzer {
    question_id: String,
}

impl FailingAnalyzer {
    pub fn new(question_id: &str) -> Self {
        Self {
            question_id: question_id.to_string(),
        }
    }
}

#[async_trait]
impl Component for FailingAnalyzer {
    fn id(&self) -> &str {
        "failing-analyzer"
    }
}

#[async_trait]
impl QuestionAnalyzer for FailingAnalyzer {
    async fn analyze_question(&self, question: &mut Question) -> Result<()> {
        if question.id == self.question_id {
            return Err(AppError::InvalidData {
                message: "unparseable question".into(),
            });
        }
        Ok(())
    }
}

/// Appends an `evidence for <label>` question variant to candidates carrying a payload
pub struct RecordingRetriever {
    events: EventLog,
    fail_on: Option<String>,
}

impl RecordingRetriever {
    pub fn new(events: EventLog) -> Self {
        Self { events, fail_on: None }
    }

    pub fn fail_on(mut self, label: &str) -> Self {
        self.fail_on = Some(label.to_string());
        self
    }
}

#[async_trait]
impl Component for RecordingRetriever {
    fn id(&self) -> &str {
        "recording-retriever"
    }
}

#[async_trait]
impl EvidenceRetriever for RecordingRetriever {
    async fn retrieve_evidence(&self, _question: &Question, answer: &mut CandidateAnswer) -> Result<()> {
        self.events.lock().push(format!("retrieve:{}", answer.label));
        if self.fail_on.as_deref() == Some(answer.label.as_str()) {
            return Err(AppError::InvalidData {
                message: format!("no evidence for {}", answer.label),
            });
        }

        let variant = AnalyzedText::new(format!("evidence for {}", answer.label));
        if let Some(payload) = answer.payload_mut() {
            payload.question_variants.push(variant);
        }
        Ok(())
    }
}

/// Logs `analyze:<text>` for every text it sees and tags each one as analyzed
pub struct RecordingTextAnalyzer {
    events: EventLog,
    fail_on: Option<String>,
}

impl RecordingTextAnalyzer {
    pub fn new(events: EventLog) -> Self {
        Self { events, fail_on: None }
    }

    pub fn fail_on(mut self, text: &str) -> Self {
        self.fail_on = Some(text.to_string());
        self
    }

    pub fn calls(&self) -> usize {
        self.events
            .lock()
            .iter()
            .filter(|e| e.starts_with("analyze:"))
            .count()
    }
}

#[async_trait]
impl Component for RecordingTextAnalyzer {
    fn id(&self) -> &str {
        "recording-text-analyzer"
    }
}

impl TextAnalyzer for RecordingTextAnalyzer {
    fn analyze(&self, text: &mut AnalyzedText) -> Result<()> {
        self.events.lock().push(format!("analyze:{}", text.text));
        if self.fail_on.as_deref() == Some(text.text.as_str()) {
            return Err(AppError::InvalidData {
                message: format!("cannot analyze {}", text.text),
            });
        }
        text.parsed = Some(text.text.to_lowercase());
        Ok(())
    }
}

/// Removes one label from the stream
pub struct DroppingRanker {
    id: String,
    label: String,
}

impl DroppingRanker {
    pub fn new(id: &str, label: &str) -> Self {
        Self {
            id: id.to_string(),
            label: label.to_string(),
        }
    }
}

#[async_trait]
impl Component for DroppingRanker {
    fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl MergerAndRanker for DroppingRanker {
    async fn merge_and_rank(
        &self,
        _question: Arc<Question>,
        answers: AnswerStream,
        _correct: Option<CorrectAnswers>,
    ) -> Result<AnswerStream> {
        let label = self.label.clone();
        Ok(answers
            .filter(move |item| {
                let keep = !matches!(item, Ok(answer) if answer.label == label);
                futures::future::ready(keep)
            })
            .boxed())
    }
}

/// Records every train call and how much work was in flight at the time
pub struct RecordingTrainable {
    id: String,
    in_flight: Option<Arc<AtomicUsize>>,
    pub trained_sizes: Mutex<Vec<usize>>,
    pub in_flight_at_train: Mutex<Vec<usize>>,
}

impl RecordingTrainable {
    pub fn new(id: &str) -> Self {
        Self {
            id: id.to_string(),
            in_flight: None,
            trained_sizes: Mutex::new(vec![]),
            in_flight_at_train: Mutex::new(vec![]),
        }
    }

    pub fn tracking(mut self, in_flight: Arc<AtomicUsize>) -> Self {
        self.in_flight = Some(in_flight);
        self
    }

    pub fn train_calls(&self) -> usize {
        self.trained_sizes.lock().len()
    }
}

#[async_trait]
impl Component for RecordingTrainable {
    fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl Trainable for RecordingTrainable {
    async fn train(&self, questions: &QuestionAnswerSet) -> Result<()> {
        self.trained_sizes.lock().push(questions.len());
        if let Some(in_flight) = &self.in_flight {
            self.in_flight_at_train
                .lock()
                .push(in_flight.load(Ordering::SeqCst));
        }
        Ok(())
    }
}

/// Passes answers through and counts train-mode calls
#[derive(Default)]
pub struct CountingRanker {
    pub with_correct: AtomicUsize,
    pub without_correct: AtomicUsize,
    pub finish_calls: AtomicUsize,
}

#[async_trait]
impl Component for CountingRanker {
    fn id(&self) -> &str {
        "counting-ranker"
    }
}

#[async_trait]
impl MergerAndRanker for CountingRanker {
    async fn merge_and_rank(
        &self,
        _question: Arc<Question>,
        answers: AnswerStream,
        correct: Option<CorrectAnswers>,
    ) -> Result<AnswerStream> {
        match correct {
            Some(_) => self.with_correct.fetch_add(1, Ordering::SeqCst),
            None => self.without_correct.fetch_add(1, Ordering::SeqCst),
        };
        Ok(answers)
    }

    async fn finish_training(&self) -> Result<()> {
        self.finish_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// What a postprocessor saw for one question
#[derive(Debug, Clone)]
pub struct SeenQuestion {
    pub question_id: String,
    pub labels: Vec<String>,
    pub features_present: bool,
    pub had_correct: bool,
}

#[derive(Default)]
pub struct RecordingPostprocessor {
    pub seen: Mutex<Vec<SeenQuestion>>,
    pub finish_calls: AtomicUsize,
}

#[async_trait]
impl Component for RecordingPostprocessor {
    fn id(&self) -> &str {
        "recording-postprocessor"
    }
}

#[async_trait]
impl AnswerPostprocessor for RecordingPostprocessor {
    async fn postprocess(
        &self,
        question: &Question,
        answers: &[CandidateAnswer],
        correct: Option<&[CorrectAnswer]>,
    ) -> Result<()> {
        self.seen.lock().push(SeenQuestion {
            question_id: question.id.clone(),
            labels: answers.iter().map(|a| a.label.clone()).collect(),
            features_present: answers.iter().all(|a| !a.features().is_empty()),
            had_correct: correct.is_some(),
        });
        Ok(())
    }

    async fn finish_postprocessing(&self) -> Result<()> {
        self.finish_calls.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Ranking service replaying scripted responses
#[derive(Default)]
pub struct ScriptedRankingService {
    failures_left: AtomicUsize,
    rankings: Mutex<VecDeque<Vec<RankedAnswer>>>,
    statuses: Mutex<VecDeque<RankerStatus>>,
    submitted: Mutex<Vec<String>>,
    rank_calls: AtomicUsize,
    status_calls: AtomicUsize,
}

impl ScriptedRankingService {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next `n` rank calls fail
    pub fn fail_next(&self, n: usize) {
        self.failures_left.store(n, Ordering::SeqCst);
    }

    pub fn push_ranking(&self, ranking: Vec<RankedAnswer>) {
        self.rankings.lock().push_back(ranking);
    }

    /// Queue a status; `Ready` once the queue is empty
    pub fn push_status(&self, status: RankerStatus) {
        self.statuses.lock().push_back(status);
    }

    pub fn submitted(&self) -> Vec<String> {
        self.submitted.lock().clone()
    }

    pub fn rank_calls(&self) -> usize {
        self.rank_calls.load(Ordering::SeqCst)
    }

    pub fn status_calls(&self) -> usize {
        self.status_calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RankingService for ScriptedRankingService {
    async fn submit_training(&self, _name: &str, training_csv: &str) -> Result<String> {
        let mut submitted = self.submitted.lock();
        submitted.push(training_csv.to_string());
        Ok(format!("job-{}", submitted.len()))
    }

    async fn status(&self, _job_id: &str) -> Result<RankerStatus> {
        self.status_calls.fetch_add(1, Ordering::SeqCst);
        Ok(self
            .statuses
            .lock()
            .pop_front()
            .unwrap_or(RankerStatus::Ready))
    }

    async fn rank(&self, model_id: &str, table: &FeatureTable) -> Result<Vec<RankedAnswer>> {
        self.rank_calls.fetch_add(1, Ordering::SeqCst);
        let failing = self
            .failures_left
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(AppError::RankingService {
                message: "service unavailable".into(),
                job_id: Some(model_id.to_string()),
            });
        }

        Ok(self.rankings.lock().pop_front().unwrap_or_else(|| {
            table
                .rows
                .iter()
                .map(|(label, _)| RankedAnswer {
                    label: label.clone(),
                    confidence: 0.5,
                })
                .collect()
        }))
    }

    fn name(&self) -> &str {
        "scripted"
    }
}
