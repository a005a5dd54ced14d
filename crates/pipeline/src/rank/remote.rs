//! Remote merge/rank adapter
//!
//! Train mode (correct answers supplied):
//! - Every question with at least one correct candidate contributes one row
//!   per candidate under a fresh group id: group, feature values, label.
//! - Questions without a correct candidate contribute nothing (recall filter).
//! - Answers pass through unchanged.
//!
//! Apply mode:
//! - The batch is sent to the ranking service, retried with a fixed delay.
//! - Confidences are matched back by label; unmatched candidates are dropped.
//!
//! `finish_training` submits the buffer, keeps a copy on disk and waits for
//! the remote job to become ready.

use crate::components::{AnswerStream, Component, CorrectAnswers, MergerAndRanker};
use answerforge_common::metrics;
use answerforge_common::ranking::{csv_field, FeatureTable, RankerStatus, RankingService};
use answerforge_common::{
    AppConfig, AppError, CandidateAnswer, IdSequence, Question, Result,
};
use async_trait::async_trait;
use futures::stream::{self, StreamExt, TryStreamExt};
use parking_lot::{Mutex, RwLock};
use std::collections::HashMap;
use std::fmt::Write as _;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, OnceLock};
use std::time::Duration;
use tracing::{debug, info, instrument, warn};

/// Column naming the question group in training data
pub const GROUP_COLUMN: &str = "question_id";
/// Column carrying the binary relevance label
pub const LABEL_COLUMN: &str = "ground_truth";

/// Log recall statistics after this many contributing questions
const RECALL_LOG_INTERVAL: u64 = 10;

/// One training row
#[derive(Debug, Clone, PartialEq)]
pub struct TrainingRow {
    pub group: u64,
    pub values: Vec<f64>,
    pub label: u8,
}

/// Rows accumulated across all training questions of a run
#[derive(Debug, Default)]
pub struct TrainingBuffer {
    header: Option<Vec<String>>,
    rows: Vec<TrainingRow>,
}

impl TrainingBuffer {
    pub fn header(&self) -> Option<&[String]> {
        self.header.as_deref()
    }

    pub fn rows(&self) -> &[TrainingRow] {
        &self.rows
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn to_csv(&self) -> String {
        let mut out = String::from(GROUP_COLUMN);
        for column in self.header.iter().flatten() {
            out.push(',');
            out.push_str(&csv_field(column));
        }
        let _ = writeln!(out, ",{}", LABEL_COLUMN);

        for row in &self.rows {
            let _ = write!(out, "{}", row.group);
            for value in &row.values {
                let _ = write!(out, ",{}", value);
            }
            let _ = writeln!(out, ",{}", row.label);
        }
        out
    }
}

/// Settings read at initialization
#[derive(Debug, Clone)]
struct RemoteSettings {
    retry_limit: u32,
    retry_delay: Duration,
    poll_interval: Duration,
    ranker_name: String,
    training_data_path: Option<PathBuf>,
}

pub struct RemoteMergerAndRanker {
    id: String,
    service: Arc<dyn RankingService>,
    group_ids: Arc<IdSequence>,
    settings: OnceLock<RemoteSettings>,
    buffer: Mutex<TrainingBuffer>,
    model_id: RwLock<Option<String>>,
    questions_seen: AtomicU64,
    questions_kept: AtomicU64,
}

impl RemoteMergerAndRanker {
    pub fn new(service: Arc<dyn RankingService>, group_ids: Arc<IdSequence>) -> Self {
        Self {
            id: "remote-ranker".to_string(),
            service,
            group_ids,
            settings: OnceLock::new(),
            buffer: Mutex::new(TrainingBuffer::default()),
            model_id: RwLock::new(None),
            questions_seen: AtomicU64::new(0),
            questions_kept: AtomicU64::new(0),
        }
    }

    fn settings(&self) -> Result<&RemoteSettings> {
        self.settings
            .get()
            .ok_or_else(|| AppError::config("remote ranker used before initialize"))
    }

    /// Model used in apply mode: trained in this run or configured
    pub fn model_id(&self) -> Option<String> {
        self.model_id.read().clone()
    }

    /// Snapshot of the training rows accumulated so far
    pub fn training_rows(&self) -> Vec<TrainingRow> {
        self.buffer.lock().rows.clone()
    }

    pub fn training_header(&self) -> Option<Vec<String>> {
        self.buffer.lock().header.clone()
    }

    fn accumulate(&self, question: &Question, answers: &[CandidateAnswer], correct: &CorrectAnswers) {
        if answers.is_empty() {
            debug!(question_id = %question.id, "No candidates to train on");
            return;
        }
        let seen = self.questions_seen.fetch_add(1, Ordering::Relaxed) + 1;

        if !answers.iter().any(|a| a.is_correct(correct)) {
            metrics::record_recall_filtered();
            debug!(question_id = %question.id, "No correct candidate, question skipped");
            return;
        }

        let mut buffer = self.buffer.lock();
        let group = self.group_ids.next();
        let header = buffer
            .header
            .get_or_insert_with(|| answers[0].features().keys().cloned().collect())
            .clone();

        for answer in answers {
            let values = header
                .iter()
                .map(|name| answer.feature(name).unwrap_or(0.0))
                .collect();
            buffer.rows.push(TrainingRow {
                group,
                values,
                label: u8::from(answer.is_correct(correct)),
            });
        }
        drop(buffer);
        metrics::record_training_rows(answers.len());

        let kept = self.questions_kept.fetch_add(1, Ordering::Relaxed) + 1;
        if kept % RECALL_LOG_INTERVAL == 0 {
            info!(
                questions_kept = kept,
                questions_seen = seen,
                "Training recall"
            );
        }
    }

    fn feature_table(&self, answers: &[CandidateAnswer]) -> FeatureTable {
        let columns: Vec<String> = match self.training_header() {
            Some(header) => header,
            None => answers[0].features().keys().cloned().collect(),
        };

        let mut table = FeatureTable::new(columns);
        for answer in answers {
            let values = table
                .columns
                .iter()
                .map(|name| answer.feature(name).unwrap_or(0.0))
                .collect();
            table.push(answer.label.clone(), values);
        }
        table
    }

    #[instrument(skip_all, fields(question_id = %question.id, answers = answers.len()))]
    async fn rank(&self, question: &Question, answers: Vec<CandidateAnswer>) -> Result<Vec<CandidateAnswer>> {
        if answers.is_empty() {
            return Ok(answers);
        }
        let settings = self.settings()?;
        let model_id = self
            .model_id()
            .ok_or_else(|| AppError::ranking("no trained or configured ranker model"))?;

        let table = self.feature_table(&answers);
        let ranked = self.rank_with_retry(settings, &model_id, &table).await?;

        let confidences: HashMap<&str, f64> = ranked
            .iter()
            .map(|r| (r.label.as_str(), r.confidence))
            .collect();

        Ok(answers
            .into_iter()
            .filter_map(|mut answer| {
                let confidence = confidences.get(answer.label.as_str()).copied()?;
                answer.confidence = Some(confidence);
                Some(answer)
            })
            .collect())
    }

    async fn rank_with_retry(
        &self,
        settings: &RemoteSettings,
        model_id: &str,
        table: &FeatureTable,
    ) -> Result<Vec<answerforge_common::ranking::RankedAnswer>> {
        let attempts = settings.retry_limit.saturating_add(1);
        let mut last_error = None;

        for attempt in 1..=attempts {
            if attempt > 1 {
                metrics::record_ranker_retry();
                tokio::time::sleep(settings.retry_delay).await;
            }

            match self.service.rank(model_id, table).await {
                Ok(ranked) => return Ok(ranked),
                Err(e) => {
                    warn!(
                        job_id = %model_id,
                        attempt,
                        max_attempts = attempts,
                        error = %e,
                        "Rank request failed"
                    );
                    last_error = Some(e);
                }
            }
        }

        Err(AppError::RetriesExhausted {
            attempts,
            message: last_error.map(|e| e.to_string()).unwrap_or_default(),
        })
    }

    async fn wait_until_ready(&self, settings: &RemoteSettings, job_id: &str) -> Result<()> {
        loop {
            match self.service.status(job_id).await? {
                RankerStatus::Ready => return Ok(()),
                RankerStatus::Failed => {
                    return Err(AppError::RankerFailed {
                        job_id: job_id.to_string(),
                    })
                }
                RankerStatus::Pending => {
                    info!(job_id, "Ranker still training");
                    tokio::time::sleep(settings.poll_interval).await;
                }
            }
        }
    }
}

#[async_trait]
impl Component for RemoteMergerAndRanker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn initialize(&self, config: &AppConfig) -> Result<()> {
        let retry_limit = config.ranker.retry_limit.ok_or_else(|| AppError::MissingOption {
            option: "ranker.retry_limit".to_string(),
        })?;

        let settings = RemoteSettings {
            retry_limit,
            retry_delay: config.retry_delay(),
            poll_interval: config.poll_interval(),
            ranker_name: config.ranker.ranker_name.clone(),
            training_data_path: config.ranker.training_data_path.clone(),
        };
        self.settings
            .set(settings)
            .map_err(|_| AppError::config("remote ranker is already initialized"))?;

        if let Some(model_id) = &config.ranker.model_id {
            *self.model_id.write() = Some(model_id.clone());
        }

        info!(
            service = self.service.name(),
            retry_limit,
            model_id = ?config.ranker.model_id,
            "Remote ranker initialized"
        );
        Ok(())
    }
}

#[async_trait]
impl MergerAndRanker for RemoteMergerAndRanker {
    async fn merge_and_rank(
        &self,
        question: Arc<Question>,
        answers: AnswerStream,
        correct: Option<CorrectAnswers>,
    ) -> Result<AnswerStream> {
        let answers: Vec<CandidateAnswer> = answers.try_collect().await?;

        let answers = match correct {
            Some(correct) => {
                self.accumulate(&question, &answers, &correct);
                answers
            }
            None => self.rank(&question, answers).await?,
        };

        Ok(stream::iter(answers.into_iter().map(Ok)).boxed())
    }

    async fn finish_training(&self) -> Result<()> {
        let settings = self.settings()?;
        let training_csv = {
            let buffer = self.buffer.lock();
            if buffer.is_empty() {
                warn!("No training rows accumulated, ranker training skipped");
                return Ok(());
            }
            buffer.to_csv()
        };

        info!(
            rows = self.buffer.lock().rows.len(),
            ranker_name = %settings.ranker_name,
            "Submitting ranker training data"
        );
        let job_id = self
            .service
            .submit_training(&settings.ranker_name, &training_csv)
            .await?;

        if let Some(path) = &settings.training_data_path {
            tokio::fs::write(path, &training_csv).await?;
            info!(path = %path.display(), "Training data written");
        }

        self.wait_until_ready(settings, &job_id).await?;
        info!(job_id = %job_id, "Ranker ready");
        *self.model_id.write() = Some(job_id);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::testing::ScriptedRankingService;
    use answerforge_common::ranking::RankedAnswer;
    use answerforge_common::CorrectAnswer;

    fn config(retry_limit: u32) -> AppConfig {
        let mut config = AppConfig::default();
        config.ranker.retry_limit = Some(retry_limit);
        config.ranker.retry_delay_ms = 1;
        config.ranker.poll_interval_secs = 0;
        config
    }

    async fn adapter(service: Arc<ScriptedRankingService>, retry_limit: u32) -> RemoteMergerAndRanker {
        let adapter = RemoteMergerAndRanker::new(service, Arc::new(IdSequence::new()));
        adapter.initialize(&config(retry_limit)).await.unwrap();
        adapter
    }

    fn candidates(ids: &IdSequence, labels: &[&str]) -> Vec<CandidateAnswer> {
        labels
            .iter()
            .enumerate()
            .map(|(i, label)| {
                let mut answer = CandidateAnswer::new(ids, *label, "test");
                answer.set_feature("search_score", 1.0 / (i + 1) as f64);
                answer.set_feature("title_overlap", 0.5);
                answer
            })
            .collect()
    }

    fn stream_of(answers: Vec<CandidateAnswer>) -> AnswerStream {
        stream::iter(answers.into_iter().map(Ok)).boxed()
    }

    fn correct(labels: &[&str]) -> CorrectAnswers {
        labels.iter().map(|l| CorrectAnswer::exact(*l)).collect::<Vec<_>>().into()
    }

    async fn run(
        adapter: &RemoteMergerAndRanker,
        question: &str,
        answers: Vec<CandidateAnswer>,
        correct: Option<CorrectAnswers>,
    ) -> Result<Vec<CandidateAnswer>> {
        adapter
            .merge_and_rank(Arc::new(Question::new(question, "text")), stream_of(answers), correct)
            .await?
            .try_collect()
            .await
    }

    #[tokio::test]
    async fn test_training_rows_share_group_and_label_correct_answer() {
        let service = Arc::new(ScriptedRankingService::new());
        let adapter = adapter(service, 3).await;
        let ids = IdSequence::new();

        let passed = run(&adapter, "q", candidates(&ids, &["42", "7", "13"]), Some(correct(&["42"])))
            .await
            .unwrap();
        assert_eq!(passed.len(), 3);

        let rows = adapter.training_rows();
        assert_eq!(rows.len(), 3);
        assert!(rows.iter().all(|r| r.group == rows[0].group));
        let labels: Vec<u8> = rows.iter().map(|r| r.label).collect();
        assert_eq!(labels, vec![1, 0, 0]);
        assert_eq!(
            adapter.training_header().unwrap(),
            vec!["search_score".to_string(), "title_overlap".to_string()]
        );

        run(&adapter, "q2", candidates(&ids, &["5", "6"]), Some(correct(&["6"])))
            .await
            .unwrap();
        let rows = adapter.training_rows();
        assert_eq!(rows.len(), 5);
        assert!(rows[3].group > rows[0].group);
    }

    #[tokio::test]
    async fn test_recall_filter_skips_unlearnable_question() {
        let adapter = adapter(Arc::new(ScriptedRankingService::new()), 3).await;
        let ids = IdSequence::new();

        run(&adapter, "q", candidates(&ids, &["1", "2"]), Some(correct(&["99"])))
            .await
            .unwrap();
        run(&adapter, "empty", vec![], Some(correct(&["99"]))).await.unwrap();

        assert!(adapter.training_rows().is_empty());
        assert!(adapter.training_header().is_none());
    }

    #[tokio::test]
    async fn test_missing_features_become_zero() {
        let adapter = adapter(Arc::new(ScriptedRankingService::new()), 3).await;
        let ids = IdSequence::new();

        run(&adapter, "q1", candidates(&ids, &["a"]), Some(correct(&["a"])))
            .await
            .unwrap();

        let mut sparse = CandidateAnswer::new(&ids, "b", "test");
        sparse.set_feature("title_overlap", 0.25);
        sparse.set_feature("unexpected", 9.0);
        run(&adapter, "q2", vec![sparse], Some(correct(&["b"])))
            .await
            .unwrap();

        let rows = adapter.training_rows();
        assert_eq!(rows[1].values, vec![0.0, 0.25]);
    }

    #[tokio::test]
    async fn test_rank_succeeds_on_third_attempt() {
        let service = Arc::new(ScriptedRankingService::new());
        service.fail_next(2);
        service.push_ranking(vec![
            RankedAnswer { label: "7".into(), confidence: 0.9 },
            RankedAnswer { label: "42".into(), confidence: 0.4 },
        ]);
        let adapter = adapter(service.clone(), 3).await;
        *adapter.model_id.write() = Some("model-1".into());
        let ids = IdSequence::new();

        let ranked = run(&adapter, "q", candidates(&ids, &["42", "7", "13"]), None)
            .await
            .unwrap();

        assert_eq!(service.rank_calls(), 3);
        let labels: Vec<&str> = ranked.iter().map(|a| a.label.as_str()).collect();
        assert_eq!(labels, vec!["42", "7"]);
        assert_eq!(ranked[1].confidence, Some(0.9));
    }

    #[tokio::test]
    async fn test_rank_gives_up_after_retry_limit() {
        let service = Arc::new(ScriptedRankingService::new());
        service.fail_next(10);
        let adapter = adapter(service.clone(), 3).await;
        *adapter.model_id.write() = Some("model-1".into());
        let ids = IdSequence::new();

        let err = run(&adapter, "q", candidates(&ids, &["1"]), None)
            .await
            .unwrap_err();

        assert!(matches!(err, AppError::RetriesExhausted { attempts: 4, .. }));
        assert!(err.is_ranking_service());
        assert_eq!(service.rank_calls(), 4);
    }

    #[tokio::test]
    async fn test_maximum_retry_limit_retries_without_overflow() {
        let service = Arc::new(ScriptedRankingService::new());
        service.fail_next(1);
        let adapter = adapter(service.clone(), u32::MAX).await;
        *adapter.model_id.write() = Some("model-1".into());
        let ids = IdSequence::new();

        let ranked = run(&adapter, "q", candidates(&ids, &["42", "7"]), None)
            .await
            .unwrap();

        assert_eq!(ranked.len(), 2);
        assert_eq!(service.rank_calls(), 2);
    }

    #[tokio::test]
    async fn test_empty_batch_skips_remote_call() {
        let service = Arc::new(ScriptedRankingService::new());
        let adapter = adapter(service.clone(), 0).await;

        let ranked = run(&adapter, "q", vec![], None).await.unwrap();
        assert!(ranked.is_empty());
        assert_eq!(service.rank_calls(), 0);
    }

    #[tokio::test]
    async fn test_apply_without_model_is_ranking_error() {
        let adapter = adapter(Arc::new(ScriptedRankingService::new()), 1).await;
        let ids = IdSequence::new();

        let err = run(&adapter, "q", candidates(&ids, &["1"]), None).await.unwrap_err();
        assert!(err.is_ranking_service());
    }

    #[tokio::test]
    async fn test_missing_retry_limit_is_configuration_error() {
        let adapter = RemoteMergerAndRanker::new(
            Arc::new(ScriptedRankingService::new()),
            Arc::new(IdSequence::new()),
        );
        let err = adapter.initialize(&AppConfig::default()).await.unwrap_err();
        assert!(matches!(err, AppError::MissingOption { .. }));
    }

    #[tokio::test]
    async fn test_finish_training_polls_until_ready() {
        let service = Arc::new(ScriptedRankingService::new());
        service.push_status(RankerStatus::Pending);
        service.push_status(RankerStatus::Ready);

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("training.csv");
        let adapter = RemoteMergerAndRanker::new(service.clone(), Arc::new(IdSequence::new()));
        let mut config = config(1);
        config.ranker.training_data_path = Some(path.clone());
        adapter.initialize(&config).await.unwrap();

        let ids = IdSequence::new();
        run(&adapter, "q", candidates(&ids, &["42", "7"]), Some(correct(&["42"])))
            .await
            .unwrap();
        adapter.finish_training().await.unwrap();

        let submitted = service.submitted();
        assert_eq!(submitted.len(), 1);
        assert!(submitted[0].starts_with("question_id,search_score,title_overlap,ground_truth\n"));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), submitted[0]);
        assert_eq!(service.status_calls(), 2);
        assert!(adapter.model_id().is_some());
    }

    #[tokio::test]
    async fn test_failed_ranker_is_fatal() {
        let service = Arc::new(ScriptedRankingService::new());
        service.push_status(RankerStatus::Failed);
        let adapter = adapter(service, 1).await;
        let ids = IdSequence::new();

        run(&adapter, "q", candidates(&ids, &["42"]), Some(correct(&["42"])))
            .await
            .unwrap();
        let err = adapter.finish_training().await.unwrap_err();
        assert!(matches!(err, AppError::RankerFailed { .. }));
    }

    #[tokio::test]
    async fn test_finish_training_with_empty_buffer_is_skipped() {
        let service = Arc::new(ScriptedRankingService::new());
        let adapter = adapter(service.clone(), 1).await;

        adapter.finish_training().await.unwrap();
        assert!(service.submitted().is_empty());
        assert!(adapter.model_id().is_none());
    }
}
