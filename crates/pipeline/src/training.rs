//! Fold-based training
//!
//! For each fold, trainable components learn from the out-of-fold set, then
//! every in-fold question runs through the pipeline with its correct
//! answers attached. The fold is joined before the next one starts so that
//! retraining never races with questions still in flight.

use crate::components::Stage;
use crate::orchestrator::Orchestrator;
use answerforge_common::{AppError, Fold, QuestionAnswerSet, Result};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::sync::Arc;
use tracing::{error, info, instrument};

/// Summary of one training run
#[derive(Debug, Clone, Serialize)]
pub struct TrainingReport {
    pub folds: usize,
    pub questions: usize,
    pub failures: usize,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
}

pub struct TrainingController<'a> {
    orchestrator: &'a Orchestrator,
}

impl<'a> TrainingController<'a> {
    pub fn new(orchestrator: &'a Orchestrator) -> Self {
        Self { orchestrator }
    }

    /// Build the folds for this run.
    ///
    /// A component training set pins a single fold (train set in-fold,
    /// component set out-of-fold) and cannot be combined with fold rotation.
    pub fn folds(
        train_set: &QuestionAnswerSet,
        component_train_set: Option<&QuestionAnswerSet>,
        num_folds: i32,
    ) -> Result<Vec<Fold>> {
        match component_train_set {
            Some(_) if num_folds > 0 => Err(AppError::ConflictingTraining { num_folds }),
            Some(component_set) => Ok(vec![Fold::new(
                Arc::new(train_set.clone()),
                Arc::new(component_set.clone()),
            )]),
            None => Ok(train_set.fold(num_folds)),
        }
    }

    #[instrument(skip_all, fields(questions = train_set.len(), source = train_set.source()))]
    pub async fn run(
        &self,
        train_set: &QuestionAnswerSet,
        component_train_set: Option<&QuestionAnswerSet>,
    ) -> Result<TrainingReport> {
        let started_at = Utc::now();
        let settings = self.orchestrator.settings()?;
        let folds = Self::folds(train_set, component_train_set, settings.num_folds)?;
        let stages = self.orchestrator.stages();

        info!(folds = folds.len(), "Starting training");

        let mut questions = 0;
        let mut failures = 0;
        for (index, fold) in folds.iter().enumerate() {
            info!(
                fold = index + 1,
                in_fold = fold.in_fold.len(),
                out_of_fold = fold.out_of_fold.len(),
                "Training fold"
            );

            for trainable in stages.trainables() {
                trainable
                    .train(&fold.out_of_fold)
                    .await
                    .inspect_err(|e| {
                        error!(
                            stage = %Stage::Training,
                            component = trainable.id(),
                            error = %e,
                            "Component training failed"
                        )
                    })?;
            }

            // Joins the whole fold before returning
            let outcomes = self.orchestrator.process_batch(&fold.in_fold).await?;
            questions += outcomes.len();
            for (question_id, outcome) in outcomes {
                match outcome {
                    Ok(_) => {}
                    Err(e) if e.is_fatal() => {
                        error!(question_id = %question_id, error = %e, "Training aborted");
                        return Err(e);
                    }
                    Err(_) => failures += 1,
                }
            }
        }

        for ranker in stages.merge_rankers() {
            info!(component = ranker.id(), "Finishing merge/rank training");
            ranker.finish_training().await.inspect_err(|e| {
                error!(
                    stage = %Stage::Training,
                    component = ranker.id(),
                    error = %e,
                    "Merge/rank training failed"
                )
            })?;
        }

        if folds.len() > 1 {
            info!("Retraining components on the full training set");
            for trainable in stages.trainables() {
                trainable
                    .train(train_set)
                    .await
                    .inspect_err(|e| {
                        error!(
                            stage = %Stage::Training,
                            component = trainable.id(),
                            error = %e,
                            "Component training failed"
                        )
                    })?;
            }
        }

        let report = TrainingReport {
            folds: folds.len(),
            questions,
            failures,
            started_at,
            finished_at: Utc::now(),
        };
        info!(
            folds = report.folds,
            questions = report.questions,
            failures = report.failures,
            "Training complete"
        );
        Ok(report)
    }
}
