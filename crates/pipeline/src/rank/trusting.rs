use crate::components::{AnswerStream, Component, CorrectAnswers, MergerAndRanker};
use answerforge_common::{AppConfig, Question, Result};
use async_trait::async_trait;
use futures::stream::{StreamExt, TryStreamExt};
use parking_lot::RwLock;
use std::sync::Arc;

/// Trusts one feature as the final confidence.
///
/// Answers pass through lazily; a missing feature counts as 0.
pub struct TrustingMergerAndRanker {
    id: String,
    feature: RwLock<Arc<str>>,
}

impl TrustingMergerAndRanker {
    pub fn new(feature: &str) -> Self {
        Self {
            id: "trusting-ranker".to_string(),
            feature: RwLock::new(Arc::from(feature)),
        }
    }

    pub fn feature(&self) -> Arc<str> {
        self.feature.read().clone()
    }
}

#[async_trait]
impl Component for TrustingMergerAndRanker {
    fn id(&self) -> &str {
        &self.id
    }

    async fn initialize(&self, config: &AppConfig) -> Result<()> {
        *self.feature.write() = Arc::from(config.trusting.feature_name.as_str());
        Ok(())
    }
}

#[async_trait]
impl MergerAndRanker for TrustingMergerAndRanker {
    async fn merge_and_rank(
        &self,
        _question: Arc<Question>,
        answers: AnswerStream,
        _correct: Option<CorrectAnswers>,
    ) -> Result<AnswerStream> {
        let feature = self.feature();
        Ok(answers
            .map_ok(move |mut answer| {
                answer.confidence = Some(answer.feature(&feature).unwrap_or(0.0));
                answer
            })
            .boxed())
    }
}
