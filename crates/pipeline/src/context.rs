//! Shared startup state handed to pipeline builders

use crate::components::{Corpus, LowercaseTokenizer};
use crate::dataset;
use answerforge_common::ranking::{create_ranking_service, RankingService};
use answerforge_common::{AppConfig, AppError, IdSequence, Result};
use std::sync::Arc;

/// Built once before any component exists; every builder borrows it.
#[derive(Clone)]
pub struct PipelineContext {
    pub config: Arc<AppConfig>,
    /// Ids stamped on generated candidates
    pub candidate_ids: Arc<IdSequence>,
    /// Ids grouping training rows by question
    pub group_ids: Arc<IdSequence>,
    pub analyzer: Arc<LowercaseTokenizer>,
    pub ranking_service: Arc<dyn RankingService>,
}

impl PipelineContext {
    pub fn new(config: AppConfig) -> Result<Self> {
        let ranking_service = create_ranking_service(&config.ranker)?;
        Ok(Self::with_ranking_service(config, ranking_service))
    }

    pub fn with_ranking_service(config: AppConfig, ranking_service: Arc<dyn RankingService>) -> Self {
        Self {
            config: Arc::new(config),
            candidate_ids: Arc::new(IdSequence::new()),
            group_ids: Arc::new(IdSequence::new()),
            analyzer: Arc::new(LowercaseTokenizer::new()),
            ranking_service,
        }
    }

    /// Load the configured document corpus
    pub fn load_corpus(&self) -> Result<Corpus> {
        let path = self
            .config
            .data
            .corpus_path
            .as_ref()
            .ok_or_else(|| AppError::MissingOption {
                option: "data.corpus_path".to_string(),
            })?;
        dataset::load_corpus(path, &self.analyzer)
    }
}
