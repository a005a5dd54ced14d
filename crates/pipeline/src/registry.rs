//! Named pipeline builders
//!
//! `pipeline.kind` selects one entry. Built-ins:
//! - `baseline`: corpus generator, trusting ranker, result writer
//! - `remote-rank`: corpus generator, title-overlap scorer, remote ranker, result writer

use crate::components::{CorpusAnswerGenerator, Stages, TitleOverlapScorer};
use crate::context::PipelineContext;
use crate::postprocess::ResultWriter;
use crate::rank::{RemoteMergerAndRanker, TrustingMergerAndRanker};
use answerforge_common::{AppError, Result};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::info;

pub type PipelineBuilder = fn(&PipelineContext) -> Result<Stages>;

pub struct PipelineRegistry {
    builders: HashMap<&'static str, PipelineBuilder>,
}

impl PipelineRegistry {
    pub fn empty() -> Self {
        Self {
            builders: HashMap::new(),
        }
    }

    pub fn with_defaults() -> Self {
        let mut registry = Self::empty();
        registry.register("baseline", baseline);
        registry.register("remote-rank", remote_rank);
        registry
    }

    pub fn register(&mut self, name: &'static str, builder: PipelineBuilder) -> &mut Self {
        self.builders.insert(name, builder);
        self
    }

    pub fn contains(&self, name: &str) -> bool {
        self.builders.contains_key(name)
    }

    pub fn build(&self, name: &str, context: &PipelineContext) -> Result<Stages> {
        let builder = self.builders.get(name).ok_or_else(|| AppError::UnknownPipeline {
            name: name.to_string(),
        })?;
        let stages = builder(context)?;
        info!(pipeline = name, components = stages.components().count(), "Pipeline built");
        Ok(stages)
    }
}

impl Default for PipelineRegistry {
    fn default() -> Self {
        Self::with_defaults()
    }
}

fn corpus_generator(context: &PipelineContext) -> Result<Arc<CorpusAnswerGenerator>> {
    Ok(Arc::new(CorpusAnswerGenerator::new(
        Arc::new(context.load_corpus()?),
        context.analyzer.clone(),
        context.candidate_ids.clone(),
        context.config.generator.max_candidates,
    )))
}

fn baseline(context: &PipelineContext) -> Result<Stages> {
    let mut stages = Stages::new();
    stages
        .add_question_analyzer(context.analyzer.clone())
        .add_generator(corpus_generator(context)?)
        .add_merge_ranker(Arc::new(TrustingMergerAndRanker::new(
            &context.config.trusting.feature_name,
        )))
        .add_postprocessor(Arc::new(ResultWriter::new()));
    Ok(stages)
}

fn remote_rank(context: &PipelineContext) -> Result<Stages> {
    let ranker = Arc::new(RemoteMergerAndRanker::new(
        context.ranking_service.clone(),
        context.group_ids.clone(),
    ));
    remote_rank_with(context, ranker)
}

fn remote_rank_with(context: &PipelineContext, ranker: Arc<RemoteMergerAndRanker>) -> Result<Stages> {
    let scorer = Arc::new(TitleOverlapScorer::new(context.analyzer.clone()));

    let mut stages = Stages::new();
    stages
        .add_question_analyzer(context.analyzer.clone())
        .add_generator(corpus_generator(context)?)
        .add_search_analyzer(context.analyzer.clone())
        .add_scorer(scorer.clone())
        .add_trainable(scorer)
        .add_merge_ranker(ranker)
        .add_postprocessor(Arc::new(ResultWriter::new()));
    Ok(stages)
}
