//! Title overlap scorer
//!
//! Adds `title_overlap`: the weighted share of question terms that appear
//! in the candidate's title. Term weights are inverse question frequencies
//! learned from the training questions, so terms that appear in every
//! question ("what", "which") count for little. Before training every
//! term weighs 1.

use super::analysis::LowercaseTokenizer;
use super::{AnswerScorer, Component, Trainable};
use answerforge_common::{CandidateAnswer, Question, QuestionAnswerSet, Result};
use async_trait::async_trait;
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::Arc;
use tracing::info;

pub const TITLE_OVERLAP: &str = "title_overlap";

pub struct TitleOverlapScorer {
    id: String,
    analyzer: Arc<LowercaseTokenizer>,
    weights: RwLock<HashMap<String, f64>>,
}

impl TitleOverlapScorer {
    pub fn new(analyzer: Arc<LowercaseTokenizer>) -> Self {
        Self {
            id: "title-overlap-scorer".to_string(),
            analyzer,
            weights: RwLock::new(HashMap::new()),
        }
    }

    fn weight(weights: &HashMap<String, f64>, term: &str) -> f64 {
        weights.get(term).copied().unwrap_or(1.0)
    }

    fn overlap(&self, question_terms: &HashSet<String>, title_terms: &HashSet<String>) -> f64 {
        let weights = self.weights.read();
        let total: f64 = question_terms.iter().map(|t| Self::weight(&weights, t)).sum();
        if total == 0.0 {
            return 0.0;
        }
        let shared: f64 = question_terms
            .intersection(title_terms)
            .map(|t| Self::weight(&weights, t))
            .sum();
        shared / total
    }

    fn terms(&self, tokens: &[String], raw: &str) -> HashSet<String> {
        if tokens.is_empty() {
            self.analyzer.tokenize(raw).into_iter().collect()
        } else {
            tokens.iter().cloned().collect()
        }
    }
}

impl Component for TitleOverlapScorer {
    fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl AnswerScorer for TitleOverlapScorer {
    async fn score(&self, question: &Question, answer: &mut CandidateAnswer) -> Result<()> {
        let title_terms = match answer.payload().and_then(|p| p.title.as_ref()) {
            Some(title) => self.terms(&title.tokens, &title.text),
            None => HashSet::new(),
        };
        let question_terms = self.terms(&question.text.tokens, &question.text.text);

        let value = self.overlap(&question_terms, &title_terms);
        answer.set_feature(TITLE_OVERLAP, value);
        Ok(())
    }
}

#[async_trait]
impl Trainable for TitleOverlapScorer {
    async fn train(&self, questions: &QuestionAnswerSet) -> Result<()> {
        let mut frequency: HashMap<String, usize> = HashMap::new();
        for question in questions.questions() {
            let terms: HashSet<String> = self.analyzer.tokenize(&question.text.text).into_iter().collect();
            for term in terms {
                *frequency.entry(term).or_default() += 1;
            }
        }

        let n = questions.len() as f64;
        let weights: HashMap<String, f64> = frequency
            .into_iter()
            .map(|(term, df)| (term, ((n + 1.0) / (df as f64 + 1.0)).ln() + 1.0))
            .collect();

        info!(
            questions = questions.len(),
            terms = weights.len(),
            "Title overlap weights trained"
        );
        *self.weights.write() = weights;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use answerforge_common::{AnalyzedText, AnswerPayload, IdSequence};

    fn titled(ids: &IdSequence, title: &str) -> CandidateAnswer {
        CandidateAnswer::new(ids, "doc", "test").with_payload(AnswerPayload {
            title: Some(AnalyzedText::new(title)),
            ..Default::default()
        })
    }

    #[tokio::test]
    async fn test_untrained_overlap_is_term_fraction() {
        let scorer = TitleOverlapScorer::new(Arc::new(LowercaseTokenizer::new()));
        let ids = IdSequence::new();
        let question = Question::new("q1", "capital city France");

        let mut answer = titled(&ids, "France");
        scorer.score(&question, &mut answer).await.unwrap();
        assert!((answer.feature(TITLE_OVERLAP).unwrap() - 1.0 / 3.0).abs() < 1e-9);

        let mut bare = CandidateAnswer::new(&ids, "none", "test");
        scorer.score(&question, &mut bare).await.unwrap();
        assert_eq!(bare.feature(TITLE_OVERLAP), Some(0.0));
    }

    #[tokio::test]
    async fn test_training_downweights_common_terms() {
        let scorer = TitleOverlapScorer::new(Arc::new(LowercaseTokenizer::new()));
        let mut set = QuestionAnswerSet::new("train");
        set.add(Question::new("a", "which river flows"), vec![]).unwrap();
        set.add(Question::new("b", "which mountain"), vec![]).unwrap();
        set.add(Question::new("c", "which lake"), vec![]).unwrap();
        scorer.train(&set).await.unwrap();

        let ids = IdSequence::new();
        let question = Question::new("q", "which river");
        let mut common = titled(&ids, "which");
        let mut rare = titled(&ids, "river");
        scorer.score(&question, &mut common).await.unwrap();
        scorer.score(&question, &mut rare).await.unwrap();

        assert!(rare.feature(TITLE_OVERLAP).unwrap() > common.feature(TITLE_OVERLAP).unwrap());
    }
}
