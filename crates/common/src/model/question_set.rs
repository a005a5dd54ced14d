use super::candidate::CandidateAnswer;
use super::question::{CorrectAnswer, Question};
use crate::errors::{AppError, Result};
use indexmap::IndexMap;
use rand::seq::SliceRandom;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use std::collections::HashSet;
use std::sync::Arc;

/// Seed for fold shuffling; identical input always yields identical folds
pub const FOLD_SEED: u64 = 10598;

/// Insertion-ordered batch of questions with their ground-truth answers
#[derive(Debug, Clone, Default)]
pub struct QuestionAnswerSet {
    source: String,
    questions: IndexMap<String, Arc<Question>>,
    answers: IndexMap<String, Arc<[CorrectAnswer]>>,
}

impl QuestionAnswerSet {
    pub fn new(source: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            ..Default::default()
        }
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Add a question with its correct answers.
    ///
    /// A repeated question id is a configuration error; nothing is overwritten.
    pub fn add(&mut self, question: Question, answers: Vec<CorrectAnswer>) -> Result<()> {
        self.insert(Arc::new(question), answers.into())
    }

    fn insert(&mut self, question: Arc<Question>, answers: Arc<[CorrectAnswer]>) -> Result<()> {
        if self.questions.contains_key(&question.id) {
            return Err(AppError::DuplicateQuestion {
                id: question.id.clone(),
            });
        }
        self.answers.insert(question.id.clone(), answers);
        self.questions.insert(question.id.clone(), question);
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }

    pub fn get(&self, id: &str) -> Option<&Arc<Question>> {
        self.questions.get(id)
    }

    pub fn contains(&self, id: &str) -> bool {
        self.questions.contains_key(id)
    }

    /// Questions in insertion order
    pub fn questions(&self) -> impl Iterator<Item = &Arc<Question>> {
        self.questions.values()
    }

    /// Correct answers of a question; empty when the question has none or is unknown
    pub fn correct_answers(&self, id: &str) -> Arc<[CorrectAnswer]> {
        self.answers
            .get(id)
            .cloned()
            .unwrap_or_else(|| Arc::from(Vec::new()))
    }

    /// Total number of correct answers across all questions
    pub fn answer_count(&self) -> usize {
        self.answers.values().map(|a| a.len()).sum()
    }

    /// Partition into cross-validation folds.
    ///
    /// `num_folds <= 0` yields one degenerate fold whose in-fold and
    /// out-of-fold sets are both this set. Otherwise the questions are
    /// shuffled with [`FOLD_SEED`] and cut into `min(num_folds, len)`
    /// contiguous groups whose sizes differ by at most one.
    pub fn fold(&self, num_folds: i32) -> Vec<Fold> {
        if num_folds <= 0 {
            let whole = Arc::new(self.clone());
            return vec![Fold::new(whole.clone(), whole)];
        }

        let mut ids: Vec<&String> = self.questions.keys().collect();
        let mut rng = ChaCha8Rng::seed_from_u64(FOLD_SEED);
        ids.shuffle(&mut rng);

        let groups = (num_folds as usize).min(ids.len());
        if groups == 0 {
            return Vec::new();
        }
        let base = ids.len() / groups;
        let larger = ids.len() % groups;

        let mut folds = Vec::with_capacity(groups);
        let mut start = 0;
        for group in 0..groups {
            let size = base + usize::from(group < larger);
            let members: HashSet<&str> = ids[start..start + size].iter().map(|id| id.as_str()).collect();

            let mut in_fold = QuestionAnswerSet::new(self.source.clone());
            for id in &ids[start..start + size] {
                in_fold.push_unchecked(self, id);
            }

            let mut out_of_fold = QuestionAnswerSet::new(self.source.clone());
            for id in self.questions.keys().filter(|id| !members.contains(id.as_str())) {
                out_of_fold.push_unchecked(self, id);
            }

            folds.push(Fold::new(Arc::new(in_fold), Arc::new(out_of_fold)));
            start += size;
        }
        folds
    }

    // Copy one question (and its answers) from a parent set that is known to
    // contain it and to have unique ids.
    fn push_unchecked(&mut self, parent: &QuestionAnswerSet, id: &str) {
        if let Some(question) = parent.questions.get(id) {
            self.questions.insert(id.to_string(), question.clone());
            self.answers.insert(id.to_string(), parent.correct_answers(id));
        }
    }
}

/// A train/evaluate partition pair
#[derive(Debug, Clone)]
pub struct Fold {
    pub in_fold: Arc<QuestionAnswerSet>,
    pub out_of_fold: Arc<QuestionAnswerSet>,
}

impl Fold {
    pub fn new(in_fold: Arc<QuestionAnswerSet>, out_of_fold: Arc<QuestionAnswerSet>) -> Self {
        Self {
            in_fold,
            out_of_fold,
        }
    }
}

/// A question paired with its final ranked answers
#[derive(Debug, Clone)]
pub struct AnsweredQuestion {
    pub question: Arc<Question>,
    pub answers: Vec<CandidateAnswer>,
}

impl AnsweredQuestion {
    pub fn top(&self) -> Option<&CandidateAnswer> {
        self.answers.first()
    }
}
