//! Question set and corpus loading
//!
//! Question sets are JSON arrays of
//! `{ id, text, engagement?, answers: [{ text, relevance?, regex? }], metadata? }`.
//! Corpora are JSON arrays of `{ id, title, body }`.

use crate::components::{Corpus, CorpusDocument, LowercaseTokenizer};
use answerforge_common::{AppError, CorrectAnswer, Question, QuestionAnswerSet, Result};
use indexmap::IndexMap;
use serde::Deserialize;
use std::path::Path;
use tracing::info;

#[derive(Debug, Deserialize)]
struct QuestionRecord {
    id: String,
    text: String,
    #[serde(default)]
    engagement: Option<String>,
    #[serde(default)]
    answers: Vec<AnswerRecord>,
    #[serde(default)]
    metadata: IndexMap<String, serde_json::Value>,
}

#[derive(Debug, Deserialize)]
struct AnswerRecord {
    text: String,
    #[serde(default)]
    relevance: Option<i32>,
    #[serde(default)]
    regex: bool,
}

impl AnswerRecord {
    fn into_correct_answer(self) -> Result<CorrectAnswer> {
        let relevance = self.relevance.unwrap_or(CorrectAnswer::DEFAULT_RELEVANCE);
        if self.regex {
            CorrectAnswer::pattern(self.text, relevance)
        } else {
            Ok(CorrectAnswer::with_relevance(self.text, relevance))
        }
    }
}

fn read_json<T: serde::de::DeserializeOwned>(path: &Path) -> Result<T> {
    let raw = std::fs::read_to_string(path)?;
    serde_json::from_str(&raw).map_err(|e| AppError::InvalidData {
        message: format!("{}: {}", path.display(), e),
    })
}

/// Parse a question set from JSON text
pub fn parse_question_set(json: &str, source: &str) -> Result<QuestionAnswerSet> {
    let records: Vec<QuestionRecord> = serde_json::from_str(json).map_err(|e| AppError::InvalidData {
        message: e.to_string(),
    })?;
    build_question_set(records, source)
}

fn build_question_set(records: Vec<QuestionRecord>, source: &str) -> Result<QuestionAnswerSet> {
    let mut set = QuestionAnswerSet::new(source);
    for record in records {
        let answers = record
            .answers
            .into_iter()
            .map(AnswerRecord::into_correct_answer)
            .collect::<Result<Vec<_>>>()?;

        let mut question = Question::new(record.id, record.text).with_source(source);
        if let Some(engagement) = &record.engagement {
            question = question.with_engagement(engagement);
        }
        question.metadata = record.metadata;

        set.add(question, answers)?;
    }
    Ok(set)
}

pub fn load_question_set(path: &Path, source: &str) -> Result<QuestionAnswerSet> {
    let records: Vec<QuestionRecord> = read_json(path)?;
    let set = build_question_set(records, source)?;
    info!(
        path = %path.display(),
        questions = set.len(),
        correct_answers = set.answer_count(),
        "Question set loaded"
    );
    Ok(set)
}

pub fn load_corpus(path: &Path, analyzer: &LowercaseTokenizer) -> Result<Corpus> {
    let documents: Vec<CorpusDocument> = read_json(path)?;
    let corpus = Corpus::new(documents, analyzer);
    info!(path = %path.display(), documents = corpus.len(), "Corpus loaded");
    Ok(corpus)
}
