//! Corpus answer generator
//!
//! A small in-memory lexical searcher over a document corpus. Every matching
//! document becomes one candidate whose label is the document id.
//!
//! Features:
//! - `search_score`: normalised term overlap, in (0, 1)
//! - `search_rank`: 1-based position in the result list

use super::analysis::LowercaseTokenizer;
use super::{AnswerGenerator, AnswerStream, Component};
use answerforge_common::{
    AnalyzedText, AnswerPayload, CandidateAnswer, IdSequence, Question, Result,
};
use async_trait::async_trait;
use futures::stream::{self, StreamExt};
use serde::Deserialize;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::debug;

pub const SEARCH_SCORE: &str = "search_score";
pub const SEARCH_RANK: &str = "search_rank";

/// One document of the answer corpus
#[derive(Debug, Clone, Deserialize)]
pub struct CorpusDocument {
    pub id: String,
    pub title: String,
    pub body: String,
}

/// Documents plus their pre-computed term sets
pub struct Corpus {
    documents: Vec<CorpusDocument>,
    terms: Vec<HashSet<String>>,
}

impl Corpus {
    pub fn new(documents: Vec<CorpusDocument>, analyzer: &LowercaseTokenizer) -> Self {
        let terms: Vec<HashSet<String>> = documents
            .iter()
            .map(|d| {
                analyzer
                    .tokenize(&d.title)
                    .into_iter()
                    .chain(analyzer.tokenize(&d.body))
                    .collect()
            })
            .collect();

        Self { documents, terms }
    }

    pub fn len(&self) -> usize {
        self.documents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.documents.is_empty()
    }

    /// Documents sharing at least one term with the query, best first.
    /// Ties keep corpus order.
    pub fn search(&self, query: &[String], limit: usize) -> Vec<(&CorpusDocument, usize)> {
        let query: HashSet<&str> = query.iter().map(String::as_str).collect();
        if query.is_empty() {
            return vec![];
        }

        let mut hits: Vec<(usize, usize)> = self
            .terms
            .iter()
            .enumerate()
            .map(|(i, terms)| (i, query.iter().filter(|q| terms.contains(**q)).count()))
            .filter(|(_, overlap)| *overlap > 0)
            .collect();

        hits.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));
        hits.truncate(limit);

        hits.into_iter()
            .map(|(i, overlap)| (&self.documents[i], overlap))
            .collect()
    }
}

pub struct CorpusAnswerGenerator {
    id: String,
    corpus: Arc<Corpus>,
    analyzer: Arc<LowercaseTokenizer>,
    ids: Arc<IdSequence>,
    max_candidates: usize,
}

impl CorpusAnswerGenerator {
    pub fn new(
        corpus: Arc<Corpus>,
        analyzer: Arc<LowercaseTokenizer>,
        ids: Arc<IdSequence>,
        max_candidates: usize,
    ) -> Self {
        Self {
            id: "corpus-generator".to_string(),
            corpus,
            analyzer,
            ids,
            max_candidates,
        }
    }
}

impl Component for CorpusAnswerGenerator {
    fn id(&self) -> &str {
        &self.id
    }
}

#[async_trait]
impl AnswerGenerator for CorpusAnswerGenerator {
    async fn generate(&self, question: Arc<Question>) -> Result<AnswerStream> {
        let query = if question.text.tokens.is_empty() {
            self.analyzer.tokenize(&question.text.text)
        } else {
            question.text.tokens.clone()
        };

        let answers: Vec<CandidateAnswer> = self
            .corpus
            .search(&query, self.max_candidates)
            .into_iter()
            .enumerate()
            .map(|(rank, (doc, overlap))| {
                let mut answer = CandidateAnswer::new(&self.ids, doc.id.clone(), self.id.clone())
                    .with_payload(AnswerPayload {
                        document: Some(AnalyzedText::new(doc.body.clone())),
                        title: Some(AnalyzedText::new(doc.title.clone())),
                        question_variants: vec![],
                    });
                let overlap = overlap as f64;
                answer.set_feature(SEARCH_SCORE, overlap / (overlap + 1.0));
                answer.set_feature(SEARCH_RANK, (rank + 1) as f64);
                answer
            })
            .collect();

        debug!(
            question_id = %question.id,
            candidates = answers.len(),
            "Corpus search complete"
        );

        Ok(stream::iter(answers.into_iter().map(Ok)).boxed())
    }
}
