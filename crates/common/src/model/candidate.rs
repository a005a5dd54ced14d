use super::question::CorrectAnswer;
use super::text::AnalyzedText;
use crate::ids::IdSequence;
use indexmap::IndexMap;
use std::cmp::Ordering;
use std::hash::{Hash, Hasher};

/// Heavy text carried by a candidate for the benefit of scorers
#[derive(Debug, Clone, Default)]
pub struct AnswerPayload {
    pub document: Option<AnalyzedText>,
    pub title: Option<AnalyzedText>,
    pub question_variants: Vec<AnalyzedText>,
}

/// A scored, identified answer unit
///
/// Equality and hashing use the id only. The natural order is confidence
/// descending (unset counts as 0), then id ascending.
#[derive(Debug, Clone)]
pub struct CandidateAnswer {
    id: u64,
    pub label: String,
    pub component_id: String,
    pub confidence: Option<f64>,
    features: IndexMap<String, f64>,
    payload: Option<AnswerPayload>,
    pub metadata: IndexMap<String, serde_json::Value>,
}

impl CandidateAnswer {
    pub fn new(ids: &IdSequence, label: impl Into<String>, component_id: impl Into<String>) -> Self {
        Self {
            id: ids.next(),
            label: label.into(),
            component_id: component_id.into(),
            confidence: None,
            features: IndexMap::new(),
            payload: None,
            metadata: IndexMap::new(),
        }
    }

    pub fn with_payload(mut self, payload: AnswerPayload) -> Self {
        self.payload = Some(payload);
        self
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn feature(&self, name: &str) -> Option<f64> {
        self.features.get(name).copied()
    }

    /// Set a feature, replacing any previous value under the same name
    pub fn set_feature(&mut self, name: impl Into<String>, value: f64) {
        self.features.insert(name.into(), value);
    }

    /// Features in insertion order
    pub fn features(&self) -> &IndexMap<String, f64> {
        &self.features
    }

    pub fn payload(&self) -> Option<&AnswerPayload> {
        self.payload.as_ref()
    }

    pub fn payload_mut(&mut self) -> Option<&mut AnswerPayload> {
        self.payload.as_mut()
    }

    /// Every non-null text a search-result analyzer should see
    pub fn search_texts_mut(&mut self) -> impl Iterator<Item = &mut AnalyzedText> {
        self.payload.iter_mut().flat_map(|p| {
            p.document
                .iter_mut()
                .chain(p.title.iter_mut())
                .chain(p.question_variants.iter_mut())
        })
    }

    /// Highest relevance among the correct answers this label matches, 0 if none
    pub fn relevance(&self, correct: &[CorrectAnswer]) -> i32 {
        correct
            .iter()
            .filter(|c| c.matches(&self.label, i32::MIN))
            .map(|c| c.relevance)
            .max()
            .unwrap_or(0)
    }

    pub fn is_correct(&self, correct: &[CorrectAnswer]) -> bool {
        CorrectAnswer::is_correct(&self.label, correct, CorrectAnswer::DEFAULT_RELEVANCE)
    }

    /// Release the payload and features once ranking is final.
    /// Id, label, confidence and metadata are kept.
    pub fn compact(&mut self) {
        self.payload = None;
        self.features = IndexMap::new();
    }

    pub fn is_compacted(&self) -> bool {
        self.payload.is_none() && self.features.is_empty()
    }
}

impl PartialEq for CandidateAnswer {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id
    }
}

impl Eq for CandidateAnswer {}

impl Hash for CandidateAnswer {
    fn hash<H: Hasher>(&self, state: &mut H) {
        self.id.hash(state);
    }
}

impl Ord for CandidateAnswer {
    fn cmp(&self, other: &Self) -> Ordering {
        let mine = self.confidence.unwrap_or(0.0);
        let theirs = other.confidence.unwrap_or(0.0);
        theirs.total_cmp(&mine).then_with(|| self.id.cmp(&other.id))
    }
}

impl PartialOrd for CandidateAnswer {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}
