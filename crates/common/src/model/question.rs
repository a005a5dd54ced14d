use super::text::AnalyzedText;
use crate::errors::{AppError, Result};
use indexmap::IndexMap;
use regex_lite::Regex;
use std::fmt;

/// A natural-language question
///
/// Immutable once it enters a question set; question analyzers work on a
/// per-run copy.
#[derive(Debug, Clone)]
pub struct Question {
    pub id: String,
    pub text: AnalyzedText,
    /// Engagement tag, always lower case
    pub engagement: String,
    pub source: String,
    pub metadata: IndexMap<String, serde_json::Value>,
}

impl Question {
    pub fn new(id: impl Into<String>, text: impl Into<AnalyzedText>) -> Self {
        Self {
            id: id.into(),
            text: text.into(),
            engagement: String::new(),
            source: String::new(),
            metadata: IndexMap::new(),
        }
    }

    pub fn with_engagement(mut self, engagement: &str) -> Self {
        self.engagement = engagement.to_lowercase();
        self
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = source.into();
        self
    }
}

/// Ground truth for a question, used only during training and evaluation
#[derive(Clone)]
pub struct CorrectAnswer {
    pub text: String,
    pub relevance: i32,
    pattern: Option<Regex>,
}

impl CorrectAnswer {
    pub const DEFAULT_RELEVANCE: i32 = 1;

    /// Literal answer with the default relevance
    pub fn exact(text: impl Into<String>) -> Self {
        Self::with_relevance(text, Self::DEFAULT_RELEVANCE)
    }

    pub fn with_relevance(text: impl Into<String>, relevance: i32) -> Self {
        Self {
            text: text.into(),
            relevance,
            pattern: None,
        }
    }

    /// Regex answer; the pattern must match the whole candidate label
    pub fn pattern(pattern: impl Into<String>, relevance: i32) -> Result<Self> {
        let text = pattern.into();
        let regex = Regex::new(&format!("^(?:{})$", text)).map_err(|e| AppError::InvalidData {
            message: format!("invalid answer pattern '{}': {}", text, e),
        })?;

        Ok(Self {
            text,
            relevance,
            pattern: Some(regex),
        })
    }

    pub fn is_regex(&self) -> bool {
        self.pattern.is_some()
    }

    /// Does `label` satisfy this answer?
    ///
    /// Regex answers match on the whole label. Literal answers need exact
    /// equality and a relevance of at least `min_relevance`.
    pub fn matches(&self, label: &str, min_relevance: i32) -> bool {
        match &self.pattern {
            Some(regex) => regex.is_match(label),
            None => self.text == label && self.relevance >= min_relevance,
        }
    }

    /// Free-function form used by training code that iterates answer lists
    pub fn is_correct(label: &str, correct: &[CorrectAnswer], min_relevance: i32) -> bool {
        correct.iter().any(|c| c.matches(label, min_relevance))
    }
}

impl fmt::Debug for CorrectAnswer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CorrectAnswer")
            .field("text", &self.text)
            .field("relevance", &self.relevance)
            .field("regex", &self.is_regex())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_engagement_is_lowercased() {
        let q = Question::new("q1", "Who wrote Hamlet?").with_engagement("Jeopardy");
        assert_eq!(q.engagement, "jeopardy");
    }

    #[test]
    fn test_literal_match_respects_relevance() {
        let weak = CorrectAnswer::with_relevance("Paris", 0);
        assert!(!weak.matches("Paris", 1));
        assert!(weak.matches("Paris", 0));
        assert!(!CorrectAnswer::exact("Paris").matches("paris", 1));
    }

    #[test]
    fn test_pattern_matches_whole_label() {
        let answer = CorrectAnswer::pattern("4[0-9]", 1).unwrap();
        assert!(answer.matches("42", 1));
        assert!(!answer.matches("142", 1));
        assert!(answer.is_regex());
    }

    #[test]
    fn test_invalid_pattern_is_data_error() {
        let err = CorrectAnswer::pattern("(", 1).unwrap_err();
        assert!(matches!(err, AppError::InvalidData { .. }));
    }
}
