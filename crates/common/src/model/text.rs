use indexmap::IndexMap;
use serde::{Deserialize, Serialize};

/// A piece of text plus whatever the text analyzers attached to it
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalyzedText {
    pub text: String,
    pub parsed: Option<String>,
    pub tokens: Vec<String>,
    pub metadata: IndexMap<String, serde_json::Value>,
}

impl AnalyzedText {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            ..Default::default()
        }
    }

    /// True once an analyzer has produced tokens
    pub fn is_analyzed(&self) -> bool {
        !self.tokens.is_empty() || self.parsed.is_some()
    }
}

impl From<&str> for AnalyzedText {
    fn from(text: &str) -> Self {
        Self::new(text)
    }
}

impl From<String> for AnalyzedText {
    fn from(text: String) -> Self {
        Self::new(text)
    }
}
