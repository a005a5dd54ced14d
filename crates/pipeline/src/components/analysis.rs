//! Lexical text analysis
//!
//! The analyzer is built once at startup and handed to every component that
//! needs it through the pipeline context. Components must not analyze text
//! before the context exists.

use super::{Component, QuestionAnalyzer, TextAnalyzer};
use answerforge_common::{AnalyzedText, Question, Result};
use async_trait::async_trait;

/// Tokens shorter than this carry too little signal for overlap scoring
const MIN_TOKEN_LEN: usize = 3;

/// Lower-cases text and splits it into alphanumeric tokens
#[derive(Debug, Clone)]
pub struct LowercaseTokenizer {
    id: String,
}

impl LowercaseTokenizer {
    pub fn new() -> Self {
        Self {
            id: "lowercase-tokenizer".to_string(),
        }
    }

    /// Normalise raw text into tokens without touching any analysis state
    pub fn tokenize(&self, text: &str) -> Vec<String> {
        text.split_whitespace()
            .map(|w| {
                w.chars()
                    .filter(|c| c.is_alphanumeric())
                    .flat_map(char::to_lowercase)
                    .collect::<String>()
            })
            .filter(|w| w.chars().count() >= MIN_TOKEN_LEN)
            .collect()
    }
}

impl Default for LowercaseTokenizer {
    fn default() -> Self {
        Self::new()
    }
}

impl Component for LowercaseTokenizer {
    fn id(&self) -> &str {
        &self.id
    }
}

impl TextAnalyzer for LowercaseTokenizer {
    fn analyze(&self, text: &mut AnalyzedText) -> Result<()> {
        let tokens = self.tokenize(&text.text);
        text.parsed = Some(tokens.join(" "));
        text.tokens = tokens;
        Ok(())
    }
}

#[async_trait]
impl QuestionAnalyzer for LowercaseTokenizer {
    async fn analyze_question(&self, question: &mut Question) -> Result<()> {
        self.analyze(&mut question.text)
    }
}
