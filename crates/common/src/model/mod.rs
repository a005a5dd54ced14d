//! Pipeline data model
//!
//! - [`Question`] and [`CorrectAnswer`]: input and ground truth
//! - [`CandidateAnswer`]: the unit every stage passes along
//! - [`QuestionAnswerSet`] and [`Fold`]: batches and cross-validation partitions
//! - [`AnalyzedText`]: text plus analyzer output

mod candidate;
mod question;
mod question_set;
mod text;

pub use candidate::{AnswerPayload, CandidateAnswer};
pub use question::{CorrectAnswer, Question};
pub use question_set::{AnsweredQuestion, Fold, QuestionAnswerSet, FOLD_SEED};
pub use text::AnalyzedText;
