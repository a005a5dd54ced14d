//! AnswerForge Common Library
//!
//! Shared code for the AnswerForge pipeline crates including:
//! - Question, candidate answer and question set data model
//! - Cross-validation fold partitioning
//! - Error types and handling
//! - Configuration management
//! - Id sequences for candidates and training groups
//! - Remote ranking service client abstraction
//! - Metrics and observability

pub mod config;
pub mod errors;
pub mod ids;
pub mod metrics;
pub mod model;
pub mod ranking;

// Re-export commonly used types
pub use config::{AppConfig, PipelineSettings};
pub use errors::{AppError, Result};
pub use ids::IdSequence;
pub use model::{
    AnalyzedText, AnswerPayload, AnsweredQuestion, CandidateAnswer, CorrectAnswer, Fold, Question,
    QuestionAnswerSet,
};
pub use ranking::RankingService;

/// Application version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
