//! Error types for AnswerForge
//!
//! Provides a single error taxonomy for the whole pipeline:
//! - Configuration errors (always fatal, raised before work begins)
//! - Component errors (abort a single question only)
//! - Ranking service errors (abort the current train/apply call)
//! - Error codes for machine-readable classification

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Error codes for machine-readable error identification
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    // Configuration errors (1xxx)
    ConfigurationError,
    MissingOption,
    DuplicateQuestion,
    UnknownPipeline,
    ConflictingTraining,

    // Data errors (2xxx)
    InvalidData,
    SerializationError,

    // Component errors (3xxx)
    ComponentError,

    // Ranking service errors (4xxx)
    RankingServiceError,
    RankerFailed,
    RetriesExhausted,
    UpstreamError,

    // Worker pool errors (5xxx)
    WorkerPoolClosed,

    // Internal errors (9xxx)
    IoError,
    InternalError,
}

impl ErrorCode {
    /// Get the numeric code for this error
    pub fn as_code(&self) -> u16 {
        match self {
            // Configuration (1xxx)
            ErrorCode::ConfigurationError => 1001,
            ErrorCode::MissingOption => 1002,
            ErrorCode::DuplicateQuestion => 1003,
            ErrorCode::UnknownPipeline => 1004,
            ErrorCode::ConflictingTraining => 1005,

            // Data (2xxx)
            ErrorCode::InvalidData => 2001,
            ErrorCode::SerializationError => 2002,

            // Components (3xxx)
            ErrorCode::ComponentError => 3001,

            // Ranking service (4xxx)
            ErrorCode::RankingServiceError => 4001,
            ErrorCode::RankerFailed => 4002,
            ErrorCode::RetriesExhausted => 4003,
            ErrorCode::UpstreamError => 4004,

            // Worker pool (5xxx)
            ErrorCode::WorkerPoolClosed => 5001,

            // Internal (9xxx)
            ErrorCode::IoError => 9001,
            ErrorCode::InternalError => 9002,
        }
    }
}

/// Application error types
#[derive(Error, Debug)]
pub enum AppError {
    // Configuration errors
    #[error("Configuration error: {message}")]
    Configuration { message: String },

    #[error("Required option missing: {option}")]
    MissingOption { option: String },

    #[error("Duplicate question id: {id}")]
    DuplicateQuestion { id: String },

    #[error("Unknown pipeline: {name}")]
    UnknownPipeline { name: String },

    #[error(
        "Cannot train with both a component training set and {num_folds} folds: \
         fold rotation already supplies out-of-fold training data"
    )]
    ConflictingTraining { num_folds: i32 },

    // Data errors
    #[error("Invalid data: {message}")]
    InvalidData { message: String },

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    // Component errors
    #[error("Component error in {stage} for question {question_id}: {message}")]
    Component {
        stage: String,
        question_id: String,
        message: String,
    },

    // Ranking service errors
    #[error("Ranking service error: {message}")]
    RankingService {
        message: String,
        job_id: Option<String>,
    },

    #[error("Ranker {job_id} reached failed state")]
    RankerFailed { job_id: String },

    #[error("Ranking request failed after {attempts} attempts: {message}")]
    RetriesExhausted { attempts: u32, message: String },

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    // Worker pool errors
    #[error("Worker pool is shut down")]
    WorkerPoolClosed,

    // Internal errors
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Other(#[from] anyhow::Error),
}

impl AppError {
    /// Shorthand for a configuration error
    pub fn config(message: impl Into<String>) -> Self {
        AppError::Configuration {
            message: message.into(),
        }
    }

    /// Shorthand for a ranking service error without a job id
    pub fn ranking(message: impl Into<String>) -> Self {
        AppError::RankingService {
            message: message.into(),
            job_id: None,
        }
    }

    /// Get the error code for this error
    pub fn code(&self) -> ErrorCode {
        match self {
            AppError::Configuration { .. } => ErrorCode::ConfigurationError,
            AppError::MissingOption { .. } => ErrorCode::MissingOption,
            AppError::DuplicateQuestion { .. } => ErrorCode::DuplicateQuestion,
            AppError::UnknownPipeline { .. } => ErrorCode::UnknownPipeline,
            AppError::ConflictingTraining { .. } => ErrorCode::ConflictingTraining,
            AppError::InvalidData { .. } => ErrorCode::InvalidData,
            AppError::Serialization(_) => ErrorCode::SerializationError,
            AppError::Component { .. } => ErrorCode::ComponentError,
            AppError::RankingService { .. } => ErrorCode::RankingServiceError,
            AppError::RankerFailed { .. } => ErrorCode::RankerFailed,
            AppError::RetriesExhausted { .. } => ErrorCode::RetriesExhausted,
            AppError::HttpClient(_) => ErrorCode::UpstreamError,
            AppError::WorkerPoolClosed => ErrorCode::WorkerPoolClosed,
            AppError::Io(_) => ErrorCode::IoError,
            AppError::Other(_) => ErrorCode::InternalError,
        }
    }

    /// Configuration errors are never recovered locally
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            AppError::Configuration { .. }
                | AppError::MissingOption { .. }
                | AppError::DuplicateQuestion { .. }
                | AppError::UnknownPipeline { .. }
                | AppError::ConflictingTraining { .. }
        )
    }

    /// Ranking service errors abort the whole train/apply call
    pub fn is_ranking_service(&self) -> bool {
        matches!(
            self,
            AppError::RankingService { .. }
                | AppError::RankerFailed { .. }
                | AppError::RetriesExhausted { .. }
        )
    }

    /// Check if this error must stop the current batch rather than a single question
    pub fn is_fatal(&self) -> bool {
        self.is_configuration() || self.is_ranking_service() || matches!(self, AppError::WorkerPoolClosed)
    }

    /// Attach pipeline stage and question context to a component failure.
    ///
    /// Fatal errors pass through unchanged so callers can still tell them apart.
    pub fn in_stage(self, stage: impl std::fmt::Display, question_id: &str) -> Self {
        match self {
            err @ AppError::Component { .. } => err,
            err if err.is_fatal() => err,
            other => AppError::Component {
                stage: stage.to_string(),
                question_id: question_id.to_string(),
                message: other.to_string(),
            },
        }
    }
}
