//! AnswerForge Pipeline
//!
//! Question answering pipeline composed of pluggable components:
//! 1. Question analysis
//! 2. Answer generation (lazy candidate streams, merged)
//! 3. Evidence retrieval, search-result analysis and scoring per candidate
//! 4. Merge and rank, trainable through k-fold training
//! 5. Post-processing of the final ranked answers
//!
//! Questions run concurrently on a fixed-size worker pool.

pub mod components;
pub mod context;
pub mod dataset;
pub mod orchestrator;
pub mod pool;
pub mod postprocess;
pub mod rank;
pub mod registry;
pub mod training;

#[cfg(test)]
mod testing;

pub use components::{Stage, Stages};
pub use context::PipelineContext;
pub use orchestrator::{Orchestrator, QuestionOutcome};
pub use registry::PipelineRegistry;
pub use training::{TrainingController, TrainingReport};
