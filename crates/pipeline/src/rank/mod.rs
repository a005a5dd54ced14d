//! Merge/rank stage implementations

pub mod remote;
pub mod trusting;

pub use remote::{RemoteMergerAndRanker, TrainingRow};
pub use trusting::TrustingMergerAndRanker;
