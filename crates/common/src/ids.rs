//! Monotonic id sequences
//!
//! Candidate answer ids and merge/rank group ids are drawn from explicit
//! sequence objects owned by the pipeline run and injected into the
//! components that need them. Tests build their own sequences to get
//! deterministic ids.

use std::sync::atomic::{AtomicU64, Ordering};

/// Thread-safe, strictly increasing id source
#[derive(Debug)]
pub struct IdSequence {
    next: AtomicU64,
}

impl IdSequence {
    /// Sequence starting at 1
    pub fn new() -> Self {
        Self::starting_at(1)
    }

    pub fn starting_at(first: u64) -> Self {
        Self {
            next: AtomicU64::new(first),
        }
    }

    /// Take the next id. Never returns the same value twice.
    pub fn next(&self) -> u64 {
        self.next.fetch_add(1, Ordering::Relaxed)
    }

    /// Peek at the id the next call will hand out
    pub fn peek(&self) -> u64 {
        self.next.load(Ordering::Relaxed)
    }
}

impl Default for IdSequence {
    fn default() -> Self {
        Self::new()
    }
}
