//! Prompt module for LLM-based operations.
//!
//! Prompt templates are plain strings with `{placeholder}` markers; the scoring
//! engine receives its template through [`crate::config::ScoringConfig`].

pub mod scoring_rubric;

pub use scoring_rubric::*;
