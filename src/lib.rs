//! # rustpapertrack
//!
//! Research-tracking pipeline: collect paper metadata, score each abstract with
//! a language model, and browse the scored corpus.
//!
//! ## Modules
//!
//! - [`arxiv`], [`gscholar`], [`semanticscholar`] - paper source adapters
//! - [`curation`] - keyword collection, seed-list resolution, not-found recovery
//! - [`scorer`] - the scoring engine
//! - [`llm`] - completion client (Anthropic or OpenAI-compatible)
//! - [`store`] - CSV corpus stores
//! - [`report`] - aggregate statistics
//! - [`dashboard`] - read-only web dashboard
//! - [`cookies`] - stored Scholar cookies
//! - [`error`] - Custom error types
//!
//! ## Usage
//!
//! ```rust,no_run
//! use rustpapertrack::config::{DataLayout, LlmConfig, Provider, ScoringConfig, DEFAULT_PACING};
//! use rustpapertrack::llm::LlmClient;
//! use rustpapertrack::rate_limit::FixedDelay;
//! use rustpapertrack::scorer::{score_corpus, ScoringEngine};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let client = LlmClient::new(LlmConfig::from_env(Provider::Anthropic)?)?;
//!     let engine = ScoringEngine::new(client, FixedDelay::new(DEFAULT_PACING), ScoringConfig::default());
//!     let layout = DataLayout::default();
//!     let report = score_corpus(&engine, &layout.curated(), &layout.scored(), true).await?;
//!     println!("{}", report);
//!     Ok(())
//! }
//! ```

pub mod arxiv;
pub mod config;
pub mod cookies;
pub mod curation;
pub mod dashboard;
pub mod error;
pub mod gscholar;
pub mod llm;
pub mod progress;
pub mod prompts;
pub mod rate_limit;
pub mod record;
pub mod report;
pub mod scorer;
pub mod semanticscholar;
pub mod store;

pub use error::{Result, TrackerError};
