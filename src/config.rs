//! Runtime configuration.
//!
//! Everything the scoring engine needs is gathered into explicit structs at
//! startup and handed to it at construction time. The API credential comes from
//! the process environment (optionally populated from a `.env` file).

use crate::error::{Result, TrackerError};
use crate::prompts::SCORING_PROMPT;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default model identifier
pub const DEFAULT_MODEL: &str = "claude-sonnet-4-20250514";

/// Default output-token budget per scoring call
pub const DEFAULT_MAX_TOKENS: u32 = 1000;

/// USD per million tokens used for the cost estimate
pub const DEFAULT_PRICE_PER_MILLION: f64 = 3.0;

/// Pause after every scored record
pub const DEFAULT_PACING: Duration = Duration::from_millis(500);

/// Which wire protocol the completion endpoint speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum Provider {
    /// Anthropic Messages API (`POST /v1/messages`)
    Anthropic,
    /// OpenAI-compatible chat completions (`POST /chat/completions`)
    Openai,
}

impl Provider {
    pub fn default_base_url(&self) -> &'static str {
        match self {
            Provider::Anthropic => "https://api.anthropic.com",
            Provider::Openai => "https://api.openai.com/v1",
        }
    }

    /// Environment variable holding the credential for this provider
    pub fn key_var(&self) -> &'static str {
        match self {
            Provider::Anthropic => "ANTHROPIC_API_KEY",
            Provider::Openai => "OPENAI_API_KEY",
        }
    }
}

/// LLM endpoint configuration
#[derive(Debug, Clone)]
pub struct LlmConfig {
    pub provider: Provider,
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

impl LlmConfig {
    /// Read the credential for `provider` from the environment.
    ///
    /// A missing or blank key is reported as [`TrackerError::MissingCredential`].
    pub fn from_env(provider: Provider) -> Result<Self> {
        let var = provider.key_var();
        let api_key = std::env::var(var)
            .ok()
            .filter(|k| !k.trim().is_empty())
            .ok_or_else(|| TrackerError::MissingCredential(var.to_string()))?;

        Ok(Self {
            provider,
            base_url: provider.default_base_url().to_string(),
            api_key,
            model: DEFAULT_MODEL.to_string(),
        })
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Key prefix safe to print
    pub fn masked_key(&self) -> String {
        let prefix: String = self.api_key.chars().take(12).collect();
        format!("{}... ({} chars)", prefix, self.api_key.chars().count())
    }
}

/// Scoring run configuration
#[derive(Debug, Clone)]
pub struct ScoringConfig {
    pub prompt_template: String,
    pub max_tokens: u32,
    pub price_per_million: f64,
    /// Number of papers listed in the report's top-N section
    pub top_n: usize,
    /// Score at most this many records
    pub max_papers: Option<usize>,
}

impl Default for ScoringConfig {
    fn default() -> Self {
        Self {
            prompt_template: SCORING_PROMPT.to_string(),
            max_tokens: DEFAULT_MAX_TOKENS,
            price_per_million: DEFAULT_PRICE_PER_MILLION,
            top_n: 5,
            max_papers: None,
        }
    }
}

/// On-disk locations of the corpus stores.
#[derive(Debug, Clone)]
pub struct DataLayout {
    root: PathBuf,
}

impl DataLayout {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn raw_dir(&self) -> PathBuf {
        self.root.join("raw")
    }

    pub fn processed_dir(&self) -> PathBuf {
        self.root.join("processed")
    }

    pub fn curated(&self) -> PathBuf {
        self.raw_dir().join("curated_papers.csv")
    }

    pub fn not_found(&self) -> PathBuf {
        self.raw_dir().join("papers_not_found.csv")
    }

    pub fn scored(&self) -> PathBuf {
        self.processed_dir().join("scored_papers.csv")
    }

    /// Timestamped file for a keyword collection run
    pub fn arxiv_collection(&self, timestamp: &str) -> PathBuf {
        self.raw_dir().join(format!("arxiv_papers_{timestamp}.csv"))
    }

    /// Most recently modified `arxiv_papers_*.csv`, if any
    pub fn latest_arxiv_collection(&self) -> Option<PathBuf> {
        let entries = std::fs::read_dir(self.raw_dir()).ok()?;
        entries
            .filter_map(|e| e.ok())
            .map(|e| e.path())
            .filter(|p| is_collection_file(p))
            .filter_map(|p| {
                let modified = p.metadata().and_then(|m| m.modified()).ok()?;
                Some((modified, p))
            })
            .max_by_key(|(modified, _)| *modified)
            .map(|(_, p)| p)
    }
}

impl Default for DataLayout {
    fn default() -> Self {
        Self::new("data")
    }
}

fn is_collection_file(path: &Path) -> bool {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(|n| n.starts_with("arxiv_papers_") && n.ends_with(".csv"))
        .unwrap_or(false)
}
