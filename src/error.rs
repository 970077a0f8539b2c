//! Custom error types for rustpapertrack.
//!
//! Library functions return `Result<T, TrackerError>`; the binary wraps them in
//! `anyhow` at the command boundary.

use std::path::PathBuf;
use thiserror::Error;

/// Main error type for rustpapertrack operations.
#[derive(Debug, Error)]
pub enum TrackerError {
    /// Required API credential is not set in the environment
    #[error("Missing credential: {0} is not set (add it to your environment or .env file)")]
    MissingCredential(String),

    /// Required input file does not exist
    #[error("Input file not found: {}", .0.display())]
    MissingInputFile(PathBuf),

    /// Network/HTTP request error
    #[error("Network error: {0}")]
    Network(#[from] reqwest::Error),

    /// Response text could not be parsed (LLM output, HTML, XML, API body)
    #[error("Parse error: {0}")]
    Parse(String),

    /// Rate limited by external API
    #[error("Rate limited, retry after {0}s")]
    RateLimited(u64),

    /// External API returned an error
    #[error("API error: {code} - {message}")]
    Api {
        /// HTTP status or API error code
        code: i32,
        /// Error message from API
        message: String,
    },

    /// No adapter could resolve the title
    #[error("Not found: {0}")]
    NotFound(String),

    /// CAPTCHA detected
    #[error("CAPTCHA detected, please refresh cookies")]
    Captcha,

    /// File I/O error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    /// JSON serialization/deserialization error
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// CSV read/write error
    #[error("CSV error: {0}")]
    Csv(#[from] csv::Error),

    /// Excel workbook error
    #[error("Excel error: {0}")]
    Excel(String),

    /// Configuration error
    #[error("Config error: {0}")]
    Config(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),
}

impl TrackerError {
    /// True for failures caused by the model's reply rather than the call itself.
    pub fn is_parse(&self) -> bool {
        matches!(self, TrackerError::Parse(_) | TrackerError::Json(_))
    }
}

/// Result type alias using `TrackerError`
pub type Result<T> = std::result::Result<T, TrackerError>;

/// Extension trait for adding context to Option types
pub trait OptionExt<T> {
    /// Convert Option to Result with a parse error message
    fn ok_or_parse(self, msg: &str) -> Result<T>;
}

impl<T> OptionExt<T> for Option<T> {
    fn ok_or_parse(self, msg: &str) -> Result<T> {
        self.ok_or_else(|| TrackerError::Parse(msg.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_classification() {
        assert!(TrackerError::Parse("bad".into()).is_parse());
        assert!(!TrackerError::Api { code: 529, message: "overloaded".into() }.is_parse());
        assert!(!TrackerError::RateLimited(5).is_parse());
    }

    #[test]
    fn test_ok_or_parse() {
        let missing: Option<u8> = None;
        let err = missing.ok_or_parse("no entry").unwrap_err();
        assert_eq!(err.to_string(), "Parse error: no entry");
    }
}
