//! Semantic Scholar API Client
//!
//! Title search used by the not-found recovery pass.
//!
//! API Details:
//! - Search endpoint: GET /graph/v1/paper/search
//! - Rate limit: 1 req/s (unauthenticated), higher with API key

use crate::error::{Result, TrackerError};
use crate::record::PaperRecord;
use reqwest::Client;
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, warn};

/// Semantic Scholar API base URL
const SS_API_BASE: &str = "https://api.semanticscholar.org/graph/v1";

/// Fields requested for each hit
const SEARCH_FIELDS: &str = "title,authors,abstract,year,url,venue,publicationTypes";

/// Candidates requested per title
const SEARCH_LIMIT: usize = 3;

/// Environment variable holding the optional API key
pub const API_KEY_VAR: &str = "SEMANTIC_SCHOLAR_API_KEY";

/// Source label written into found records
pub const SOURCE: &str = "semantic_scholar";

#[derive(Debug, Deserialize)]
struct SearchResponse {
    #[serde(default)]
    data: Vec<SSPaper>,
}

#[derive(Debug, Deserialize)]
struct SSPaper {
    title: Option<String>,
    #[serde(default)]
    authors: Vec<SSAuthor>,
    #[serde(rename = "abstract")]
    abstract_text: Option<String>,
    year: Option<i32>,
    url: Option<String>,
    venue: Option<String>,
}

#[derive(Debug, Deserialize)]
struct SSAuthor {
    name: Option<String>,
}

impl SSPaper {
    /// Missing fields get the same placeholders the recovery pass has always
    /// written, so rows from every run look alike.
    fn into_record(self, searched: &str) -> PaperRecord {
        let authors = self
            .authors
            .into_iter()
            .map(|a| a.name.unwrap_or_else(|| "Unknown".to_string()))
            .collect::<Vec<_>>()
            .join(", ");
        PaperRecord {
            title: Some(self.title.unwrap_or_else(|| searched.to_string())),
            authors: Some(authors),
            abstract_text: Some(self.abstract_text.unwrap_or_else(|| "Abstract not available".to_string())),
            published: Some(self.year.map(|y| y.to_string()).unwrap_or_else(|| "Unknown".to_string())),
            url: Some(self.url.unwrap_or_else(|| "No URL".to_string())),
            categories: Some(
                self.venue
                    .filter(|v| !v.is_empty())
                    .unwrap_or_else(|| "Not specified".to_string()),
            ),
            source: Some(SOURCE.to_string()),
            extra: Vec::new(),
        }
    }
}

/// Semantic Scholar Graph API client
pub struct SemanticScholarClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
}

impl SemanticScholarClient {
    pub fn new(api_key: Option<String>) -> Result<Self> {
        let http = Client::builder()
            .timeout(Duration::from_secs(10))
            .build()
            .map_err(|e| TrackerError::Config(format!("Failed to build HTTP client: {}", e)))?;
        Ok(Self {
            http,
            base_url: SS_API_BASE.to_string(),
            api_key: api_key.filter(|k| !k.trim().is_empty()),
        })
    }

    /// Client with the key from [`API_KEY_VAR`], if set.
    pub fn from_env() -> Result<Self> {
        Self::new(std::env::var(API_KEY_VAR).ok())
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Search by title and take the first hit.
    pub async fn lookup_title(&self, title: &str) -> Result<PaperRecord> {
        let url = format!("{}/paper/search", self.base_url.trim_end_matches('/'));
        debug!(url = %url, title = %title, "Searching Semantic Scholar");

        let mut request = self.http.get(&url).query(&[
            ("query", title),
            ("fields", SEARCH_FIELDS),
            ("limit", &SEARCH_LIMIT.to_string()),
        ]);
        if let Some(key) = &self.api_key {
            request = request.header("x-api-key", key);
        }

        let response = request.send().await?;
        let status = response.status();

        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(TrackerError::RateLimited(1));
        }
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_default();
            warn!(status = status.as_u16(), error = %error_text, "API error");
            return Err(TrackerError::Api {
                code: status.as_u16() as i32,
                message: format!("Semantic Scholar API error: {} - {}", status, error_text),
            });
        }

        let body = response.text().await?;
        parse_search(&body, title)
    }
}

/// First hit of a search response as a record.
fn parse_search(body: &str, searched: &str) -> Result<PaperRecord> {
    let response: SearchResponse = serde_json::from_str(body)
        .map_err(|e| TrackerError::Parse(format!("Failed to parse Semantic Scholar response: {}", e)))?;

    response
        .data
        .into_iter()
        .next()
        .map(|paper| paper.into_record(searched))
        .ok_or_else(|| TrackerError::NotFound(searched.to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_search_first_hit() {
        let body = r#"{
            "total": 2, "offset": 0,
            "data": [
                {
                    "paperId": "abc",
                    "title": "Cooperative Guidance of Multiple Missiles",
                    "authors": [{"authorId": "1", "name": "Wei Zhang"}, {"authorId": null, "name": "Mei Lin"}],
                    "abstract": "A cooperative guidance law.",
                    "year": 2021,
                    "url": "https://www.semanticscholar.org/paper/abc",
                    "venue": "Journal of Guidance",
                    "publicationTypes": ["JournalArticle"]
                },
                {"paperId": "def", "title": "Other"}
            ]
        }"#;
        let record = parse_search(body, "cooperative guidance").unwrap();
        assert_eq!(record.title.as_deref(), Some("Cooperative Guidance of Multiple Missiles"));
        assert_eq!(record.authors.as_deref(), Some("Wei Zhang, Mei Lin"));
        assert_eq!(record.published.as_deref(), Some("2021"));
        assert_eq!(record.categories.as_deref(), Some("Journal of Guidance"));
        assert_eq!(record.source.as_deref(), Some("semantic_scholar"));
    }

    #[test]
    fn test_parse_search_placeholders() {
        let body = r#"{"data": [{"paperId": "x", "title": null, "abstract": null, "venue": "", "publicationTypes": null}]}"#;
        let record = parse_search(body, "Searched Title").unwrap();
        assert_eq!(record.title.as_deref(), Some("Searched Title"));
        assert_eq!(record.abstract_text.as_deref(), Some("Abstract not available"));
        assert_eq!(record.published.as_deref(), Some("Unknown"));
        assert_eq!(record.url.as_deref(), Some("No URL"));
        assert_eq!(record.categories.as_deref(), Some("Not specified"));
    }

    #[test]
    fn test_parse_search_no_hits() {
        let err = parse_search(r#"{"total": 0, "offset": 0}"#, "missing").unwrap_err();
        assert!(matches!(err, TrackerError::NotFound(_)));
        assert!(parse_search("not json", "x").unwrap_err().is_parse());
    }
}
