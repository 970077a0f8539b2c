//! arXiv API client.
//!
//! Queries the Atom export API for keyword search and title lookup. Requests
//! are spaced by an [`IntervalGate`] as arXiv asks clients to wait three
//! seconds between calls.

use crate::error::{OptionExt, Result, TrackerError};
use crate::rate_limit::{IntervalGate, RateLimiter};
use crate::record::PaperRecord;
use quick_xml::events::{BytesStart, Event};
use quick_xml::Reader;
use std::time::Duration;
use tracing::{debug, info};

/// arXiv Atom API endpoint
const ARXIV_API_URL: &str = "http://export.arxiv.org/api/query";

/// Minimum spacing between arXiv requests
const ARXIV_INTERVAL: Duration = Duration::from_secs(3);

/// Candidates fetched for a title lookup
const TITLE_LOOKUP_RESULTS: usize = 3;

/// Request timeout in seconds
const REQUEST_TIMEOUT_SECS: u64 = 30;

/// Source label written into collected records
pub const SOURCE: &str = "arxiv";

/// Default keyword queries for a collection run
pub const DEFAULT_QUERIES: &[&str] = &[
    "cooperative guidance reinforcement learning",
    "multi-agent missile guidance",
    "distributed UAV swarm control",
];

/// Results requested per keyword query
pub const DEFAULT_RESULTS_PER_QUERY: usize = 15;

/// One `<entry>` of an Atom feed.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ArxivEntry {
    /// Abstract page URL (the entry id)
    pub id: String,
    pub title: String,
    pub summary: String,
    /// RFC 3339 timestamp
    pub published: String,
    pub authors: Vec<String>,
    pub categories: Vec<String>,
}

impl ArxivEntry {
    /// Convert to the common record shape.
    pub fn into_record(self) -> PaperRecord {
        let present = |s: String| (!s.is_empty()).then_some(s);
        let published = self.published.get(..10).unwrap_or(&self.published).to_string();
        PaperRecord {
            title: present(self.title),
            authors: present(self.authors.join(", ")),
            abstract_text: present(self.summary),
            published: present(published),
            url: present(self.id),
            categories: present(self.categories.join(", ")),
            source: Some(SOURCE.to_string()),
            extra: Vec::new(),
        }
    }
}

/// Whether `searched` occurs (case-insensitively) inside `found`.
pub fn match_quality(searched: &str, found: &str) -> &'static str {
    if found.to_lowercase().contains(&searched.to_lowercase()) {
        "exact"
    } else {
        "partial"
    }
}

/// arXiv Atom API client
pub struct ArxivClient {
    http: reqwest::Client,
    base_url: String,
    gate: IntervalGate,
}

impl ArxivClient {
    pub fn new() -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(Duration::from_secs(REQUEST_TIMEOUT_SECS))
            .build()
            .map_err(|e| TrackerError::Config(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            http,
            base_url: ARXIV_API_URL.to_string(),
            gate: IntervalGate::new(ARXIV_INTERVAL),
        })
    }

    /// Point the client at a different endpoint.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    async fn fetch(&self, params: &[(&str, String)]) -> Result<Vec<ArxivEntry>> {
        self.gate.pace().await;

        debug!(params = ?params, "Querying arXiv");
        let response = self.http.get(&self.base_url).query(params).send().await?;

        let status = response.status();
        if !status.is_success() {
            return Err(TrackerError::Api {
                code: status.as_u16() as i32,
                message: format!("arXiv API error: {}", status),
            });
        }

        let body = response.text().await?;
        parse_feed(&body)
    }

    /// Keyword search, newest submissions first.
    pub async fn search(&self, query: &str, max_results: usize) -> Result<Vec<PaperRecord>> {
        let params = [
            ("search_query", format!("all:{}", query)),
            ("start", "0".to_string()),
            ("max_results", max_results.to_string()),
            ("sortBy", "submittedDate".to_string()),
            ("sortOrder", "descending".to_string()),
        ];
        let entries = self.fetch(&params).await?;
        info!(query = %query, count = entries.len(), "arXiv search complete");
        Ok(entries.into_iter().map(ArxivEntry::into_record).collect())
    }

    /// Look a paper up by title and take the first hit.
    ///
    /// The returned record carries `search_title` and `match_quality` columns.
    pub async fn lookup_title(&self, title: &str) -> Result<PaperRecord> {
        let params = [
            ("search_query", format!("ti:\"{}\"", title.replace('"', ""))),
            ("start", "0".to_string()),
            ("max_results", TITLE_LOOKUP_RESULTS.to_string()),
        ];
        let entry = self
            .fetch(&params)
            .await?
            .into_iter()
            .next()
            .ok_or_else(|| TrackerError::NotFound(title.to_string()))?;

        let quality = match_quality(title, &entry.title);
        let mut record = entry.into_record();
        record.set_extra("search_title", title);
        record.set_extra("match_quality", quality);
        Ok(record)
    }
}

fn normalize_ws(s: &str) -> String {
    s.split_whitespace().collect::<Vec<_>>().join(" ")
}

fn attr(e: &BytesStart<'_>, key: &str) -> Option<String> {
    e.attributes()
        .flatten()
        .find(|a| a.key.as_ref() == key.as_bytes())
        .and_then(|a| a.unescape_value().ok())
        .map(|v| v.to_string())
}

fn local_name(e: &[u8]) -> &[u8] {
    match e.iter().rposition(|b| *b == b':') {
        Some(i) => &e[i + 1..],
        None => e,
    }
}

/// Parse an Atom feed into its entries.
pub fn parse_feed(body: &str) -> Result<Vec<ArxivEntry>> {
    let mut reader = Reader::from_str(body);
    reader.config_mut().trim_text(true);

    let mut entries = Vec::new();
    let mut current: Option<ArxivEntry> = None;
    let mut in_author = false;
    let mut text = String::new();

    loop {
        match reader.read_event() {
            Ok(Event::Eof) => break,
            Ok(Event::Start(e)) => {
                match local_name(e.name().as_ref()) {
                    b"entry" => current = Some(ArxivEntry::default()),
                    b"author" => in_author = true,
                    b"category" => {
                        if let (Some(entry), Some(term)) = (current.as_mut(), attr(&e, "term")) {
                            entry.categories.push(term);
                        }
                    }
                    _ => {}
                }
                text.clear();
            }
            Ok(Event::Empty(e)) => {
                if local_name(e.name().as_ref()) == b"category" {
                    if let (Some(entry), Some(term)) = (current.as_mut(), attr(&e, "term")) {
                        entry.categories.push(term);
                    }
                }
            }
            Ok(Event::Text(t)) => {
                let chunk = t
                    .unescape()
                    .map_err(|e| TrackerError::Parse(format!("Atom text: {}", e)))?;
                text.push_str(&chunk);
            }
            Ok(Event::End(e)) => {
                let name = local_name(e.name().as_ref()).to_vec();
                if name == b"entry" {
                    let entry = current.take().ok_or_parse("unbalanced </entry>")?;
                    entries.push(entry);
                } else if let Some(entry) = current.as_mut() {
                    let value = normalize_ws(&text);
                    match name.as_slice() {
                        b"id" => entry.id = value,
                        b"title" => entry.title = value,
                        b"summary" => entry.summary = value,
                        b"published" => entry.published = value,
                        b"name" if in_author => entry.authors.push(value),
                        b"author" => in_author = false,
                        _ => {}
                    }
                }
                text.clear();
            }
            Err(e) => {
                return Err(TrackerError::Parse(format!(
                    "Atom feed error at {}: {}",
                    reader.error_position(),
                    e
                )))
            }
            _ => {}
        }
    }

    Ok(entries)
}
