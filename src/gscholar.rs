//! Google Scholar title lookup.
//!
//! Fetches a Scholar results page over plain HTTP with stored browser cookies
//! and scrapes the result list. Used as the fallback when arXiv has no match
//! for a title.

use crate::cookies::CookieManager;
use crate::error::{Result, TrackerError};
use crate::record::PaperRecord;
use regex::Regex;
use scraper::{Html, Selector};
use std::time::Duration;
use tracing::{debug, info, warn};
use url::Url;

/// Default Google Scholar URL
pub const DEFAULT_SCHOLAR_URL: &str = "https://scholar.google.com";

/// Source label written into found records
pub const SOURCE: &str = "google_scholar";

/// Placeholders for metadata Scholar does not expose
pub const NO_ABSTRACT: &str = "Abstract not available from Google Scholar";
pub const NO_URL: &str = "No URL available";
pub const NO_CATEGORIES: &str = "Not specified";
const UNKNOWN: &str = "Unknown";

const USER_AGENT: &str = "Mozilla/5.0 (Windows NT 10.0; Win64; x64) AppleWebKit/537.36 (KHTML, like Gecko) Chrome/131.0.0.0 Safari/537.36";

/// A single entry of a Scholar results page
#[derive(Debug, Clone, Default, PartialEq)]
pub struct ScholarResult {
    pub title: String,
    pub author: String,
    pub year: String,
    pub venue: String,
    pub article_url: String,
    pub citations: String,
    /// Text excerpt shown under the result
    pub snippet: String,
}

impl ScholarResult {
    /// Convert to the common record shape, filling Scholar's placeholders.
    pub fn into_record(self, search_title: &str) -> PaperRecord {
        let or = |s: String, placeholder: &str| {
            if s.trim().is_empty() {
                placeholder.to_string()
            } else {
                s
            }
        };
        let mut record = PaperRecord {
            title: Some(self.title),
            authors: Some(or(self.author, UNKNOWN)),
            abstract_text: Some(or(self.snippet, NO_ABSTRACT)),
            published: Some(or(self.year, UNKNOWN)),
            url: Some(or(self.article_url, NO_URL)),
            categories: Some(NO_CATEGORIES.to_string()),
            source: Some(SOURCE.to_string()),
            extra: Vec::new(),
        };
        record.set_extra("search_title", search_title);
        record.set_extra("match_quality", SOURCE);
        record
    }
}

/// Connection options for Scholar
#[derive(Debug, Clone, Default)]
pub struct ScholarOptions {
    /// Proxy URL (e.g., "http://127.0.0.1:7890")
    pub proxy: Option<String>,
    /// Mirror site replacing [`DEFAULT_SCHOLAR_URL`]
    pub base_url: Option<String>,
}

/// Google Scholar scraper
pub struct ScholarClient {
    http: reqwest::Client,
    base_url: String,
    cookies: CookieManager,
}

impl ScholarClient {
    pub fn new(options: &ScholarOptions, cookies: CookieManager) -> Result<Self> {
        let base_url = options
            .base_url
            .as_deref()
            .map(|s| s.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_SCHOLAR_URL.to_string());

        Ok(Self {
            http: build_http_client(options.proxy.as_deref())?,
            base_url,
            cookies,
        })
    }

    /// Search Scholar for `title` and take the first result.
    pub async fn lookup_title(&self, title: &str) -> Result<PaperRecord> {
        let results = self.search(title).await?;
        let first = results
            .into_iter()
            .next()
            .ok_or_else(|| TrackerError::NotFound(title.to_string()))?;
        info!(found = %first.title, "Found on Google Scholar");
        Ok(first.into_record(title))
    }

    /// Fetch and parse the first results page for `query`.
    pub async fn search(&self, query: &str) -> Result<Vec<ScholarResult>> {
        let url = build_search_url(&self.base_url, query)?;

        // jitter to look less like a bot
        let delay = rand::random::<u64>() % 1500 + 500;
        tokio::time::sleep(Duration::from_millis(delay)).await;

        let cookie_header = self.cookies.header_for("google");
        if cookie_header.is_empty() {
            warn!("No Scholar cookies loaded; use `rustpapertrack cookies import` to add some");
        }

        debug!(url = %url, "Fetching Scholar page");
        let html = self.fetch_page(&url, &cookie_header).await?;

        if is_captcha_page(&html) {
            warn!("CAPTCHA detected");
            return Err(TrackerError::Captcha);
        }

        let results = parse_result_items(&html)?;
        debug!(count = results.len(), "Parsed Scholar results");
        Ok(results)
    }

    async fn fetch_page(&self, url: &Url, cookie_header: &str) -> Result<String> {
        let mut request = self
            .http
            .get(url.as_str())
            .header("Accept", "text/html,application/xhtml+xml,application/xml;q=0.9,*/*;q=0.8")
            .header("Accept-Language", "en-US,en;q=0.9")
            .header("Upgrade-Insecure-Requests", "1");

        if !cookie_header.is_empty() {
            request = request.header("Cookie", cookie_header);
        }

        let response = request.send().await?;

        let status = response.status();
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            return Err(TrackerError::RateLimited(60));
        }
        if !status.is_success() {
            return Err(TrackerError::Api {
                code: status.as_u16() as i32,
                message: format!("HTTP error: {}", status),
            });
        }

        Ok(response.text().await?)
    }
}

fn build_http_client(proxy: Option<&str>) -> Result<reqwest::Client> {
    let mut builder = reqwest::Client::builder()
        .user_agent(USER_AGENT)
        .timeout(Duration::from_secs(30))
        .cookie_store(true);

    if let Some(proxy_url) = proxy {
        let proxy = reqwest::Proxy::all(proxy_url)
            .map_err(|e| TrackerError::Config(format!("Invalid proxy URL '{}': {}", proxy_url, e)))?;
        builder = builder.proxy(proxy);
    }

    builder
        .build()
        .map_err(|e| TrackerError::Config(format!("Failed to build HTTP client: {}", e)))
}

fn build_search_url(base_url: &str, query: &str) -> Result<Url> {
    let mut url = Url::parse(&format!("{}/scholar", base_url))
        .map_err(|e| TrackerError::Config(format!("Invalid base URL: {}", e)))?;

    url.query_pairs_mut()
        .append_pair("q", query)
        // English locale keeps the metadata line parseable
        .append_pair("hl", "en")
        .append_pair("as_sdt", "0,5");

    Ok(url)
}

fn is_captcha_page(html: &str) -> bool {
    html.contains("Solving the above CAPTCHA")
        || html.contains("unusual traffic")
        || html.contains("id=\"gs_captcha_f\"")
}

fn selector(css: &str) -> Result<Selector> {
    Selector::parse(css).map_err(|e| TrackerError::Parse(e.to_string()))
}

/// Parse a Scholar results page.
pub fn parse_result_items(html: &str) -> Result<Vec<ScholarResult>> {
    let document = Html::parse_document(html);

    let item_selector = selector("div.gs_r.gs_or.gs_scl")?;
    let title_selector = selector("h3.gs_rt")?;
    let link_selector = selector("h3.gs_rt a")?;
    let meta_selector = selector("div.gs_a")?;
    let snippet_selector = selector("div.gs_rs")?;
    let cite_selector = selector("div.gs_fl a")?;

    let year_regex = Regex::new(r"\b(19|20)\d{2}\b").map_err(|e| TrackerError::Parse(e.to_string()))?;
    let cite_regex = Regex::new(r"Cited by\s*(\d+)").map_err(|e| TrackerError::Parse(e.to_string()))?;
    // "[PDF]", "[HTML]", "[CITATION]" markers
    let tag_regex = Regex::new(r"^\s*(\[[A-Z]+\]\s*)+").map_err(|e| TrackerError::Parse(e.to_string()))?;

    let mut results = Vec::new();

    for item in document.select(&item_selector) {
        let mut data = ScholarResult::default();

        if let Some(link) = item.select(&link_selector).next() {
            data.title = link.text().collect::<String>().trim().to_string();
            data.article_url = link.value().attr("href").unwrap_or("").to_string();
        } else if let Some(title_elem) = item.select(&title_selector).next() {
            let text = title_elem.text().collect::<String>();
            data.title = tag_regex.replace(&text, "").trim().to_string();
        }

        if let Some(meta_elem) = item.select(&meta_selector).next() {
            // "A Author, B Author - Venue, 2021 - publisher.com"
            let meta_text = meta_elem.text().collect::<String>().replace('\u{a0}', " ");
            let mut parts = meta_text.split(" - ");

            if let Some(authors) = parts.next() {
                data.author = authors.trim().trim_end_matches('…').trim().to_string();
            }
            if let Some(venue_year) = parts.next() {
                match year_regex.find(venue_year) {
                    Some(year) => {
                        data.year = year.as_str().to_string();
                        data.venue = venue_year[..year.start()].trim().trim_end_matches(',').to_string();
                    }
                    None => data.venue = venue_year.trim().to_string(),
                }
            }
        }

        if let Some(snippet_elem) = item.select(&snippet_selector).next() {
            let text = snippet_elem.text().collect::<String>();
            data.snippet = text.split_whitespace().collect::<Vec<_>>().join(" ");
        }

        for link in item.select(&cite_selector) {
            let href = link.value().attr("href").unwrap_or("");
            if !href.contains("cites=") {
                continue;
            }
            let text = link.text().collect::<String>();
            if let Some(count) = cite_regex.captures(&text).and_then(|c| c.get(1)) {
                data.citations = count.as_str().to_string();
                break;
            }
        }

        if !data.title.is_empty() {
            results.push(data);
        }
    }

    Ok(results)
}
