//! Read-only web dashboard over the scored corpus.
//!
//! The scored CSV is re-read on every request, so a fresh scoring run shows up
//! without restarting the server. Nothing is ever written back.

use crate::error::{Result, TrackerError};
use crate::record::ScoredRecord;
use crate::report::{self, Averages, RankedPaper};
use crate::store;
use axum::extract::{Query, State};
use axum::http::{header, StatusCode};
use axum::response::{Html, IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt::Write as _;
use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;
use tower_http::trace::TraceLayer;
use tracing::{error, info};

/// Top-N shown when the request does not ask for a size
const DEFAULT_TOP: usize = 5;

/// Shared server state
#[derive(Debug, Clone)]
pub struct DashboardState {
    pub scored_path: PathBuf,
}

/// Filters taken from the query string.
///
/// `maturity` is a comma-separated list of levels; absent means all levels.
/// Blank numeric fields, as a cleared form input sends them, count as absent.
#[derive(Debug, Default, Clone, Deserialize)]
pub struct PaperFilter {
    #[serde(default, deserialize_with = "blank_as_none")]
    min_relevance: Option<u8>,
    pub maturity: Option<String>,
    #[serde(default, deserialize_with = "blank_as_none")]
    pub top: Option<usize>,
}

fn blank_as_none<'de, D, T>(deserializer: D) -> std::result::Result<Option<T>, D::Error>
where
    D: serde::Deserializer<'de>,
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    let raw = Option::<String>::deserialize(deserializer)?;
    match raw.as_deref().map(str::trim) {
        None | Some("") => Ok(None),
        Some(s) => s.parse().map(Some).map_err(serde::de::Error::custom),
    }
}

impl PaperFilter {
    pub fn new(min_relevance: u8, maturity: Option<String>, top: Option<usize>) -> Self {
        Self {
            min_relevance: Some(min_relevance),
            maturity,
            top,
        }
    }

    /// Lowest relevance score kept, 0 when unset.
    pub fn min_relevance(&self) -> u8 {
        self.min_relevance.unwrap_or(0)
    }

    /// Selected maturity levels, or `None` for all.
    pub fn maturity_levels(&self) -> Option<Vec<u8>> {
        let raw = self.maturity.as_deref()?.trim();
        if raw.is_empty() {
            return None;
        }
        Some(raw.split(',').filter_map(|s| s.trim().parse().ok()).collect())
    }

    pub fn matches(&self, record: &ScoredRecord) -> bool {
        let levels = self.maturity_levels();
        record.scores.relevance_score >= self.min_relevance()
            && levels.map_or(true, |l| l.contains(&record.scores.maturity_level))
    }

    /// Keep matching records, most relevant first (ties in input order).
    pub fn apply(&self, records: Vec<ScoredRecord>) -> Vec<ScoredRecord> {
        let mut kept: Vec<ScoredRecord> = records.into_iter().filter(|r| self.matches(r)).collect();
        kept.sort_by(|a, b| b.scores.relevance_score.cmp(&a.scores.relevance_score));
        kept
    }

    /// Requested top-N size, clamped to 3..=10.
    pub fn top_n(&self) -> usize {
        self.top.unwrap_or(DEFAULT_TOP).clamp(3, 10)
    }
}

/// One point of the relevance/integration scatter
#[derive(Debug, Clone, Serialize, PartialEq)]
pub struct ScatterPoint {
    pub title: String,
    pub relevance_score: u8,
    pub integration_score: u8,
    pub maturity_level: u8,
}

/// Summary metrics and chart series for a filtered view
#[derive(Debug, Clone, Serialize)]
pub struct Summary {
    /// Records in the store before filtering
    pub total: usize,
    /// Records left after filtering
    pub count: usize,
    pub averages: Option<Averages>,
    pub defense_count: usize,
    pub defense_percent: f64,
    /// Index = relevance score 0..=10
    pub relevance_histogram: [usize; 11],
    /// Index 0 = maturity level 1
    pub maturity_counts: [usize; 5],
    pub per_year: BTreeMap<String, usize>,
    pub scatter: Vec<ScatterPoint>,
    pub top: Vec<RankedPaper>,
}

/// Four-digit year at the start of a `published` value.
fn year_of(published: &str) -> Option<&str> {
    published
        .get(..4)
        .filter(|y| y.chars().all(|c| c.is_ascii_digit()))
}

pub fn summarize(total: usize, filtered: &[ScoredRecord], top_n: usize) -> Summary {
    let mut per_year = BTreeMap::new();
    for r in filtered {
        if let Some(year) = r.get("published").and_then(year_of) {
            *per_year.entry(year.to_string()).or_insert(0) += 1;
        }
    }

    let defense_count = report::defense_count(filtered);
    Summary {
        total,
        count: filtered.len(),
        averages: Averages::of(filtered),
        defense_count,
        defense_percent: report::percent(defense_count, filtered.len()),
        relevance_histogram: report::relevance_histogram(filtered),
        maturity_counts: report::maturity_counts(filtered),
        per_year,
        scatter: filtered
            .iter()
            .map(|r| ScatterPoint {
                title: r.title().to_string(),
                relevance_score: r.scores.relevance_score,
                integration_score: r.scores.integration_score,
                maturity_level: r.scores.maturity_level,
            })
            .collect(),
        top: report::top_by_relevance(filtered, top_n),
    }
}

/// Error wrapper turning library errors into HTTP responses
struct ApiError(TrackerError);

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match self.0 {
            TrackerError::MissingInputFile(_) => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status.is_server_error() {
            error!(error = %self.0, "Dashboard request failed");
        }
        let message = match status {
            StatusCode::NOT_FOUND => format!("No data found. Run `rustpapertrack score` first. ({})", self.0),
            _ => self.0.to_string(),
        };
        (status, message).into_response()
    }
}

impl From<TrackerError> for ApiError {
    fn from(e: TrackerError) -> Self {
        Self(e)
    }
}

fn load(state: &DashboardState) -> Result<Vec<ScoredRecord>> {
    store::read_scored(&state.scored_path)
}

/// Build the dashboard router.
pub fn router(state: DashboardState) -> Router {
    Router::new()
        .route("/health", get(health_handler))
        .route("/", get(index_handler))
        .route("/api/papers", get(papers_handler))
        .route("/api/summary", get(summary_handler))
        .route("/api/download", get(download_handler))
        .layer(TraceLayer::new_for_http())
        .with_state(Arc::new(state))
}

/// Bind and serve until the process is stopped.
pub async fn serve(host: &str, port: u16, state: DashboardState) -> Result<()> {
    let addr: SocketAddr = format!("{}:{}", host, port)
        .parse()
        .map_err(|e| TrackerError::Config(format!("Invalid host:port '{}:{}': {}", host, port, e)))?;

    info!(addr = %addr, store = %state.scored_path.display(), "Starting dashboard");
    let listener = tokio::net::TcpListener::bind(addr).await?;
    println!("Dashboard listening on http://{}", addr);

    axum::serve(listener, router(state)).await?;
    Ok(())
}

async fn health_handler() -> &'static str {
    "OK"
}

async fn papers_handler(
    State(state): State<Arc<DashboardState>>,
    Query(filter): Query<PaperFilter>,
) -> std::result::Result<Json<Vec<BTreeMap<String, String>>>, ApiError> {
    let mut papers = filter.apply(load(&state)?);
    if let Some(top) = filter.top {
        papers.truncate(top);
    }
    Ok(Json(
        papers
            .into_iter()
            .map(|r| r.row.into_iter().collect())
            .collect(),
    ))
}

async fn summary_handler(
    State(state): State<Arc<DashboardState>>,
    Query(filter): Query<PaperFilter>,
) -> std::result::Result<Json<Summary>, ApiError> {
    let all = load(&state)?;
    let total = all.len();
    let filtered = filter.apply(all);
    Ok(Json(summarize(total, &filtered, filter.top_n())))
}

async fn download_handler(
    State(state): State<Arc<DashboardState>>,
    Query(filter): Query<PaperFilter>,
) -> std::result::Result<Response, ApiError> {
    let filtered = filter.apply(load(&state)?);
    let body = store::scored_to_csv(&filtered)?;
    let filename = format!("filtered_papers_{}.csv", chrono::Local::now().format("%Y%m%d"));
    Ok((
        [
            (header::CONTENT_TYPE, "text/csv; charset=utf-8".to_string()),
            (
                header::CONTENT_DISPOSITION,
                format!("attachment; filename=\"{}\"", filename),
            ),
        ],
        body,
    )
        .into_response())
}

async fn index_handler(
    State(state): State<Arc<DashboardState>>,
    Query(filter): Query<PaperFilter>,
) -> Response {
    match load(&state) {
        Ok(all) => {
            let total = all.len();
            let filtered = filter.apply(all);
            let summary = summarize(total, &filtered, filter.top_n());
            Html(render_page(&filter, &summary, &filtered)).into_response()
        }
        Err(TrackerError::MissingInputFile(path)) => Html(format!(
            "{}<p class=\"empty\">No data found at {}. Run <code>rustpapertrack score</code> first.</p></body></html>",
            PAGE_HEAD,
            escape(&path.display().to_string())
        ))
        .into_response(),
        Err(e) => ApiError(e).into_response(),
    }
}

fn escape(s: &str) -> String {
    let mut out = String::with_capacity(s.len());
    for c in s.chars() {
        match c {
            '&' => out.push_str("&amp;"),
            '<' => out.push_str("&lt;"),
            '>' => out.push_str("&gt;"),
            '"' => out.push_str("&quot;"),
            '\'' => out.push_str("&#39;"),
            _ => out.push(c),
        }
    }
    out
}

const PAGE_HEAD: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>DRL Cooperative Guidance Tracker</title>
<style>
body { font-family: system-ui, sans-serif; margin: 2rem; color: #222; }
.metrics { display: flex; gap: 1.5rem; margin: 1rem 0; }
.metric { border: 1px solid #ddd; border-radius: 6px; padding: 0.8rem 1.2rem; }
.metric b { display: block; font-size: 1.6rem; }
table { border-collapse: collapse; width: 100%; }
th, td { border-bottom: 1px solid #eee; padding: 0.3rem 0.5rem; text-align: left; vertical-align: top; }
.bar { background: #1f77b4; height: 0.8rem; display: inline-block; }
details { margin: 0.4rem 0; }
.empty { color: #a00; }
</style>
</head>
<body>
<h1>DRL Cooperative Guidance Tracker</h1>
"#;

fn render_bars(out: &mut String, rows: &[(String, usize)]) {
    let max = rows.iter().map(|(_, n)| *n).max().unwrap_or(0).max(1);
    out.push_str("<table>");
    for (label, n) in rows {
        let _ = write!(
            out,
            "<tr><td>{}</td><td><span class=\"bar\" style=\"width:{}px\"></span> {}</td></tr>",
            escape(label),
            n * 300 / max,
            n
        );
    }
    out.push_str("</table>");
}

fn render_page(filter: &PaperFilter, summary: &Summary, filtered: &[ScoredRecord]) -> String {
    let mut out = String::from(PAGE_HEAD);
    let query = format!(
        "min_relevance={}&maturity={}",
        filter.min_relevance(),
        urlencoding::encode(filter.maturity.as_deref().unwrap_or(""))
    );

    // filter form
    let _ = write!(
        out,
        "<form method=\"get\" action=\"/\">\
         Minimum relevance <input type=\"number\" name=\"min_relevance\" min=\"0\" max=\"10\" value=\"{}\"> \
         Maturity levels <input type=\"text\" name=\"maturity\" placeholder=\"1,2,3,4,5\" value=\"{}\"> \
         Top <input type=\"number\" name=\"top\" min=\"3\" max=\"10\" value=\"{}\"> \
         <button type=\"submit\">Apply</button> \
         <a href=\"/api/download?{}\">Download filtered CSV</a></form>",
        filter.min_relevance(),
        escape(filter.maturity.as_deref().unwrap_or("")),
        filter.top_n(),
        escape(&query)
    );

    // executive summary
    let (avg_rel, avg_mat) = summary
        .averages
        .map(|a| (format!("{:.1}/10", a.relevance), format!("{:.1}/5", a.maturity)))
        .unwrap_or_else(|| ("-".to_string(), "-".to_string()));
    let _ = write!(
        out,
        "<h2>Executive Summary</h2><div class=\"metrics\">\
         <div class=\"metric\">Papers tracked<b>{}</b></div>\
         <div class=\"metric\">Avg relevance<b>{}</b></div>\
         <div class=\"metric\">Avg maturity<b>{}</b></div>\
         <div class=\"metric\">Defense connection<b>{:.0}%</b></div></div>",
        summary.count, avg_rel, avg_mat, summary.defense_percent
    );

    out.push_str("<h2>Relevance Distribution</h2>");
    let rel: Vec<(String, usize)> = summary
        .relevance_histogram
        .iter()
        .enumerate()
        .map(|(score, n)| (score.to_string(), *n))
        .collect();
    render_bars(&mut out, &rel);

    out.push_str("<h2>Technology Maturity Levels</h2>");
    let mat: Vec<(String, usize)> = summary
        .maturity_counts
        .iter()
        .enumerate()
        .map(|(i, n)| (format!("TRL {}", i + 1), *n))
        .collect();
    render_bars(&mut out, &mat);

    out.push_str("<h2>Publication Timeline</h2>");
    let years: Vec<(String, usize)> = summary.per_year.iter().map(|(y, n)| (y.clone(), *n)).collect();
    render_bars(&mut out, &years);

    let _ = write!(out, "<h2>Top {} Papers by Relevance</h2>", summary.top.len());
    for record in filtered.iter().take(summary.top.len()) {
        let _ = write!(
            out,
            "<details><summary><b>{}</b> (Relevance: {}/10)</summary>\
             <p>Maturity {}/5, Integration {}/10</p>\
             <p><b>Authors:</b> {}<br><b>Published:</b> {}</p>\
             <p><b>Key Achievements:</b> {}</p><p><b>Limitations:</b> {}</p><p><b>Analysis:</b> {}</p>",
            escape(record.title()),
            record.scores.relevance_score,
            record.scores.maturity_level,
            record.scores.integration_score,
            escape(record.get("authors").unwrap_or("Unknown")),
            escape(record.get("published").unwrap_or("Unknown")),
            escape(&record.scores.achievements),
            escape(&record.scores.limitations),
            escape(&record.scores.reasoning),
        );
        if let Some(url) = record.get("url").filter(|u| u.starts_with("http")) {
            let _ = write!(out, "<p><a href=\"{}\">View paper</a></p>", escape(url));
        }
        out.push_str("</details>");
    }

    out.push_str(
        "<h2>All Papers</h2><table><tr><th>Title</th><th>Authors</th><th>Relevance</th>\
         <th>Maturity</th><th>Credibility</th><th>Integration</th><th>Published</th></tr>",
    );
    for r in filtered {
        let _ = write!(
            out,
            "<tr><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td><td>{}</td></tr>",
            escape(r.title()),
            escape(r.get("authors").unwrap_or("")),
            r.scores.relevance_score,
            r.scores.maturity_level,
            r.scores.credibility_score,
            r.scores.integration_score,
            escape(r.get("published").unwrap_or("")),
        );
    }
    out.push_str("</table>");

    let _ = write!(
        out,
        "<p><small>Generated {} | Total papers in database: {} | Displayed: {}</small></p></body></html>",
        chrono::Local::now().format("%Y-%m-%d %H:%M:%S"),
        summary.total,
        summary.count
    );
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PaperRecord;
    use axum::body::Body;
    use axum::http::Request;
    use serde_json::{json, Value};
    use tempfile::tempdir;
    use tower::util::ServiceExt;

    fn scored(title: &str, relevance: u8, maturity: u8, published: &str) -> ScoredRecord {
        let mut paper = PaperRecord::new(title);
        paper.published = Some(published.to_string());
        let obj = json!({
            "relevance_score": relevance,
            "maturity_level": maturity,
            "credibility_score": 5,
            "integration_score": 4,
            "chinese_defense": relevance > 7,
            "institution_type": "university",
            "reasoning": "<b>bold</b>"
        });
        let obj = obj.as_object().cloned().unwrap_or_default();
        ScoredRecord::merge(&paper, &obj, 100).unwrap()
    }

    fn corpus() -> Vec<ScoredRecord> {
        vec![
            scored("Low", 2, 1, "2021-03-01"),
            scored("High", 9, 2, "2023-01-15"),
            scored("Mid", 6, 3, "2023-07-30"),
            scored("Also high", 9, 4, "Unknown"),
        ]
    }

    #[test]
    fn test_filter_relevance_and_maturity() {
        let filter = PaperFilter::new(5, Some("2, 3".to_string()), None);
        let titles: Vec<_> = filter
            .apply(corpus())
            .iter()
            .map(|r| r.title().to_string())
            .collect();
        assert_eq!(titles, vec!["High", "Mid"]);
    }

    #[test]
    fn test_default_filter_keeps_all_sorted() {
        let titles: Vec<_> = PaperFilter::default()
            .apply(corpus())
            .iter()
            .map(|r| r.title().to_string())
            .collect();
        assert_eq!(titles, vec!["High", "Also high", "Mid", "Low"]);
    }

    #[test]
    fn test_top_n_clamped() {
        assert_eq!(PaperFilter::default().top_n(), 5);
        let filter = PaperFilter {
            top: Some(50),
            ..Default::default()
        };
        assert_eq!(filter.top_n(), 10);
    }

    #[test]
    fn test_summary_series() {
        let records = corpus();
        let summary = summarize(records.len(), &records, 3);
        assert_eq!(summary.count, 4);
        assert_eq!(summary.defense_count, 2);
        assert_eq!(summary.defense_percent, 50.0);
        assert_eq!(summary.relevance_histogram[9], 2);
        assert_eq!(summary.maturity_counts, [1, 1, 1, 1, 0]);
        assert_eq!(summary.per_year.get("2023"), Some(&2));
        assert_eq!(summary.per_year.get("2021"), Some(&1));
        assert_eq!(summary.per_year.len(), 2);
        assert_eq!(summary.top.len(), 3);
    }

    fn state_with(records: &[ScoredRecord]) -> (tempfile::TempDir, DashboardState) {
        let dir = tempdir().unwrap();
        let scored_path = dir.path().join("scored_papers.csv");
        store::write_scored(&scored_path, records).unwrap();
        (dir, DashboardState { scored_path })
    }

    async fn get_body(app: Router, uri: &str) -> (StatusCode, Vec<u8>) {
        let response = app
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, bytes.to_vec())
    }

    #[tokio::test]
    async fn test_health() {
        let (_dir, state) = state_with(&[]);
        let (status, body) = get_body(router(state), "/health").await;
        assert_eq!(status, StatusCode::OK);
        assert_eq!(body, b"OK");
    }

    #[tokio::test]
    async fn test_api_papers_filters() {
        let (_dir, state) = state_with(&corpus());
        let (status, body) = get_body(router(state), "/api/papers?min_relevance=6&maturity=2,3,4&top=2").await;
        assert_eq!(status, StatusCode::OK);
        let papers: Value = serde_json::from_slice(&body).unwrap();
        let papers = papers.as_array().unwrap();
        assert_eq!(papers.len(), 2);
        assert_eq!(papers[0]["title"], "High");
        assert_eq!(papers[0]["relevance_score"], "9");
    }

    #[tokio::test]
    async fn test_blank_form_fields_use_defaults() {
        let (_dir, state) = state_with(&corpus());
        let (status, body) = get_body(router(state), "/api/papers?min_relevance=&maturity=&top=").await;
        assert_eq!(status, StatusCode::OK);
        let papers: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(papers.as_array().unwrap().len(), 4);
    }

    #[test]
    fn test_blank_filter_query_parses() {
        let filter: PaperFilter = parse_query("min_relevance=&top=+");
        assert_eq!(filter.min_relevance(), 0);
        assert_eq!(filter.top_n(), 5);
        let filter: PaperFilter = parse_query("min_relevance=7&top=3");
        assert_eq!(filter.min_relevance(), 7);
        assert_eq!(filter.top_n(), 3);
    }

    fn parse_query(q: &str) -> PaperFilter {
        let uri: axum::http::Uri = format!("/?{q}").parse().unwrap();
        Query::<PaperFilter>::try_from_uri(&uri).unwrap().0
    }

    #[tokio::test]
    async fn test_api_summary_counts_total() {
        let (_dir, state) = state_with(&corpus());
        let (_, body) = get_body(router(state), "/api/summary?min_relevance=9").await;
        let summary: Value = serde_json::from_slice(&body).unwrap();
        assert_eq!(summary["total"], 4);
        assert_eq!(summary["count"], 2);
    }

    #[tokio::test]
    async fn test_download_is_csv() {
        let (_dir, state) = state_with(&corpus());
        let response = router(state)
            .oneshot(Request::builder().uri("/api/download?min_relevance=9").body(Body::empty()).unwrap())
            .await
            .unwrap();
        let disposition = response.headers()[header::CONTENT_DISPOSITION].to_str().unwrap().to_string();
        assert!(disposition.contains("filtered_papers_"));
        let bytes = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        let text = String::from_utf8(bytes.to_vec()).unwrap();
        assert!(text.starts_with("title,"));
        assert_eq!(text.lines().count(), 3);
    }

    #[tokio::test]
    async fn test_index_escapes_and_handles_missing_store() {
        let (_dir, state) = state_with(&corpus());
        let (status, body) = get_body(router(state), "/").await;
        assert_eq!(status, StatusCode::OK);
        let html = String::from_utf8(body).unwrap();
        assert!(html.contains("Executive Summary"));
        assert!(html.contains("&lt;b&gt;bold&lt;/b&gt;"));

        let missing = DashboardState {
            scored_path: PathBuf::from("/nonexistent/scored.csv"),
        };
        let (status, body) = get_body(router(missing.clone()), "/").await;
        assert_eq!(status, StatusCode::OK);
        assert!(String::from_utf8(body).unwrap().contains("No data found"));
        let (status, _) = get_body(router(missing), "/api/papers").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
