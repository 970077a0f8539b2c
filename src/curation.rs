//! Building the curated corpus.
//!
//! Three flows write the raw stores:
//!
//! - keyword collection from arXiv into a timestamped file,
//! - resolving a seed list of titles from an Excel workbook (arXiv first,
//!   Google Scholar as fallback) into `curated_papers.csv`,
//! - a recovery pass over `papers_not_found.csv` against Semantic Scholar
//!   that appends what it finds.
//!
//! Every title is tried once; a lookup failure sends it to the not-found list.

use crate::arxiv::ArxivClient;
use crate::config::DataLayout;
use crate::error::{Result, TrackerError};
use crate::gscholar::ScholarClient;
use crate::progress::Progress;
use crate::rate_limit::RateLimiter;
use crate::record::{dedup_by_url, PaperRecord};
use crate::semanticscholar::SemanticScholarClient;
use crate::store;
use calamine::{open_workbook_auto, Data, Reader};
use std::future::Future;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::{info, warn};

/// Pause after each title of an Excel run
pub const EXCEL_PACING: Duration = Duration::from_secs(3);

/// Pause after each title of a recovery pass
pub const RECOVERY_PACING: Duration = Duration::from_secs(1);

/// Default seed workbook
pub const DEFAULT_WORKBOOK: &str = "curated_paper_titles.xlsx";

/// Anything that can resolve a paper title to a record.
pub trait TitleSource {
    /// Label used in logs
    fn source_name(&self) -> &'static str;

    fn find(&self, title: &str) -> impl Future<Output = Result<PaperRecord>> + Send;
}

impl TitleSource for ArxivClient {
    fn source_name(&self) -> &'static str {
        "arXiv"
    }

    async fn find(&self, title: &str) -> Result<PaperRecord> {
        self.lookup_title(title).await
    }
}

impl TitleSource for ScholarClient {
    fn source_name(&self) -> &'static str {
        "Google Scholar"
    }

    async fn find(&self, title: &str) -> Result<PaperRecord> {
        self.lookup_title(title).await
    }
}

impl TitleSource for SemanticScholarClient {
    fn source_name(&self) -> &'static str {
        "Semantic Scholar"
    }

    async fn find(&self, title: &str) -> Result<PaperRecord> {
        self.lookup_title(title).await
    }
}

/// Try `primary`, then `secondary` when the first lookup fails.
pub struct Fallback<A, B> {
    pub primary: A,
    pub secondary: B,
}

impl<A, B> TitleSource for Fallback<A, B>
where
    A: TitleSource + Sync,
    B: TitleSource + Sync,
{
    fn source_name(&self) -> &'static str {
        self.primary.source_name()
    }

    async fn find(&self, title: &str) -> Result<PaperRecord> {
        match self.primary.find(title).await {
            Ok(record) => Ok(record),
            Err(e) => {
                warn!(
                    source = self.primary.source_name(),
                    fallback = self.secondary.source_name(),
                    error = %e,
                    "Lookup failed, trying fallback"
                );
                self.secondary.find(title).await
            }
        }
    }
}

/// Keyword search over a paper index.
pub trait KeywordSearch {
    fn search(&self, query: &str, max_results: usize) -> impl Future<Output = Result<Vec<PaperRecord>>> + Send;
}

impl KeywordSearch for ArxivClient {
    async fn search(&self, query: &str, max_results: usize) -> Result<Vec<PaperRecord>> {
        ArxivClient::search(self, query, max_results).await
    }
}

/// Titles split by whether a source could resolve them.
#[derive(Debug, Default)]
pub struct Resolution {
    pub found: Vec<PaperRecord>,
    pub not_found: Vec<String>,
}

impl Resolution {
    /// Found records per `source` value, most common first.
    pub fn source_counts(&self) -> Vec<(String, usize)> {
        let mut counts: Vec<(String, usize)> = Vec::new();
        for record in &self.found {
            let source = record.source.clone().unwrap_or_else(|| "unknown".to_string());
            match counts.iter_mut().find(|(s, _)| *s == source) {
                Some((_, n)) => *n += 1,
                None => counts.push((source, 1)),
            }
        }
        counts.sort_by(|a, b| b.1.cmp(&a.1));
        counts
    }
}

/// Look every title up once, pacing after each.
pub async fn resolve_titles<S: TitleSource, L: RateLimiter>(
    source: &S,
    titles: &[String],
    limiter: &L,
    progress: &Progress,
) -> Resolution {
    let mut resolution = Resolution::default();

    for (idx, title) in titles.iter().enumerate() {
        let short: String = title.chars().take(70).collect();
        match source.find(title).await {
            Ok(record) => {
                info!(
                    idx = idx + 1,
                    total = titles.len(),
                    title = %short,
                    source = record.source.as_deref().unwrap_or(""),
                    "Resolved"
                );
                resolution.found.push(record);
            }
            Err(e) => {
                if matches!(e, TrackerError::Captcha) {
                    warn!("Google Scholar is serving a CAPTCHA; refresh cookies to use the fallback");
                }
                warn!(idx = idx + 1, total = titles.len(), title = %short, error = %e, "Not found");
                resolution.not_found.push(title.clone());
            }
        }
        progress.inc(1);
        limiter.pace().await;
    }

    resolution
}

/// Pick the title column: the first header containing "title" (any case),
/// else the first column.
pub fn title_column(header: &[String]) -> usize {
    header
        .iter()
        .position(|h| h.to_lowercase().contains("title"))
        .unwrap_or(0)
}

/// Non-blank titles from a header row plus data rows.
pub fn titles_from_rows(rows: &[Vec<String>]) -> Vec<String> {
    let Some((header, data)) = rows.split_first() else {
        return Vec::new();
    };
    let col = title_column(header);
    if col == 0 && !header.iter().any(|h| h.to_lowercase().contains("title")) {
        info!(column = header.first().map(String::as_str).unwrap_or(""), "Using first column as titles");
    }
    data.iter()
        .filter_map(|row| row.get(col))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .collect()
}

/// Read seed titles from the first sheet of a workbook.
pub fn read_workbook_titles(path: &Path) -> Result<Vec<String>> {
    if !path.exists() {
        return Err(TrackerError::MissingInputFile(path.to_path_buf()));
    }

    let mut workbook = open_workbook_auto(path).map_err(|e| TrackerError::Excel(e.to_string()))?;
    let range = workbook
        .worksheet_range_at(0)
        .ok_or_else(|| TrackerError::Excel(format!("{} has no worksheets", path.display())))?
        .map_err(|e| TrackerError::Excel(e.to_string()))?;

    let rows: Vec<Vec<String>> = range
        .rows()
        .map(|row| {
            row.iter()
                .map(|cell| match cell {
                    Data::Empty => String::new(),
                    other => other.to_string(),
                })
                .collect()
        })
        .collect();

    let titles = titles_from_rows(&rows);
    info!(path = %path.display(), count = titles.len(), "Read seed titles");
    Ok(titles)
}

/// Result of a keyword collection run.
#[derive(Debug)]
pub struct Collection {
    pub path: PathBuf,
    pub papers: Vec<PaperRecord>,
}

/// Run each keyword query, merge, dedup by url and write a timestamped file.
///
/// A failing query is logged and skipped.
pub async fn collect_keywords<K: KeywordSearch>(
    index: &K,
    queries: &[String],
    per_query: usize,
    layout: &DataLayout,
) -> Result<Collection> {
    let mut all = Vec::new();
    for query in queries {
        println!("Searching: {}", query);
        match index.search(query, per_query).await {
            Ok(papers) => {
                println!("  Found {} papers", papers.len());
                all.extend(papers);
            }
            Err(e) => warn!(query = %query, error = %e, "Search failed"),
        }
    }

    let papers = dedup_by_url(all);
    let timestamp = chrono::Local::now().format("%Y%m%d_%H%M%S").to_string();
    let path = layout.arxiv_collection(&timestamp);
    store::write_papers(&path, &papers)?;
    Ok(Collection { path, papers })
}

/// Resolve a seed workbook into the curated store.
///
/// Overwrites `curated_papers.csv` with what was found and
/// `papers_not_found.csv` with the rest.
pub async fn fetch_from_workbook<S: TitleSource, L: RateLimiter>(
    source: &S,
    workbook: &Path,
    layout: &DataLayout,
    limiter: &L,
    show_progress: bool,
) -> Result<Resolution> {
    let titles = read_workbook_titles(workbook)?;
    println!("Found {} paper titles", titles.len());

    let progress = if show_progress {
        Progress::bar(titles.len() as u64, "Fetching papers")
    } else {
        Progress::hidden()
    };
    let mut resolution = resolve_titles(source, &titles, limiter, &progress).await;
    progress.finish_clear();

    resolution.found = dedup_by_url(resolution.found);
    store::write_papers(&layout.curated(), &resolution.found)?;
    store::write_titles(&layout.not_found(), &resolution.not_found)?;
    Ok(resolution)
}

/// Outcome of a recovery pass.
#[derive(Debug)]
pub struct Recovery {
    pub resolution: Resolution,
    /// Rows in the curated store afterwards
    pub curated_total: usize,
}

/// Retry the not-found list, append hits to the curated store and rewrite the
/// list with whatever is still missing.
pub async fn recover_missing<S: TitleSource, L: RateLimiter>(
    source: &S,
    layout: &DataLayout,
    limiter: &L,
    show_progress: bool,
) -> Result<Recovery> {
    let titles = store::read_titles(&layout.not_found())?;
    println!("Searching {} for {} missing papers", source.source_name(), titles.len());

    let progress = if show_progress {
        Progress::bar(titles.len() as u64, "Searching")
    } else {
        Progress::hidden()
    };
    let resolution = resolve_titles(source, &titles, limiter, &progress).await;
    progress.finish_clear();

    let curated_total = if resolution.found.is_empty() {
        match store::read_rows(&layout.curated()) {
            Ok(rows) => rows.len(),
            Err(TrackerError::MissingInputFile(_)) => 0,
            Err(e) => return Err(e),
        }
    } else {
        store::append_papers(&layout.curated(), &resolution.found)?
    };
    store::write_titles(&layout.not_found(), &resolution.not_found)?;

    Ok(Recovery {
        resolution,
        curated_total,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use tempfile::tempdir;

    /// Resolves only the titles it knows.
    struct Known {
        name: &'static str,
        papers: HashMap<String, PaperRecord>,
        calls: AtomicUsize,
    }

    impl Known {
        fn new(name: &'static str, titles: &[&str]) -> Self {
            let papers = titles
                .iter()
                .map(|t| {
                    let mut p = PaperRecord::new(*t);
                    p.url = Some(format!("http://{name}/{}", t.replace(' ', "_")));
                    p.source = Some(name.to_string());
                    (t.to_string(), p)
                })
                .collect();
            Self {
                name,
                papers,
                calls: AtomicUsize::new(0),
            }
        }
    }

    impl TitleSource for Known {
        fn source_name(&self) -> &'static str {
            self.name
        }

        async fn find(&self, title: &str) -> Result<PaperRecord> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            self.papers
                .get(title)
                .cloned()
                .ok_or_else(|| TrackerError::NotFound(title.to_string()))
        }
    }

    impl KeywordSearch for Known {
        async fn search(&self, query: &str, _max_results: usize) -> Result<Vec<PaperRecord>> {
            if query == "broken" {
                return Err(TrackerError::Api { code: 503, message: "down".into() });
            }
            Ok(self.papers.values().cloned().collect())
        }
    }

    #[derive(Default)]
    struct CountingLimiter(AtomicUsize);

    impl RateLimiter for CountingLimiter {
        async fn pace(&self) {
            self.0.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn titles(t: &[&str]) -> Vec<String> {
        t.iter().map(|s| s.to_string()).collect()
    }

    #[tokio::test]
    async fn test_fallback_chain() {
        let chain = Fallback {
            primary: Known::new("arxiv", &["A"]),
            secondary: Known::new("google_scholar", &["B"]),
        };
        let limiter = CountingLimiter::default();
        let res = resolve_titles(&chain, &titles(&["A", "B", "C"]), &limiter, &Progress::hidden()).await;

        let sources: Vec<_> = res.found.iter().filter_map(|p| p.source.as_deref()).collect();
        assert_eq!(sources, vec!["arxiv", "google_scholar"]);
        assert_eq!(res.not_found, vec!["C"]);
        // secondary only consulted after a primary miss
        assert_eq!(chain.secondary.calls.load(Ordering::SeqCst), 2);
        assert_eq!(limiter.0.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_source_counts() {
        let mut res = Resolution::default();
        for s in ["arxiv", "google_scholar", "arxiv"] {
            let mut p = PaperRecord::new("t");
            p.source = Some(s.to_string());
            res.found.push(p);
        }
        assert_eq!(
            res.source_counts(),
            vec![("arxiv".to_string(), 2), ("google_scholar".to_string(), 1)]
        );
    }

    #[test]
    fn test_titles_from_rows() {
        let rows = vec![
            titles(&["#", "Paper Title", "Notes"]),
            titles(&["1", "First paper", ""]),
            titles(&["2", "  ", "blank title"]),
            titles(&["3", "Second paper"]),
        ];
        assert_eq!(titles_from_rows(&rows), vec!["First paper", "Second paper"]);

        let no_title_header = vec![titles(&["Papers"]), titles(&["Only one"])];
        assert_eq!(titles_from_rows(&no_title_header), vec!["Only one"]);
        assert!(titles_from_rows(&[]).is_empty());
    }

    #[test]
    fn test_missing_workbook() {
        let err = read_workbook_titles(Path::new("/nonexistent/titles.xlsx")).unwrap_err();
        assert!(matches!(err, TrackerError::MissingInputFile(_)));
    }

    #[tokio::test]
    async fn test_collect_skips_failed_queries_and_dedups() -> Result<()> {
        let dir = tempdir()?;
        let layout = DataLayout::new(dir.path());
        let index = Known::new("arxiv", &["A", "B"]);

        let queries = titles(&["first", "broken", "second"]);
        let collection = collect_keywords(&index, &queries, 15, &layout).await?;

        // both good queries return A and B
        assert_eq!(collection.papers.len(), 2);
        assert!(collection.path.starts_with(layout.raw_dir()));
        assert_eq!(store::read_papers(&collection.path)?.len(), 2);
        Ok(())
    }

    #[tokio::test]
    async fn test_recover_missing_appends_and_rewrites() -> Result<()> {
        let dir = tempdir()?;
        let layout = DataLayout::new(dir.path());
        store::write_papers(&layout.curated(), &[PaperRecord::new("Existing")])?;
        store::write_titles(&layout.not_found(), &titles(&["Lost", "Gone"]))?;

        let source = Known::new("semantic_scholar", &["Lost"]);
        let limiter = CountingLimiter::default();
        let recovery = recover_missing(&source, &layout, &limiter, false).await?;

        assert_eq!(recovery.curated_total, 2);
        assert_eq!(store::read_titles(&layout.not_found())?, vec!["Gone"]);
        let curated = store::read_papers(&layout.curated())?;
        assert_eq!(curated[1].source.as_deref(), Some("semantic_scholar"));
        Ok(())
    }

    #[tokio::test]
    async fn test_recover_missing_requires_list() {
        let dir = tempdir().unwrap();
        let layout = DataLayout::new(dir.path());
        let source = Known::new("semantic_scholar", &[]);
        let err = recover_missing(&source, &layout, &CountingLimiter::default(), false)
            .await
            .unwrap_err();
        assert!(matches!(err, TrackerError::MissingInputFile(_)));
    }
}
