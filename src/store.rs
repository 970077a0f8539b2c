//! CSV corpus stores.
//!
//! Rows are read and written as ordered `(column, value)` pairs. When rows carry
//! different column sets the header is the union of all columns in first-seen
//! order, and missing cells are written empty.

use crate::error::{Result, TrackerError};
use crate::record::{PaperRecord, ScoredRecord, PAPER_COLUMNS, SCORE_COLUMNS, TOKENS_COLUMN};
use std::path::Path;
use tracing::{info, warn};

type Row = Vec<(String, String)>;

/// Read every row of a CSV file with headers.
pub fn read_rows(path: &Path) -> Result<Vec<Row>> {
    if !path.exists() {
        return Err(TrackerError::MissingInputFile(path.to_path_buf()));
    }

    let mut rdr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_path(path)?;

    let headers: Vec<String> = rdr.headers()?.iter().map(|h| h.trim().to_string()).collect();

    let mut rows = Vec::new();
    for record in rdr.records() {
        let record = record?;
        let row = headers
            .iter()
            .enumerate()
            .map(|(i, h)| (h.clone(), record.get(i).unwrap_or("").to_string()))
            .collect();
        rows.push(row);
    }
    Ok(rows)
}

/// Write rows, replacing any existing file. Parent directories are created.
///
/// `base_header` is used as the header when `rows` is empty.
pub fn write_rows(path: &Path, rows: &[Row], base_header: &[&str]) -> Result<()> {
    if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
        std::fs::create_dir_all(parent)?;
    }

    let file = std::fs::File::create(path)?;
    write_csv(file, rows, base_header)
}

/// Write rows as CSV to any writer, header first.
pub fn write_csv<W: std::io::Write>(writer: W, rows: &[Row], base_header: &[&str]) -> Result<()> {
    let header = union_header(rows, base_header);

    let mut wtr = csv::WriterBuilder::new().has_headers(false).from_writer(writer);
    wtr.write_record(&header)?;
    for row in rows {
        let cells = header.iter().map(|col| {
            row.iter()
                .find(|(c, _)| c == col)
                .map(|(_, v)| v.as_str())
                .unwrap_or("")
        });
        wtr.write_record(cells)?;
    }
    wtr.flush()?;
    Ok(())
}

fn union_header(rows: &[Row], base_header: &[&str]) -> Vec<String> {
    if rows.is_empty() {
        return base_header.iter().map(|s| s.to_string()).collect();
    }
    let mut header: Vec<String> = Vec::new();
    for (col, _) in rows.iter().flatten() {
        if !header.contains(col) {
            header.push(col.clone());
        }
    }
    header
}

/// Load paper records from a curated or collected CSV.
pub fn read_papers(path: &Path) -> Result<Vec<PaperRecord>> {
    let rows = read_rows(path)?;
    let papers: Vec<PaperRecord> = rows
        .iter()
        .map(|row| PaperRecord::from_row(row.iter().map(|(c, v)| (c.as_str(), v.as_str()))))
        .collect();
    info!(path = %path.display(), count = papers.len(), "Loaded papers");
    Ok(papers)
}

/// Write paper records, replacing the file.
pub fn write_papers(path: &Path, papers: &[PaperRecord]) -> Result<()> {
    let rows: Vec<Row> = papers.iter().map(PaperRecord::to_row).collect();
    write_rows(path, &rows, PAPER_COLUMNS)?;
    info!(path = %path.display(), count = papers.len(), "Saved papers");
    Ok(())
}

/// Append paper records to an existing store (or create it). Returns the new
/// total row count.
pub fn append_papers(path: &Path, papers: &[PaperRecord]) -> Result<usize> {
    let mut rows = match read_rows(path) {
        Ok(rows) => rows,
        Err(TrackerError::MissingInputFile(_)) => Vec::new(),
        Err(e) => return Err(e),
    };
    rows.extend(papers.iter().map(PaperRecord::to_row));
    write_rows(path, &rows, PAPER_COLUMNS)?;
    info!(path = %path.display(), added = papers.len(), total = rows.len(), "Appended papers");
    Ok(rows.len())
}

fn scored_header() -> Vec<&'static str> {
    PAPER_COLUMNS
        .iter()
        .chain(SCORE_COLUMNS)
        .chain(std::iter::once(&TOKENS_COLUMN))
        .copied()
        .collect()
}

/// Write the scored corpus, replacing the file.
pub fn write_scored(path: &Path, scored: &[ScoredRecord]) -> Result<()> {
    let rows: Vec<Row> = scored.iter().map(|s| s.row.clone()).collect();
    write_rows(path, &rows, &scored_header())?;
    info!(path = %path.display(), count = scored.len(), "Saved scored papers");
    Ok(())
}

/// Scored records rendered as CSV bytes.
pub fn scored_to_csv(scored: &[ScoredRecord]) -> Result<Vec<u8>> {
    let rows: Vec<Row> = scored.iter().map(|s| s.row.clone()).collect();
    let mut buf = Vec::new();
    write_csv(&mut buf, &rows, &scored_header())?;
    Ok(buf)
}

/// Load the scored corpus. Rows whose scores fail validation are skipped.
pub fn read_scored(path: &Path) -> Result<Vec<ScoredRecord>> {
    let rows = read_rows(path)?;
    let mut scored = Vec::with_capacity(rows.len());
    for (idx, row) in rows.into_iter().enumerate() {
        match ScoredRecord::from_row(row) {
            Ok(record) => scored.push(record),
            Err(e) => warn!(row = idx + 1, error = %e, "Skipping invalid scored row"),
        }
    }
    Ok(scored)
}

/// Read the `title` column of a single-column title list.
pub fn read_titles(path: &Path) -> Result<Vec<String>> {
    let rows = read_rows(path)?;
    Ok(rows
        .into_iter()
        .filter_map(|row| row.into_iter().find(|(c, _)| c == "title").map(|(_, v)| v))
        .filter(|t| !t.trim().is_empty())
        .collect())
}

/// Write a single-column title list.
pub fn write_titles(path: &Path, titles: &[String]) -> Result<()> {
    let rows: Vec<Row> = titles
        .iter()
        .map(|t| vec![("title".to_string(), t.clone())])
        .collect();
    write_rows(path, &rows, &["title"])
}
