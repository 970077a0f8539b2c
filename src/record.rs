//! Paper and scored-paper records.
//!
//! A [`PaperRecord`] is one row of the curated corpus; a [`ScoredRecord`] is the
//! same row plus the evaluation fields parsed from the model's reply. Rows are
//! kept as ordered `(column, value)` pairs at the CSV boundary so that columns
//! this crate does not know about survive a round trip.

use crate::error::{Result, TrackerError};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::HashSet;
use std::fmt;

/// Columns owned by [`PaperRecord`], in output order.
pub const PAPER_COLUMNS: &[&str] = &[
    "title",
    "authors",
    "abstract",
    "published",
    "url",
    "categories",
    "source",
];

/// Score columns, in output order. `tokens_used` always comes last.
pub const SCORE_COLUMNS: &[&str] = &[
    "relevance_score",
    "maturity_level",
    "credibility_score",
    "integration_score",
    "achievements",
    "limitations",
    "chinese_defense",
    "institution_type",
    "reasoning",
];

pub const TOKENS_COLUMN: &str = "tokens_used";

/// Normalized metadata for one academic paper.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct PaperRecord {
    pub title: Option<String>,
    pub authors: Option<String>,
    pub abstract_text: Option<String>,
    pub published: Option<String>,
    pub url: Option<String>,
    /// arXiv categories or the publication venue
    pub categories: Option<String>,
    /// Which adapter found the paper
    pub source: Option<String>,
    /// Any other input columns, in input order
    pub extra: Vec<(String, String)>,
}

impl PaperRecord {
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: Some(title.into()),
            ..Default::default()
        }
    }

    /// Build a record from a header/value row. Empty cells are treated as absent.
    pub fn from_row<'a, I>(row: I) -> Self
    where
        I: IntoIterator<Item = (&'a str, &'a str)>,
    {
        let mut record = PaperRecord::default();
        for (column, value) in row {
            let present = (!value.trim().is_empty()).then(|| value.to_string());
            match column {
                "title" => record.title = present,
                "authors" => record.authors = present,
                "abstract" => record.abstract_text = present,
                "published" => record.published = present,
                "url" => record.url = present,
                "categories" => record.categories = present,
                "source" => record.source = present,
                other => record.extra.push((other.to_string(), value.to_string())),
            }
        }
        record
    }

    /// The record as ordered CSV cells: known columns first, then extras.
    pub fn to_row(&self) -> Vec<(String, String)> {
        let known = [
            &self.title,
            &self.authors,
            &self.abstract_text,
            &self.published,
            &self.url,
            &self.categories,
            &self.source,
        ];
        PAPER_COLUMNS
            .iter()
            .zip(known)
            .map(|(col, val)| (col.to_string(), val.clone().unwrap_or_default()))
            .chain(self.extra.iter().cloned())
            .collect()
    }

    pub fn title_or_unknown(&self) -> &str {
        self.title.as_deref().unwrap_or("Unknown")
    }

    /// Look up an extra column by name.
    pub fn extra(&self, column: &str) -> Option<&str> {
        self.extra
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
    }

    pub fn set_extra(&mut self, column: &str, value: impl Into<String>) {
        let value = value.into();
        match self.extra.iter_mut().find(|(c, _)| c == column) {
            Some(slot) => slot.1 = value,
            None => self.extra.push((column.to_string(), value)),
        }
    }
}

/// Drop records whose `url` was already seen. First occurrence wins; records
/// without a link (absent or a placeholder such as "No URL available") are
/// always kept.
pub fn dedup_by_url(records: Vec<PaperRecord>) -> Vec<PaperRecord> {
    let mut seen = HashSet::new();
    records
        .into_iter()
        .filter(|r| match r.url.as_deref().filter(|u| u.starts_with("http")) {
            Some(url) => seen.insert(url.to_string()),
            None => true,
        })
        .collect()
}

/// Kind of institution behind a paper, as judged by the model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum InstitutionType {
    University,
    DefenseContractor,
    ResearchInstitute,
    #[serde(other)]
    Other,
}

impl InstitutionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            InstitutionType::University => "university",
            InstitutionType::DefenseContractor => "defense_contractor",
            InstitutionType::ResearchInstitute => "research_institute",
            InstitutionType::Other => "other",
        }
    }

    pub fn parse_loose(s: &str) -> Self {
        match s.trim().to_lowercase().as_str() {
            "university" => InstitutionType::University,
            "defense_contractor" => InstitutionType::DefenseContractor,
            "research_institute" => InstitutionType::ResearchInstitute,
            _ => InstitutionType::Other,
        }
    }
}

impl fmt::Display for InstitutionType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Evaluation fields returned by the model, range-checked.
#[derive(Debug, Clone, PartialEq)]
pub struct Scores {
    pub relevance_score: u8,
    pub maturity_level: u8,
    pub credibility_score: u8,
    pub integration_score: u8,
    pub achievements: String,
    pub limitations: String,
    pub chinese_defense: bool,
    pub institution_type: InstitutionType,
    pub reasoning: String,
}

impl Scores {
    /// Validate a parsed score object.
    ///
    /// Scores must be integers (or integral floats) inside their closed range.
    /// Free-text fields default to empty and `institution_type` to `other`.
    pub fn from_json(obj: &Map<String, Value>) -> Result<Self> {
        Ok(Self {
            relevance_score: bounded_int(obj, "relevance_score", 0, 10)?,
            maturity_level: bounded_int(obj, "maturity_level", 1, 5)?,
            credibility_score: bounded_int(obj, "credibility_score", 0, 10)?,
            integration_score: bounded_int(obj, "integration_score", 0, 10)?,
            achievements: text_field(obj, "achievements"),
            limitations: text_field(obj, "limitations"),
            chinese_defense: bool_field(obj, "chinese_defense")?,
            institution_type: obj
                .get("institution_type")
                .and_then(Value::as_str)
                .map(InstitutionType::parse_loose)
                .unwrap_or(InstitutionType::Other),
            reasoning: text_field(obj, "reasoning"),
        })
    }

    /// Score columns in [`SCORE_COLUMNS`] order, rendered from the checked values.
    pub fn to_cells(&self) -> Vec<(&'static str, String)> {
        vec![
            ("relevance_score", self.relevance_score.to_string()),
            ("maturity_level", self.maturity_level.to_string()),
            ("credibility_score", self.credibility_score.to_string()),
            ("integration_score", self.integration_score.to_string()),
            ("achievements", self.achievements.clone()),
            ("limitations", self.limitations.clone()),
            ("chinese_defense", self.chinese_defense.to_string()),
            ("institution_type", self.institution_type.as_str().to_string()),
            ("reasoning", self.reasoning.clone()),
        ]
    }

    /// Validate scores read back from a scored CSV row.
    pub fn from_row(row: &[(String, String)]) -> Result<Self> {
        let get = |col: &str| {
            row.iter()
                .find(|(c, _)| c == col)
                .map(|(_, v)| v.as_str())
                .unwrap_or("")
        };
        let int = |col: &str, lo: u8, hi: u8| -> Result<u8> {
            let raw = get(col).trim();
            let value = raw
                .parse::<f64>()
                .map_err(|_| TrackerError::Validation(format!("{col}: not a number: {raw:?}")))?;
            check_bounds(col, value, lo, hi)
        };
        Ok(Self {
            relevance_score: int("relevance_score", 0, 10)?,
            maturity_level: int("maturity_level", 1, 5)?,
            credibility_score: int("credibility_score", 0, 10)?,
            integration_score: int("integration_score", 0, 10)?,
            achievements: get("achievements").to_string(),
            limitations: get("limitations").to_string(),
            chinese_defense: matches!(get("chinese_defense").trim(), "true" | "True" | "TRUE" | "1"),
            institution_type: InstitutionType::parse_loose(get("institution_type")),
            reasoning: get("reasoning").to_string(),
        })
    }
}

fn check_bounds(field: &str, value: f64, lo: u8, hi: u8) -> Result<u8> {
    if value.fract() != 0.0 {
        return Err(TrackerError::Validation(format!("{field}: {value} is not an integer")));
    }
    if value < f64::from(lo) || value > f64::from(hi) {
        return Err(TrackerError::Validation(format!(
            "{field}: {value} outside {lo}..={hi}"
        )));
    }
    Ok(value as u8)
}

fn bounded_int(obj: &Map<String, Value>, field: &str, lo: u8, hi: u8) -> Result<u8> {
    let value = obj
        .get(field)
        .and_then(Value::as_f64)
        .ok_or_else(|| TrackerError::Parse(format!("missing or non-numeric {field}")))?;
    check_bounds(field, value, lo, hi).map_err(|e| TrackerError::Parse(e.to_string()))
}

fn text_field(obj: &Map<String, Value>, field: &str) -> String {
    match obj.get(field) {
        Some(Value::String(s)) => s.clone(),
        Some(Value::Null) | None => String::new(),
        Some(other) => other.to_string(),
    }
}

fn bool_field(obj: &Map<String, Value>, field: &str) -> Result<bool> {
    match obj.get(field) {
        Some(Value::Bool(b)) => Ok(*b),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("true") => Ok(true),
        Some(Value::String(s)) if s.eq_ignore_ascii_case("false") => Ok(false),
        None | Some(Value::Null) => Ok(false),
        Some(other) => Err(TrackerError::Parse(format!("{field}: expected boolean, got {other}"))),
    }
}

/// Render a JSON value as a CSV cell.
fn cell(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

/// A paper record augmented with model-derived evaluation fields.
#[derive(Debug, Clone, PartialEq)]
pub struct ScoredRecord {
    /// The output row: input columns overlaid with every key of the score object
    pub row: Vec<(String, String)>,
    pub scores: Scores,
    pub tokens_used: u64,
}

impl ScoredRecord {
    /// Merge a validated score object into a paper record.
    ///
    /// The score columns are written from the checked [`Scores`], then every other
    /// key of `parsed` as returned. When a key already exists as an input column
    /// the new value replaces it in place, otherwise it is appended.
    /// `tokens_used` is appended (or overwritten) last.
    pub fn merge(paper: &PaperRecord, parsed: &Map<String, Value>, tokens_used: u64) -> Result<Self> {
        let scores = Scores::from_json(parsed)?;
        let mut row = paper.to_row();

        for (key, value) in scores.to_cells() {
            upsert(&mut row, key, value);
        }
        for (key, value) in parsed.iter().filter(|(k, _)| !SCORE_COLUMNS.contains(&k.as_str())) {
            upsert(&mut row, key, cell(value));
        }
        upsert(&mut row, TOKENS_COLUMN, tokens_used.to_string());

        Ok(Self {
            row,
            scores,
            tokens_used,
        })
    }

    /// Rebuild from a scored CSV row.
    pub fn from_row(row: Vec<(String, String)>) -> Result<Self> {
        let scores = Scores::from_row(&row)?;
        let tokens_used = row
            .iter()
            .find(|(c, _)| c == TOKENS_COLUMN)
            .and_then(|(_, v)| v.trim().parse().ok())
            .unwrap_or(0);
        Ok(Self {
            row,
            scores,
            tokens_used,
        })
    }

    pub fn get(&self, column: &str) -> Option<&str> {
        self.row
            .iter()
            .find(|(c, _)| c == column)
            .map(|(_, v)| v.as_str())
            .filter(|v| !v.is_empty())
    }

    pub fn title(&self) -> &str {
        self.get("title").unwrap_or("Unknown")
    }
}

fn upsert(row: &mut Vec<(String, String)>, key: &str, value: String) {
    match row.iter_mut().find(|(c, _)| c == key) {
        Some(slot) => slot.1 = value,
        None => row.push((key.to_string(), value)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn score_obj(v: Value) -> Map<String, Value> {
        match v {
            Value::Object(m) => m,
            _ => panic!("not an object"),
        }
    }

    fn valid() -> Map<String, Value> {
        score_obj(json!({
            "relevance_score": 9,
            "maturity_level": 2,
            "credibility_score": 5,
            "integration_score": 3,
            "achievements": "Coordinated interception in simulation",
            "limitations": "Simulation only",
            "chinese_defense": false,
            "institution_type": "university",
            "reasoning": "Directly on topic."
        }))
    }

    #[test]
    fn test_dedup_by_url_keeps_first() {
        let mut a = PaperRecord::new("A");
        a.url = Some("http://arxiv.org/abs/1".into());
        let mut b = PaperRecord::new("B");
        b.url = Some("http://arxiv.org/abs/1".into());
        let c = PaperRecord::new("C");
        let d = PaperRecord::new("D");
        let mut e = PaperRecord::new("E");
        e.url = Some("No URL available".into());
        let mut f = PaperRecord::new("F");
        f.url = Some("No URL available".into());

        let out = dedup_by_url(vec![a, b, c, d, e, f]);
        let titles: Vec<_> = out.iter().map(|r| r.title_or_unknown()).collect();
        assert_eq!(titles, vec!["A", "C", "D", "E", "F"]);
    }

    #[test]
    fn test_from_row_keeps_unknown_columns() {
        let rec = PaperRecord::from_row([
            ("search_title", "Foo"),
            ("title", "Foo bar"),
            ("abstract", ""),
            ("match_quality", "partial"),
        ]);
        assert_eq!(rec.title.as_deref(), Some("Foo bar"));
        assert_eq!(rec.abstract_text, None);
        assert_eq!(rec.extra("match_quality"), Some("partial"));
        let cols: Vec<_> = rec.to_row().into_iter().map(|(c, _)| c).collect();
        assert_eq!(&cols[..7], PAPER_COLUMNS);
        assert_eq!(&cols[7..], ["search_title", "match_quality"]);
    }

    #[test]
    fn test_scores_out_of_range_rejected() {
        let mut obj = valid();
        obj.insert("maturity_level".into(), json!(0));
        assert!(Scores::from_json(&obj).unwrap_err().is_parse());

        let mut obj = valid();
        obj.insert("relevance_score".into(), json!(11));
        assert!(Scores::from_json(&obj).is_err());

        let mut obj = valid();
        obj.insert("credibility_score".into(), json!(7.5));
        assert!(Scores::from_json(&obj).is_err());

        let mut obj = valid();
        obj.remove("integration_score");
        assert!(Scores::from_json(&obj).is_err());
    }

    #[test]
    fn test_unknown_institution_maps_to_other() {
        let mut obj = valid();
        obj.insert("institution_type".into(), json!("think_tank"));
        let scores = Scores::from_json(&obj).unwrap();
        assert_eq!(scores.institution_type, InstitutionType::Other);
    }

    #[test]
    fn test_merge_scores_win_collisions() {
        let mut paper = PaperRecord::new("Original title");
        paper.source = Some("arxiv".into());
        let mut obj = valid();
        obj.insert("source".into(), json!("model"));
        obj.insert("confidence".into(), json!(0.8));

        let scored = ScoredRecord::merge(&paper, &obj, 1234).unwrap();
        assert_eq!(scored.get("source"), Some("model"));
        assert_eq!(scored.get("title"), Some("Original title"));
        assert_eq!(scored.get("relevance_score"), Some("9"));
        assert_eq!(scored.get("chinese_defense"), Some("false"));
        assert_eq!(scored.get("confidence"), Some("0.8"));

        let cols: Vec<_> = scored.row.iter().map(|(c, _)| c.as_str()).collect();
        // collision replaced in place, not appended
        assert_eq!(cols.iter().filter(|c| **c == "source").count(), 1);
        assert_eq!(cols.last(), Some(&TOKENS_COLUMN));
        assert_eq!(scored.tokens_used, 1234);
    }

    #[test]
    fn test_merge_writes_checked_scores() {
        let obj = score_obj(json!({
            "relevance_score": 9.0,
            "maturity_level": 2,
            "credibility_score": 5,
            "integration_score": 3,
            "chinese_defense": "True",
            "institution_type": "Military Lab",
        }));

        let scored = ScoredRecord::merge(&PaperRecord::new("T"), &obj, 1).unwrap();
        assert_eq!(scored.scores.institution_type, InstitutionType::Other);
        assert_eq!(scored.get("institution_type"), Some("other"));
        assert_eq!(scored.get("relevance_score"), Some("9"));
        assert_eq!(scored.get("chinese_defense"), Some("true"));

        let cols: Vec<_> = scored.row.iter().map(|(c, _)| c.as_str()).collect();
        for col in SCORE_COLUMNS {
            assert!(cols.contains(col), "missing {col}");
        }
    }

    #[test]
    fn test_scored_row_round_trip() {
        let scored = ScoredRecord::merge(&PaperRecord::new("T"), &valid(), 10).unwrap();
        let back = ScoredRecord::from_row(scored.row.clone()).unwrap();
        assert_eq!(back.scores, scored.scores);
        assert_eq!(back.tokens_used, 10);
    }
}
