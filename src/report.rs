//! Aggregate statistics over scored papers.
//!
//! Shared by the end-of-run scoring summary, the `inspect` command and the
//! dashboard's summary endpoint.

use crate::record::ScoredRecord;
use serde::Serialize;
use std::fmt;

/// Cost estimate in USD for `tokens` at a fixed per-million price.
pub fn estimate_cost(tokens: u64, price_per_million: f64) -> f64 {
    tokens as f64 / 1_000_000.0 * price_per_million
}

/// Mean of each numeric score field.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Averages {
    pub relevance: f64,
    pub maturity: f64,
    pub credibility: f64,
    pub integration: f64,
}

impl Averages {
    /// `None` when there is nothing to average.
    pub fn of(records: &[ScoredRecord]) -> Option<Self> {
        if records.is_empty() {
            return None;
        }
        let n = records.len() as f64;
        let mean = |f: fn(&ScoredRecord) -> u8| records.iter().map(|r| f64::from(f(r))).sum::<f64>() / n;
        Some(Self {
            relevance: mean(|r| r.scores.relevance_score),
            maturity: mean(|r| r.scores.maturity_level),
            credibility: mean(|r| r.scores.credibility_score),
            integration: mean(|r| r.scores.integration_score),
        })
    }
}

/// One line of a top-N listing.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RankedPaper {
    pub title: String,
    pub relevance_score: u8,
    pub maturity_level: u8,
}

/// The `n` most relevant records. Ties keep their input order.
pub fn top_by_relevance(records: &[ScoredRecord], n: usize) -> Vec<RankedPaper> {
    let mut ranked: Vec<&ScoredRecord> = records.iter().collect();
    ranked.sort_by(|a, b| b.scores.relevance_score.cmp(&a.scores.relevance_score));
    ranked
        .into_iter()
        .take(n)
        .map(|r| RankedPaper {
            title: r.title().to_string(),
            relevance_score: r.scores.relevance_score,
            maturity_level: r.scores.maturity_level,
        })
        .collect()
}

/// Number of records flagged with a Chinese defense connection.
pub fn defense_count(records: &[ScoredRecord]) -> usize {
    records.iter().filter(|r| r.scores.chinese_defense).count()
}

/// Share of `count` in `total` as a percentage; 0 for an empty total.
pub fn percent(count: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        count as f64 / total as f64 * 100.0
    }
}

/// Counts of relevance scores 0..=10.
pub fn relevance_histogram(records: &[ScoredRecord]) -> [usize; 11] {
    let mut bins = [0usize; 11];
    for r in records {
        if let Some(bin) = bins.get_mut(usize::from(r.scores.relevance_score)) {
            *bin += 1;
        }
    }
    bins
}

/// Counts of maturity levels 1..=5 (index 0 is level 1).
pub fn maturity_counts(records: &[ScoredRecord]) -> [usize; 5] {
    let mut bins = [0usize; 5];
    for r in records {
        if let Some(bin) = usize::from(r.scores.maturity_level)
            .checked_sub(1)
            .and_then(|i| bins.get_mut(i))
        {
            *bin += 1;
        }
    }
    bins
}

/// End-of-run summary of a scoring pass.
#[derive(Debug, Clone, Serialize)]
pub struct ScoringReport {
    pub attempted: usize,
    pub scored: usize,
    pub parse_failures: usize,
    pub api_failures: usize,
    pub total_tokens: u64,
    pub estimated_cost: f64,
    pub averages: Option<Averages>,
    pub defense_count: usize,
    pub top: Vec<RankedPaper>,
}

impl ScoringReport {
    pub fn new(
        attempted: usize,
        scored: &[ScoredRecord],
        parse_failures: usize,
        api_failures: usize,
        price_per_million: f64,
        top_n: usize,
    ) -> Self {
        let total_tokens = scored.iter().map(|r| r.tokens_used).sum();
        Self {
            attempted,
            scored: scored.len(),
            parse_failures,
            api_failures,
            total_tokens,
            estimated_cost: estimate_cost(total_tokens, price_per_million),
            averages: Averages::of(scored),
            defense_count: defense_count(scored),
            top: top_by_relevance(scored, top_n),
        }
    }

    pub fn defense_share(&self) -> f64 {
        percent(self.defense_count, self.scored)
    }
}

impl fmt::Display for ScoringReport {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(f, "Scored: {}/{} papers", self.scored, self.attempted)?;
        writeln!(
            f,
            "Failures: {} parse, {} api",
            self.parse_failures, self.api_failures
        )?;
        writeln!(f, "Total tokens: {}", self.total_tokens)?;
        writeln!(f, "Estimated cost: ${:.4}", self.estimated_cost)?;

        let Some(avg) = &self.averages else {
            return Ok(());
        };
        writeln!(f, "\nAverage scores:")?;
        writeln!(f, "  Relevance:   {:.1}/10", avg.relevance)?;
        writeln!(f, "  Maturity:    {:.1}/5", avg.maturity)?;
        writeln!(f, "  Credibility: {:.1}/10", avg.credibility)?;
        writeln!(f, "  Integration: {:.1}/10", avg.integration)?;
        writeln!(
            f,
            "\nChinese defense connection: {} ({:.1}%)",
            self.defense_count,
            self.defense_share()
        )?;

        writeln!(f, "\nTop {} by relevance:", self.top.len())?;
        for (i, p) in self.top.iter().enumerate() {
            let title: String = p.title.chars().take(80).collect();
            writeln!(
                f,
                "  {}. [{}/10, TRL {}] {}",
                i + 1,
                p.relevance_score,
                p.maturity_level,
                title
            )?;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::PaperRecord;
    use serde_json::json;

    fn scored(title: &str, relevance: u8, maturity: u8, defense: bool, tokens: u64) -> ScoredRecord {
        let obj = json!({
            "relevance_score": relevance,
            "maturity_level": maturity,
            "credibility_score": 6,
            "integration_score": 2,
            "chinese_defense": defense,
            "institution_type": "university"
        });
        let obj = obj.as_object().cloned().unwrap_or_default();
        ScoredRecord::merge(&PaperRecord::new(title), &obj, tokens).unwrap()
    }

    #[test]
    fn test_cost_is_linear_in_tokens() {
        assert_eq!(estimate_cost(0, 3.0), 0.0);
        assert!((estimate_cost(1_000_000, 3.0) - 3.0).abs() < 1e-12);
        assert!((estimate_cost(250_000, 3.0) - 0.75).abs() < 1e-12);
    }

    #[test]
    fn test_top_n_keeps_input_order_on_ties() {
        let records = vec![
            scored("a", 7, 1, false, 1),
            scored("b", 9, 1, false, 1),
            scored("c", 7, 1, false, 1),
            scored("d", 9, 1, false, 1),
        ];
        let titles: Vec<_> = top_by_relevance(&records, 3)
            .into_iter()
            .map(|p| p.title)
            .collect();
        assert_eq!(titles, vec!["b", "d", "a"]);
    }

    #[test]
    fn test_report_aggregates() {
        let records = vec![
            scored("a", 8, 2, true, 1000),
            scored("b", 4, 4, false, 500),
        ];
        let report = ScoringReport::new(3, &records, 1, 0, 3.0, 5);
        assert_eq!(report.scored, 2);
        assert_eq!(report.total_tokens, 1500);
        assert!((report.estimated_cost - 0.0045).abs() < 1e-12);
        let avg = report.averages.unwrap();
        assert_eq!(avg.relevance, 6.0);
        assert_eq!(avg.maturity, 3.0);
        assert_eq!(report.defense_count, 1);
        assert_eq!(report.defense_share(), 50.0);

        let text = report.to_string();
        assert!(text.contains("Scored: 2/3 papers"));
        assert!(text.contains("Failures: 1 parse, 0 api"));
    }

    #[test]
    fn test_empty_report() {
        let report = ScoringReport::new(0, &[], 0, 0, 3.0, 5);
        assert!(report.averages.is_none());
        assert!(report.top.is_empty());
        assert!(report.to_string().contains("Scored: 0/0 papers"));
    }

    #[test]
    fn test_histograms() {
        let records = vec![
            scored("a", 10, 5, false, 1),
            scored("b", 0, 1, false, 1),
            scored("c", 10, 1, false, 1),
        ];
        let rel = relevance_histogram(&records);
        assert_eq!(rel[10], 2);
        assert_eq!(rel[0], 1);
        assert_eq!(maturity_counts(&records), [2, 0, 0, 0, 1]);
    }
}
