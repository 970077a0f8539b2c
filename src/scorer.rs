//! LLM scoring of paper abstracts.
//!
//! Papers are scored one at a time: render the rubric prompt, call the
//! completion client, pull a JSON object out of the reply and merge it into the
//! paper's row. A failed record is logged and dropped; the run always continues
//! and the limiter is paced after every record whatever the outcome.

use crate::config::ScoringConfig;
use crate::error::{OptionExt, Result, TrackerError};
use crate::llm::CompletionClient;
use crate::progress::Progress;
use crate::prompts::build_scoring_prompt;
use crate::rate_limit::RateLimiter;
use crate::record::{PaperRecord, ScoredRecord};
use crate::report::ScoringReport;
use crate::store;
use serde_json::Value;
use std::path::Path;
use thiserror::Error;
use tracing::{debug, info, warn};

const FENCE: &str = "```";

/// Pull the JSON payload out of a model reply and parse it.
///
/// When the reply contains a fenced code block its body is used, with any
/// language tag on the opening fence dropped; otherwise the whole reply is
/// parsed. Surrounding whitespace is ignored.
pub fn extract_json(raw: &str) -> Result<Value> {
    let body = fenced_body(raw).unwrap_or(raw).trim();
    serde_json::from_str(body).map_err(|e| TrackerError::Parse(format!("invalid JSON in reply: {}", e)))
}

fn fenced_body(raw: &str) -> Option<&str> {
    let start = raw.find(FENCE)? + FENCE.len();
    let after = raw[start..].trim_start_matches([' ', '\t']);
    let tag_len = after
        .find(|c: char| !(c.is_ascii_alphanumeric() || matches!(c, '_' | '+' | '-')))
        .unwrap_or(after.len());
    let body = &after[tag_len..];
    Some(match body.find(FENCE) {
        Some(end) => &body[..end],
        None => body,
    })
}

/// Why a single record produced no score.
#[derive(Debug, Error)]
pub enum ScoreFailure {
    /// The reply was not a valid score object
    #[error("{error}")]
    Parse { error: TrackerError, snippet: String },

    /// The completion call itself failed
    #[error("{0}")]
    Api(TrackerError),
}

/// Outcome of scoring a batch of papers.
#[derive(Debug, Default)]
pub struct ScoringRun {
    pub attempted: usize,
    pub scored: Vec<ScoredRecord>,
    pub parse_failures: usize,
    pub api_failures: usize,
}

impl ScoringRun {
    pub fn failed(&self) -> usize {
        self.parse_failures + self.api_failures
    }

    pub fn total_tokens(&self) -> u64 {
        self.scored.iter().map(|r| r.tokens_used).sum()
    }

    pub fn report(&self, config: &ScoringConfig) -> ScoringReport {
        ScoringReport::new(
            self.attempted,
            &self.scored,
            self.parse_failures,
            self.api_failures,
            config.price_per_million,
            config.top_n,
        )
    }
}

/// Scores papers against a completion client, paced by a rate limiter.
pub struct ScoringEngine<C, L> {
    client: C,
    limiter: L,
    config: ScoringConfig,
}

impl<C: CompletionClient, L: RateLimiter> ScoringEngine<C, L> {
    pub fn new(client: C, limiter: L, config: ScoringConfig) -> Self {
        Self {
            client,
            limiter,
            config,
        }
    }

    pub fn config(&self) -> &ScoringConfig {
        &self.config
    }

    /// Score one paper. Does not pace.
    pub async fn score_paper(&self, paper: &PaperRecord) -> std::result::Result<ScoredRecord, ScoreFailure> {
        let prompt = build_scoring_prompt(&self.config.prompt_template, paper);
        let completion = self
            .client
            .complete(&prompt, self.config.max_tokens)
            .await
            .map_err(ScoreFailure::Api)?;

        let parse_failure = |error: TrackerError| ScoreFailure::Parse {
            error,
            snippet: completion.text.chars().take(200).collect(),
        };

        let value = extract_json(&completion.text).map_err(parse_failure)?;
        let obj = value
            .as_object()
            .ok_or_parse("reply is not a JSON object")
            .map_err(parse_failure)?;
        let scored = ScoredRecord::merge(paper, obj, completion.total_tokens()).map_err(parse_failure)?;

        debug!(
            title = %paper.title_or_unknown(),
            relevance = scored.scores.relevance_score,
            tokens = scored.tokens_used,
            "Paper scored"
        );
        Ok(scored)
    }

    /// Score every paper in order, honouring `max_papers`.
    pub async fn score_all(&self, papers: &[PaperRecord], progress: &Progress) -> ScoringRun {
        let limit = self.config.max_papers.unwrap_or(papers.len()).min(papers.len());
        let papers = &papers[..limit];

        info!(count = papers.len(), "Starting scoring run");

        let mut run = ScoringRun {
            attempted: papers.len(),
            ..Default::default()
        };

        for paper in papers {
            let title: String = paper.title_or_unknown().chars().take(50).collect();
            match self.score_paper(paper).await {
                Ok(scored) => run.scored.push(scored),
                Err(ScoreFailure::Parse { error, snippet }) => {
                    run.parse_failures += 1;
                    warn!(title = %title, error = %error, response = %snippet, "Failed to parse score reply");
                }
                Err(ScoreFailure::Api(error)) => {
                    run.api_failures += 1;
                    warn!(title = %title, error = %error, "Scoring request failed");
                }
            }
            progress.inc(1);
            self.limiter.pace().await;
        }

        info!(
            scored = run.scored.len(),
            attempted = run.attempted,
            failed = run.failed(),
            tokens = run.total_tokens(),
            "Scoring run complete"
        );
        run
    }
}

/// Score the papers in `input` and overwrite `output` with the results.
///
/// The output file is written once, after every record has been attempted.
pub async fn score_corpus<C: CompletionClient, L: RateLimiter>(
    engine: &ScoringEngine<C, L>,
    input: &Path,
    output: &Path,
    show_progress: bool,
) -> Result<ScoringReport> {
    let papers = store::read_papers(input)?;

    let total = engine.config().max_papers.unwrap_or(papers.len()).min(papers.len());
    let progress = if show_progress {
        Progress::bar(total as u64, "Scoring papers")
    } else {
        Progress::hidden()
    };

    let run = engine.score_all(&papers, &progress).await;
    progress.finish_clear();

    store::write_scored(output, &run.scored)?;
    Ok(run.report(engine.config()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::Completion;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use tempfile::tempdir;

    const REPLY: &str = r#"{"relevance_score":9,"maturity_level":2,"credibility_score":6,"integration_score":3,"achievements":"Cooperative interception","limitations":"Simulation only","chinese_defense":false,"institution_type":"university","reasoning":"On topic."}"#;

    /// Replays canned replies in order.
    struct StubClient {
        replies: Mutex<VecDeque<Result<Completion>>>,
        prompts: Mutex<Vec<String>>,
    }

    impl StubClient {
        fn new(replies: Vec<Result<Completion>>) -> Self {
            Self {
                replies: Mutex::new(replies.into()),
                prompts: Mutex::new(Vec::new()),
            }
        }
    }

    impl CompletionClient for StubClient {
        async fn complete(&self, prompt: &str, _max_tokens: u32) -> Result<Completion> {
            self.prompts.lock().unwrap().push(prompt.to_string());
            self.replies
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or_else(|| Err(TrackerError::Api { code: 500, message: "no reply".into() }))
        }
    }

    #[derive(Default)]
    struct CountingLimiter {
        calls: AtomicUsize,
    }

    impl RateLimiter for &CountingLimiter {
        async fn pace(&self) {
            self.calls.fetch_add(1, Ordering::SeqCst);
        }
    }

    fn reply(text: &str, input_tokens: u64, output_tokens: u64) -> Result<Completion> {
        Ok(Completion {
            text: text.to_string(),
            input_tokens,
            output_tokens,
        })
    }

    fn paper(title: &str) -> PaperRecord {
        let mut p = PaperRecord::new(title);
        p.abstract_text = Some("We study cooperative guidance with multi-agent RL.".into());
        p
    }

    #[test]
    fn test_extract_json_shapes_agree() {
        let bare: Value = extract_json(REPLY).unwrap();
        let tagged = extract_json(&format!("```json\n{}\n```", REPLY)).unwrap();
        let untagged = extract_json(&format!("```\n{}\n```", REPLY)).unwrap();
        let padded = extract_json(&format!("\n\n  {}  \n", REPLY)).unwrap();
        assert_eq!(bare, tagged);
        assert_eq!(bare, untagged);
        assert_eq!(bare, padded);
        assert_eq!(bare["relevance_score"], 9);
    }

    #[test]
    fn test_extract_json_fence_after_prose() {
        let raw = format!("Here is my analysis:\n```JSON\n{}\n```\nHope this helps.", REPLY);
        assert_eq!(extract_json(&raw).unwrap()["maturity_level"], 2);

        let unterminated = format!("```json\n{}", REPLY);
        assert_eq!(extract_json(&unterminated).unwrap()["maturity_level"], 2);
    }

    #[test]
    fn test_extract_json_spaced_fence_tag() {
        let spaced = format!("``` json\n{}\n```", REPLY);
        assert_eq!(extract_json(&spaced).unwrap()["relevance_score"], 9);
        let tabbed = format!("```\tjson \n{}\n```", REPLY);
        assert_eq!(extract_json(&tabbed).unwrap()["relevance_score"], 9);
    }

    #[test]
    fn test_extract_json_rejects_prose() {
        let err = extract_json("Sure! The relevance is 9 out of 10.").unwrap_err();
        assert!(err.is_parse());
        // no brace scanning beyond fence stripping
        assert!(extract_json(&format!("Result: {}", REPLY)).is_err());
    }

    #[tokio::test]
    async fn test_multi_uav_example() {
        let client = StubClient::new(vec![reply(REPLY, 812, 190)]);
        let limiter = CountingLimiter::default();
        let engine = ScoringEngine::new(client, &limiter, ScoringConfig::default());

        let scored = engine
            .score_paper(&paper("Multi-UAV Cooperative Guidance via MARL"))
            .await
            .unwrap();
        assert_eq!(scored.scores.relevance_score, 9);
        assert_eq!(scored.tokens_used, 812 + 190);
        assert_eq!(scored.get("tokens_used"), Some("1002"));

        let prompts = engine.client.prompts.lock().unwrap();
        assert!(prompts[0].contains("Title: Multi-UAV Cooperative Guidance via MARL"));
        assert!(prompts[0].contains("Authors: Unknown"));
    }

    #[tokio::test]
    async fn test_failures_are_dropped_and_counted() {
        let client = StubClient::new(vec![
            reply(REPLY, 100, 50),
            reply("I cannot score this paper.", 100, 10),
            Err(TrackerError::Api { code: 529, message: "overloaded".into() }),
            reply(&REPLY.replace("\"maturity_level\":2", "\"maturity_level\":7"), 100, 50),
            reply("[1, 2, 3]", 10, 5),
            reply(&format!("```json\n{}\n```", REPLY), 200, 60),
        ]);
        let limiter = CountingLimiter::default();
        let engine = ScoringEngine::new(client, &limiter, ScoringConfig::default());

        let papers: Vec<_> = (0..6).map(|i| paper(&format!("Paper {i}"))).collect();
        let run = engine.score_all(&papers, &Progress::hidden()).await;

        assert_eq!(run.attempted, 6);
        assert_eq!(run.parse_failures, 3);
        assert_eq!(run.api_failures, 1);
        assert_eq!(run.scored.len(), run.attempted - run.failed());
        assert_eq!(run.total_tokens(), 150 + 260);
        // paced after every record, failures included
        assert_eq!(limiter.calls.load(Ordering::SeqCst), 6);
    }

    #[tokio::test]
    async fn test_max_papers_truncates() {
        let client = StubClient::new(vec![reply(REPLY, 1, 1), reply(REPLY, 1, 1), reply(REPLY, 1, 1)]);
        let limiter = CountingLimiter::default();
        let config = ScoringConfig {
            max_papers: Some(2),
            ..Default::default()
        };
        let engine = ScoringEngine::new(client, &limiter, config);
        let papers: Vec<_> = (0..3).map(|i| paper(&format!("P{i}"))).collect();

        let run = engine.score_all(&papers, &Progress::hidden()).await;
        assert_eq!(run.attempted, 2);
        assert_eq!(limiter.calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_score_corpus_missing_input() {
        let dir = tempdir().unwrap();
        let limiter = CountingLimiter::default();
        let engine = ScoringEngine::new(StubClient::new(vec![]), &limiter, ScoringConfig::default());
        let err = score_corpus(
            &engine,
            &dir.path().join("missing.csv"),
            &dir.path().join("out.csv"),
            false,
        )
        .await
        .unwrap_err();
        assert!(matches!(err, TrackerError::MissingInputFile(_)));
        assert!(!dir.path().join("out.csv").exists());
    }

    #[tokio::test]
    async fn test_score_corpus_empty_input() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("curated.csv");
        let output = dir.path().join("processed").join("scored.csv");
        store::write_papers(&input, &[]).unwrap();

        let limiter = CountingLimiter::default();
        let engine = ScoringEngine::new(StubClient::new(vec![]), &limiter, ScoringConfig::default());
        let report = score_corpus(&engine, &input, &output, false).await.unwrap();

        assert_eq!(report.scored, 0);
        assert_eq!(report.attempted, 0);
        assert!(report.to_string().contains("0/0"));
        assert!(store::read_scored(&output).unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_score_corpus_writes_survivors() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("curated.csv");
        let output = dir.path().join("scored.csv");
        let mut first = paper("Kept");
        first.source = Some("arxiv".into());
        store::write_papers(&input, &[first, paper("Dropped")]).unwrap();

        let limiter = CountingLimiter::default();
        let client = StubClient::new(vec![reply(REPLY, 10, 5), reply("not json", 10, 5)]);
        let engine = ScoringEngine::new(client, &limiter, ScoringConfig::default());
        let report = score_corpus(&engine, &input, &output, false).await.unwrap();

        assert_eq!(report.scored, 1);
        assert_eq!(report.parse_failures, 1);
        let back = store::read_scored(&output).unwrap();
        assert_eq!(back.len(), 1);
        assert_eq!(back[0].title(), "Kept");
        assert_eq!(back[0].get("source"), Some("arxiv"));
        assert_eq!(back[0].tokens_used, 15);
    }
}
