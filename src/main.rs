//! rustpapertrack - research-tracking pipeline
//!
//! Collect paper metadata, score abstracts with a language model, and browse
//! the scored corpus.
//!
//! ## Usage
//!
//! ```bash
//! rustpapertrack collect
//! rustpapertrack fetch-excel curated_paper_titles.xlsx
//! rustpapertrack fetch-missing
//! rustpapertrack score --max-papers 20
//! rustpapertrack serve --port 8501
//! ```

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use rustpapertrack::arxiv::{self, ArxivClient};
use rustpapertrack::config::{DataLayout, LlmConfig, Provider, ScoringConfig, DEFAULT_PACING};
use rustpapertrack::cookies::CookieManager;
use rustpapertrack::curation::{self, Fallback};
use rustpapertrack::dashboard::{self, DashboardState};
use rustpapertrack::gscholar::{ScholarClient, ScholarOptions};
use rustpapertrack::llm::{CompletionClient, LlmClient};
use rustpapertrack::rate_limit::FixedDelay;
use rustpapertrack::record::{PaperRecord, ScoredRecord};
use rustpapertrack::report::{self, estimate_cost, Averages};
use rustpapertrack::scorer::{score_corpus, ScoringEngine};
use rustpapertrack::semanticscholar::SemanticScholarClient;
use rustpapertrack::store;
use std::path::PathBuf;
use tracing::{info, Level};
use tracing_subscriber::{fmt, EnvFilter};

// ============================================================================
// CLI Definition
// ============================================================================

/// Research-tracking pipeline for DRL cooperative guidance papers
#[derive(Parser)]
#[command(name = "rustpapertrack")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    debug: bool,

    /// Hide progress bars
    #[arg(long, global = true)]
    no_progress: bool,

    /// Root of the data directory (raw/ and processed/ live under it)
    #[arg(long, global = true, default_value = "data", env = "PAPERTRACK_DATA_DIR")]
    data_dir: PathBuf,

    /// Completion API flavour
    #[arg(long, global = true, value_enum, default_value_t = Provider::Anthropic, env = "PAPERTRACK_PROVIDER")]
    provider: Provider,

    /// Model identifier
    #[arg(long, global = true, env = "PAPERTRACK_MODEL")]
    model: Option<String>,

    /// Completion API base URL
    #[arg(long, global = true, env = "PAPERTRACK_BASE_URL")]
    base_url: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Keyword search on arXiv into a timestamped raw file
    Collect {
        /// Search queries (defaults to the built-in topic queries)
        queries: Vec<String>,

        /// Results per query
        #[arg(long, default_value_t = arxiv::DEFAULT_RESULTS_PER_QUERY)]
        max_results: usize,
    },

    /// Resolve a workbook of paper titles into the curated store
    FetchExcel {
        /// Excel workbook with a title column
        #[arg(default_value = curation::DEFAULT_WORKBOOK)]
        workbook: PathBuf,

        /// Proxy URL for Google Scholar (e.g., http://127.0.0.1:7890)
        #[arg(long)]
        proxy: Option<String>,

        /// Google Scholar mirror site URL
        #[arg(long)]
        mirror: Option<String>,
    },

    /// Retry not-found titles against Semantic Scholar
    FetchMissing,

    /// Score papers with the language model
    Score {
        /// Input CSV (defaults to the curated store)
        input: Option<PathBuf>,

        /// Output CSV (defaults to the scored store)
        #[arg(short, long)]
        output: Option<PathBuf>,

        /// Score at most this many papers
        #[arg(long)]
        max_papers: Option<usize>,
    },

    /// Print the latest collection and the scored store
    Inspect,

    /// Run the dashboard server
    Serve {
        /// Port to listen on
        #[arg(short, long, default_value = "8501")]
        port: u16,

        /// Host to bind to
        #[arg(long, default_value = "127.0.0.1")]
        host: String,
    },

    /// Send a one-line test prompt to the completion API
    CheckApi,

    /// Manage stored Google Scholar cookies
    Cookies {
        #[command(subcommand)]
        action: CookieAction,
    },
}

#[derive(Subcommand)]
enum CookieAction {
    /// Clear stored cookies
    Clear,
    /// Show cookie file path
    Path,
    /// Import Google cookies from a browser-extension JSON export
    Import {
        /// Exported cookie file
        file: PathBuf,
    },
}

// ============================================================================
// Main Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.debug { Level::DEBUG } else { Level::INFO };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(log_level.to_string()));

    fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .init();

    let layout = DataLayout::new(&cli.data_dir);
    let show_progress = !cli.no_progress;

    match cli.command {
        Commands::Collect {
            ref queries,
            max_results,
        } => run_collect(queries, max_results, &layout).await,
        Commands::FetchExcel {
            ref workbook,
            ref proxy,
            ref mirror,
        } => {
            let options = ScholarOptions {
                proxy: proxy.clone(),
                base_url: mirror.clone(),
            };
            run_fetch_excel(workbook, options, &layout, show_progress).await
        }
        Commands::FetchMissing => run_fetch_missing(&layout, show_progress).await,
        Commands::Score {
            ref input,
            ref output,
            max_papers,
        } => {
            let config = llm_config(&cli)?;
            let input = input.clone().unwrap_or_else(|| layout.curated());
            let output = output.clone().unwrap_or_else(|| layout.scored());
            run_score(config, &input, &output, max_papers, show_progress).await
        }
        Commands::Inspect => run_inspect(&layout),
        Commands::Serve { port, ref host } => {
            dashboard::serve(host, port, DashboardState { scored_path: layout.scored() })
                .await
                .context("Dashboard server error")
        }
        Commands::CheckApi => run_check_api(llm_config(&cli)?).await,
        Commands::Cookies { ref action } => handle_cookies(action),
    }
}

/// Credential from the environment plus CLI overrides.
fn llm_config(cli: &Cli) -> Result<LlmConfig> {
    let mut config = LlmConfig::from_env(cli.provider)?;
    if let Some(model) = &cli.model {
        config = config.with_model(model);
    }
    if let Some(base_url) = &cli.base_url {
        config = config.with_base_url(base_url);
    }
    Ok(config)
}

fn banner(title: &str) {
    println!("{}", "=".repeat(70));
    println!("{}", title);
    println!("{}", "=".repeat(70));
}

fn truncate(s: &str, n: usize) -> String {
    let short: String = s.chars().take(n).collect();
    if short.len() < s.len() {
        format!("{}...", short)
    } else {
        short
    }
}

// ============================================================================
// Collection
// ============================================================================

async fn run_collect(queries: &[String], max_results: usize, layout: &DataLayout) -> Result<()> {
    banner("arXiv Paper Collector");

    let queries: Vec<String> = if queries.is_empty() {
        arxiv::DEFAULT_QUERIES.iter().map(|q| q.to_string()).collect()
    } else {
        queries.to_vec()
    };

    let client = ArxivClient::new()?;
    let collection = curation::collect_keywords(&client, &queries, max_results, layout).await?;

    println!("\nTotal unique papers: {}", collection.papers.len());
    println!("Saved to: {}", collection.path.display());

    println!("\nSample papers:");
    for (i, paper) in collection.papers.iter().take(5).enumerate() {
        println!("{}. {}", i + 1, paper.title_or_unknown());
    }
    Ok(())
}

async fn run_fetch_excel(
    workbook: &std::path::Path,
    options: ScholarOptions,
    layout: &DataLayout,
    show_progress: bool,
) -> Result<()> {
    banner("Fetching Papers from Excel List");
    println!("\nReading: {}", workbook.display());

    let chain = Fallback {
        primary: ArxivClient::new()?,
        secondary: ScholarClient::new(&options, CookieManager::default())?,
    };
    let limiter = FixedDelay::new(curation::EXCEL_PACING);
    let resolution = curation::fetch_from_workbook(&chain, workbook, layout, &limiter, show_progress).await?;

    let requested = resolution.found.len() + resolution.not_found.len();
    banner("RESULTS");
    println!(
        "\nFetched {}/{} papers, saved to: {}",
        resolution.found.len(),
        requested,
        layout.curated().display()
    );

    println!("\nSources:");
    for (source, count) in resolution.source_counts() {
        println!("  {:<20} {}", source, count);
    }

    println!("\nSample of fetched papers:");
    for (i, paper) in resolution.found.iter().take(5).enumerate() {
        println!("\n{}. {}", i + 1, paper.title_or_unknown());
        println!("   Authors: {}", truncate(paper.authors.as_deref().unwrap_or("Unknown"), 60));
        println!("   Published: {}", paper.published.as_deref().unwrap_or("Unknown"));
    }

    if !resolution.not_found.is_empty() {
        println!("\nCould not auto-fetch {} papers:", resolution.not_found.len());
        for title in resolution.not_found.iter().take(5) {
            println!("  - {}", title);
        }
        if resolution.not_found.len() > 5 {
            println!("  ... and {} more", resolution.not_found.len() - 5);
        }
        println!("\nFull list saved to: {}", layout.not_found().display());
        println!("Run `rustpapertrack fetch-missing` to retry them on Semantic Scholar.");
    }
    Ok(())
}

async fn run_fetch_missing(layout: &DataLayout, show_progress: bool) -> Result<()> {
    banner("Semantic Scholar Recovery");

    let client = SemanticScholarClient::from_env()?;
    let limiter = FixedDelay::new(curation::RECOVERY_PACING);
    let recovery = curation::recover_missing(&client, layout, &limiter, show_progress).await?;

    let found = recovery.resolution.found.len();
    if found > 0 {
        println!("\nFound {} additional papers", found);
        println!("   Added to: {}", layout.curated().display());
        println!("   Total papers now: {}", recovery.curated_total);
    }
    if recovery.resolution.not_found.is_empty() {
        println!("\nAll papers found!");
    } else {
        println!("\nStill couldn't find {} papers", recovery.resolution.not_found.len());
        println!("   Updated: {}", layout.not_found().display());
    }
    Ok(())
}

// ============================================================================
// Scoring
// ============================================================================

async fn run_score(
    llm: LlmConfig,
    input: &std::path::Path,
    output: &std::path::Path,
    max_papers: Option<usize>,
    show_progress: bool,
) -> Result<()> {
    banner("Paper Scorer");
    println!("Model: {}", llm.model);
    println!("Input: {}", input.display());

    let config = ScoringConfig {
        max_papers,
        ..Default::default()
    };
    let engine = ScoringEngine::new(LlmClient::new(llm)?, FixedDelay::new(DEFAULT_PACING), config);

    let report = score_corpus(&engine, input, output, show_progress).await?;

    println!();
    banner("SCORING COMPLETE");
    println!("Saved to: {}\n", output.display());
    print!("{}", report);
    Ok(())
}

async fn run_check_api(llm: LlmConfig) -> Result<()> {
    banner("Testing Completion API Connection");
    println!("API key loaded: {}", llm.masked_key());
    println!("Endpoint: {} ({:?})", llm.base_url, llm.provider);

    let client = LlmClient::new(llm)?;
    let completion = client
        .complete("Reply with exactly: API test successful", 50)
        .await
        .context("API call failed")?;

    println!("\nAPI Response: {}", completion.text.trim());
    println!(
        "Used {} input tokens, {} output tokens (~${:.4})",
        completion.input_tokens,
        completion.output_tokens,
        estimate_cost(completion.total_tokens(), ScoringConfig::default().price_per_million)
    );
    info!("API connection working");
    Ok(())
}

// ============================================================================
// Inspection
// ============================================================================

fn run_inspect(layout: &DataLayout) -> Result<()> {
    match layout.latest_arxiv_collection() {
        Some(path) => {
            let papers = store::read_papers(&path)?;
            inspect_raw(&papers);
        }
        None => println!("No collected papers found"),
    }
    println!("\n");

    let scored_path = layout.scored();
    if !scored_path.exists() {
        println!("No scored papers found");
        return Ok(());
    }
    let scored = store::read_scored(&scored_path)?;
    inspect_scored(&scored);
    Ok(())
}

fn inspect_raw(papers: &[PaperRecord]) {
    banner(&format!("RAW COLLECTED PAPERS ({} total)", papers.len()));
    println!("\nFirst 10 paper titles:");
    for (i, paper) in papers.iter().take(10).enumerate() {
        println!("\n{}. {}", i + 1, paper.title_or_unknown());
        println!("   Categories: {}", paper.categories.as_deref().unwrap_or(""));
        println!(
            "   Abstract preview: {}",
            truncate(paper.abstract_text.as_deref().unwrap_or(""), 150)
        );
    }
}

fn inspect_scored(scored: &[ScoredRecord]) {
    banner(&format!("SCORED PAPERS ({} total)", scored.len()));

    if let Some(avg) = Averages::of(scored) {
        let range = |f: fn(&ScoredRecord) -> u8| {
            let values = scored.iter().map(f);
            (values.clone().min().unwrap_or(0), values.max().unwrap_or(0))
        };
        let (rel_min, rel_max) = range(|r| r.scores.relevance_score);
        let (mat_min, mat_max) = range(|r| r.scores.maturity_level);
        println!("\nScore Distribution:");
        println!("Relevance: min={}, max={}, avg={:.1}", rel_min, rel_max, avg.relevance);
        println!("Maturity: min={}, max={}, avg={:.1}", mat_min, mat_max, avg.maturity);
        println!(
            "Chinese defense connection: {} ({:.1}%)",
            report::defense_count(scored),
            report::percent(report::defense_count(scored), scored.len())
        );
    }

    banner("SAMPLE SCORED PAPERS:");
    for (i, r) in scored.iter().take(5).enumerate() {
        println!("\n{}. {}", i + 1, truncate(r.title(), 70));
        println!("   Relevance: {}/10", r.scores.relevance_score);
        println!("   Maturity: {}/5", r.scores.maturity_level);
        println!("   Chinese Defense: {}", r.scores.chinese_defense);
        println!("   Institution: {}", r.scores.institution_type);
        println!("   Reasoning: {}", truncate(&r.scores.reasoning, 200));
    }
}

// ============================================================================
// Cookie Management
// ============================================================================

fn handle_cookies(action: &CookieAction) -> Result<()> {
    let manager = CookieManager::new()?;

    match action {
        CookieAction::Clear => {
            manager.clear()?;
            println!("Cookies cleared.");
        }
        CookieAction::Path => {
            println!("Cookie file: {}", manager.path().display());
        }
        CookieAction::Import { file } => {
            let count = manager.import(file, "google")?;
            println!("Imported {} Google cookies into {}", count, manager.path().display());
            if count == 0 {
                println!("No cookies for a google domain were found in {}", file.display());
            }
        }
    }

    Ok(())
}
