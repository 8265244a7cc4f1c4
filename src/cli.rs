use clap::{Args, Parser, Subcommand, ValueEnum};
use serde::{Deserialize, Serialize};

use crate::app::model::JobKind;

#[derive(Debug, Parser)]
#[command(author, version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    Score(ScoreArgs),
    Normalize(NormalizeArgs),
    Variants(VariantsArgs),
    Crawl(CrawlArgs),
    Enqueue(EnqueueArgs),
    Worker(WorkerArgs),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScorerEngine {
    Noop,
    Openai,
}

#[derive(Debug, Args)]
pub struct ScoreArgs {
    /// Local HTML file to score.
    #[arg(long)]
    pub html: String,

    /// URL the HTML was fetched from (echoed in the output).
    #[arg(long)]
    pub url: Option<String>,

    /// YAML settings file (scoring rules).
    #[arg(long)]
    pub config: Option<String>,
}

#[derive(Debug, Args)]
pub struct NormalizeArgs {
    pub url: String,
}

#[derive(Debug, Args)]
pub struct VariantsArgs {
    /// Site base URL.
    #[arg(long)]
    pub url: String,

    /// Path to generate candidates for (language segment optional).
    #[arg(long)]
    pub path: String,

    /// Language already detected for the site.
    #[arg(long)]
    pub language: Option<String>,
}

#[derive(Debug, Args)]
pub struct CrawlArgs {
    /// Root URL (must be http/https).
    #[arg(long)]
    pub url: String,

    /// Store directory for site records, pages and reports.
    #[arg(long)]
    pub store: String,

    /// Site id (default: derived from the root URL host).
    #[arg(long)]
    pub site_id: Option<String>,

    #[arg(long, value_enum, default_value_t = ScorerEngine::Noop)]
    pub engine: ScorerEngine,

    /// YAML settings file.
    #[arg(long)]
    pub config: Option<String>,

    /// Override the page budget for this crawl.
    #[arg(long)]
    pub max_pages: Option<usize>,
}

#[derive(Debug, Args)]
pub struct EnqueueArgs {
    /// Queue directory.
    #[arg(long)]
    pub queue: String,

    /// Root URL (must be http/https).
    #[arg(long)]
    pub url: String,

    #[arg(long)]
    pub site_id: String,

    #[arg(long, value_enum, default_value_t = JobKind::GeneralCrawl)]
    pub kind: JobKind,

    /// Override the page budget for this job.
    #[arg(long)]
    pub max_pages: Option<usize>,
}

#[derive(Debug, Args)]
pub struct WorkerArgs {
    /// Queue directory.
    #[arg(long)]
    pub queue: String,

    /// Store directory for site records, pages and reports.
    #[arg(long)]
    pub store: String,

    /// Maximum jobs run at the same time.
    #[arg(long, default_value_t = 1)]
    pub max_concurrent_jobs: usize,

    /// Drain the queue and exit instead of polling.
    #[arg(long)]
    pub once: bool,

    /// Move jobs left in `running/` by a dead worker back to `pending/` first.
    #[arg(long)]
    pub recover: bool,

    /// Seconds between polls of an empty queue.
    #[arg(long, default_value_t = 5)]
    pub poll_secs: u64,

    #[arg(long, value_enum, default_value_t = ScorerEngine::Noop)]
    pub engine: ScorerEngine,

    /// YAML settings file.
    #[arg(long)]
    pub config: Option<String>,
}
