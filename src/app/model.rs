use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::CrawlSettings;

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, clap::ValueEnum)]
#[serde(rename_all = "kebab-case")]
pub enum JobKind {
    GeneralCrawl,
    DeepAnalysis,
}

impl JobKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::GeneralCrawl => "general-crawl",
            Self::DeepAnalysis => "deep-analysis",
        }
    }
}

/// Per-job overrides of the crawl settings.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct CrawlOptions {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_budget: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub concurrency: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pattern_cap: Option<usize>,
}

impl CrawlOptions {
    pub fn apply(&self, base: CrawlSettings) -> CrawlSettings {
        CrawlSettings {
            page_budget: self.page_budget.unwrap_or(base.page_budget),
            concurrency: self.concurrency.unwrap_or(base.concurrency).max(1),
            pattern_cap: self.pattern_cap.unwrap_or(base.pattern_cap),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CrawlJob {
    pub job_id: String,
    pub site_id: String,
    pub root_url: String,
    pub kind: JobKind,
    #[serde(default)]
    pub options: CrawlOptions,
    pub enqueued_at: DateTime<Utc>,
}

impl CrawlJob {
    pub fn new(site_id: impl Into<String>, root_url: impl Into<String>, kind: JobKind) -> Self {
        Self {
            job_id: format!("j_{}", uuid::Uuid::new_v4().simple()),
            site_id: site_id.into(),
            root_url: root_url.into(),
            kind,
            options: CrawlOptions::default(),
            enqueued_at: Utc::now(),
        }
    }
}

/// Site ids name a directory in the site store, so they must stay a single
/// path component.
pub fn validate_site_id(site_id: &str) -> anyhow::Result<()> {
    if site_id.is_empty()
        || site_id == "."
        || site_id.contains("..")
        || site_id.contains(['/', '\\'])
    {
        anyhow::bail!("invalid site id: {site_id:?}");
    }
    Ok(())
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum SiteState {
    Pending,
    Crawling,
    Completed,
    Failed,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SiteRecord {
    pub site_id: String,
    pub root_url: String,
    pub state: SiteState,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    pub updated_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub crawled_at: Option<DateTime<Utc>>,
}

impl SiteRecord {
    pub fn new(site_id: impl Into<String>, root_url: impl Into<String>) -> Self {
        Self {
            site_id: site_id.into(),
            root_url: root_url.into(),
            state: SiteState::Pending,
            message: None,
            updated_at: Utc::now(),
            crawled_at: None,
        }
    }
}
