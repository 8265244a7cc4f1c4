use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorKind {
    /// No content could be obtained after every fallback.
    ConnectionError,
    /// The rendered app crashed and too little was salvaged.
    ClientError,
    /// Some content was salvaged after a client-side error.
    PartialSuccess,
    /// Rendering failed but a secondary static fetch succeeded.
    FallbackSuccess,
}

impl ErrorKind {
    /// Degraded outcomes that still carry analyzable content.
    pub fn is_degraded(self) -> bool {
        matches!(self, Self::PartialSuccess | Self::FallbackSuccess)
    }

    /// Outcomes with nothing left to score.
    pub fn is_fatal(self) -> bool {
        matches!(self, Self::ConnectionError | Self::ClientError)
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum IssueCategory {
    Technical,
    Content,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Issue {
    pub category: IssueCategory,
    pub message: String,
}

impl Issue {
    pub fn technical(message: impl Into<String>) -> Self {
        Self {
            category: IssueCategory::Technical,
            message: message.into(),
        }
    }

    pub fn content(message: impl Into<String>) -> Self {
        Self {
            category: IssueCategory::Content,
            message: message.into(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Heading {
    pub level: u8,
    pub text: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageResult {
    pub url: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub headings: Vec<Heading>,
    pub word_count: usize,
    pub issues: Vec<Issue>,
    pub suggestions: Vec<String>,
    pub score: Option<u8>,
    pub internal_links: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_kind: Option<ErrorKind>,
    pub content_sample: String,
    pub has_structured_data: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<u16>,
    pub fetched_at: DateTime<Utc>,
}

impl PageResult {
    /// A result with no content, tagged with `kind`.
    pub fn failed(url: impl Into<String>, kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            title: None,
            meta_description: None,
            headings: Vec::new(),
            word_count: 0,
            issues: vec![Issue::technical(message)],
            suggestions: Vec::new(),
            score: None,
            internal_links: Vec::new(),
            error_kind: Some(kind),
            content_sample: String::new(),
            has_structured_data: false,
            status: None,
            fetched_at: Utc::now(),
        }
    }

    pub fn is_clean(&self) -> bool {
        self.error_kind.is_none()
    }
}

/// A page after the quantitative and qualitative scores are combined.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ScoredPage {
    #[serde(flatten)]
    pub page: PageResult,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub qualitative_score: Option<u8>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub final_score: Option<u8>,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AggregatedReport {
    pub overall_score: u8,
    pub pages_crawled: usize,
    pub pages_scored: usize,
    pub technical_issues: Vec<String>,
    pub content_issues: Vec<String>,
    pub recommendations: Vec<String>,
    pub generated_at: DateTime<Utc>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct DeepAnalysisReport {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub backlinks: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content_gaps: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analytics: Option<Vec<String>>,
    pub errors: Vec<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub completed_at: Option<DateTime<Utc>>,
}
