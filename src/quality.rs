use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::cli::ScorerEngine;
use crate::formats::{Heading, PageResult};
use crate::openai::{self, OpenAiConfig};

const MAX_RECOMMENDATIONS: usize = 5;
const SAMPLE_CHARS_FOR_MODEL: usize = 4000;

/// What the qualitative scorer sees of one page.
#[derive(Debug, Clone, Serialize)]
pub struct PageSummary {
    pub url: String,
    pub title: Option<String>,
    pub meta_description: Option<String>,
    pub headings: Vec<Heading>,
    pub word_count: usize,
    pub quantitative_score: Option<u8>,
    pub issues: Vec<String>,
    pub content_sample: String,
}

impl PageSummary {
    pub fn from_page(page: &PageResult) -> Self {
        Self {
            url: page.url.clone(),
            title: page.title.clone(),
            meta_description: page.meta_description.clone(),
            headings: page.headings.clone(),
            word_count: page.word_count,
            quantitative_score: page.score,
            issues: page.issues.iter().map(|i| i.message.clone()).collect(),
            content_sample: crate::html::truncate_chars(&page.content_sample, SAMPLE_CHARS_FOR_MODEL),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct SiteSummary {
    pub root_url: String,
    pub overall_score: u8,
    pub pages_crawled: usize,
    pub technical_issues: Vec<String>,
    pub content_issues: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QualityAssessment {
    pub score: u8,
    #[serde(default)]
    pub recommendations: Vec<String>,
}

/// External judge of content quality. Failures are recovered by the caller.
#[async_trait]
pub trait QualitativeScorer: Send + Sync {
    async fn score(&self, page: &PageSummary) -> anyhow::Result<QualityAssessment>;
    async fn recommend(&self, site: &SiteSummary) -> anyhow::Result<Vec<String>>;
}

pub fn build_scorer(engine: ScorerEngine, neutral_score: u8) -> anyhow::Result<Arc<dyn QualitativeScorer>> {
    Ok(match engine {
        ScorerEngine::Noop => Arc::new(NoopScorer::new(neutral_score)),
        ScorerEngine::Openai => {
            let config = OpenAiConfig::from_env().context("load openai config")?;
            Arc::new(OpenAiScorer::new(config)?)
        }
    })
}

/// Returns the neutral score and no recommendations.
#[derive(Debug, Clone, Copy)]
pub struct NoopScorer {
    neutral_score: u8,
}

impl NoopScorer {
    pub fn new(neutral_score: u8) -> Self {
        Self { neutral_score }
    }
}

#[async_trait]
impl QualitativeScorer for NoopScorer {
    async fn score(&self, _page: &PageSummary) -> anyhow::Result<QualityAssessment> {
        Ok(QualityAssessment {
            score: self.neutral_score,
            recommendations: Vec::new(),
        })
    }

    async fn recommend(&self, _site: &SiteSummary) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

pub struct OpenAiScorer {
    client: reqwest::Client,
    config: OpenAiConfig,
}

impl OpenAiScorer {
    pub fn new(config: OpenAiConfig) -> anyhow::Result<Self> {
        Ok(Self {
            client: config.client()?,
            config,
        })
    }
}

#[derive(Debug, Deserialize)]
struct RecommendationReply {
    #[serde(default)]
    recommendations: Vec<String>,
}

#[async_trait]
impl QualitativeScorer for OpenAiScorer {
    async fn score(&self, page: &PageSummary) -> anyhow::Result<QualityAssessment> {
        let input_json = serde_json::to_string_pretty(page).context("serialize page summary")?;
        let input = format!("BEGIN_PAGE_JSON\n{input_json}\nEND_PAGE_JSON\n");
        let raw = openai::responses_text(&self.client, &self.config, PAGE_INSTRUCTIONS, &input, 0.0)
            .await
            .with_context(|| format!("score page {}", page.url))?;
        parse_assessment(&raw)
    }

    async fn recommend(&self, site: &SiteSummary) -> anyhow::Result<Vec<String>> {
        let input_json = serde_json::to_string_pretty(site).context("serialize site summary")?;
        let input = format!("BEGIN_SITE_JSON\n{input_json}\nEND_SITE_JSON\n");
        let raw = openai::responses_text(&self.client, &self.config, SITE_INSTRUCTIONS, &input, 0.2)
            .await
            .context("request site recommendations")?;
        let json = openai::extract_json_object(&raw).context("extract json object from openai output")?;
        let reply: RecommendationReply =
            serde_json::from_str(json).context("parse recommendations json")?;
        Ok(clean_recommendations(reply.recommendations))
    }
}

pub fn parse_assessment(raw: &str) -> anyhow::Result<QualityAssessment> {
    let json = openai::extract_json_object(raw).context("extract json object from openai output")?;
    let value: serde_json::Value = serde_json::from_str(json).context("parse assessment json")?;
    let score = value
        .get("score")
        .and_then(|v| v.as_f64())
        .ok_or_else(|| anyhow::anyhow!("assessment has no numeric `score`"))?;
    let recommendations = value
        .get("recommendations")
        .and_then(|v| v.as_array())
        .into_iter()
        .flatten()
        .filter_map(|v| v.as_str())
        .map(str::to_owned)
        .collect();
    Ok(QualityAssessment {
        score: score.round().clamp(0.0, 100.0) as u8,
        recommendations: clean_recommendations(recommendations),
    })
}

fn clean_recommendations(items: Vec<String>) -> Vec<String> {
    let mut out: Vec<String> = Vec::new();
    for item in items {
        let item = item.trim();
        if item.is_empty() || out.iter().any(|o| o == item) {
            continue;
        }
        out.push(item.to_owned());
        if out.len() == MAX_RECOMMENDATIONS {
            break;
        }
    }
    out
}

const PAGE_INSTRUCTIONS: &str = "You are an SEO content reviewer.\n\
\n\
Input: a JSON object between BEGIN_PAGE_JSON and END_PAGE_JSON describing one web page \
(url, title, meta description, headings, word count, structural issues, content sample).\n\
\n\
Judge the page's content quality for search: relevance of title and headings to the content, \
depth, readability, and usefulness to a visitor.\n\
\n\
Output ONLY a single JSON object (no markdown fences, no commentary):\n\
{\"score\": <integer 0-100>, \"recommendations\": [\"...\"]}\n\
Give at most 5 short, concrete recommendations.\n";

const SITE_INSTRUCTIONS: &str = "You are an SEO strategist.\n\
\n\
Input: a JSON object between BEGIN_SITE_JSON and END_SITE_JSON summarizing a crawled site \
(overall score, page count, technical and content issue rollups).\n\
\n\
Output ONLY a single JSON object (no markdown fences, no commentary):\n\
{\"recommendations\": [\"...\"]}\n\
Give at most 5 prioritized, site-wide recommendations.\n";
