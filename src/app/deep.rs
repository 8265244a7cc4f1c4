use async_trait::async_trait;
use url::Url;

use crate::app::model::SiteRecord;
use crate::extract::COMMON_SECTION_PATHS;
use crate::formats::ScoredPage;
use crate::language::strip_language;

/// Best-effort enrichment steps run by deep-analysis jobs. Each step may fail
/// on its own without failing the job.
#[async_trait]
pub trait DeepAnalyzer: Send + Sync {
    async fn backlinks(&self, site: &SiteRecord) -> anyhow::Result<Vec<String>>;
    async fn content_gaps(
        &self,
        site: &SiteRecord,
        pages: &[ScoredPage],
    ) -> anyhow::Result<Vec<String>>;
    async fn analytics(&self, site: &SiteRecord) -> anyhow::Result<Vec<String>>;
}

/// Content gaps from stored pages only; backlink and analytics providers are
/// not available locally.
#[derive(Debug, Clone, Copy, Default)]
pub struct LocalDeepAnalyzer;

#[async_trait]
impl DeepAnalyzer for LocalDeepAnalyzer {
    async fn backlinks(&self, _site: &SiteRecord) -> anyhow::Result<Vec<String>> {
        anyhow::bail!("backlink provider is not configured")
    }

    async fn content_gaps(
        &self,
        _site: &SiteRecord,
        pages: &[ScoredPage],
    ) -> anyhow::Result<Vec<String>> {
        if pages.is_empty() {
            anyhow::bail!("site has no crawled pages; run a general crawl first");
        }
        Ok(content_gaps(pages))
    }

    async fn analytics(&self, _site: &SiteRecord) -> anyhow::Result<Vec<String>> {
        anyhow::bail!("analytics provider is not configured")
    }
}

const THIN_PAGE_WORDS: usize = 300;

pub fn content_gaps(pages: &[ScoredPage]) -> Vec<String> {
    let first_segments = pages
        .iter()
        .filter_map(|p| Url::parse(&p.page.url).ok())
        .filter_map(|url| {
            strip_language(url.path())
                .split('/')
                .next()
                .map(|s| s.to_ascii_lowercase())
        })
        .collect::<Vec<_>>();

    let mut gaps = COMMON_SECTION_PATHS
        .iter()
        .filter(|section| !first_segments.iter().any(|s| s == *section))
        .map(|section| format!("No /{section} section found"))
        .collect::<Vec<_>>();

    let analyzable = pages.iter().filter(|p| p.page.is_clean() || p.page.error_kind.is_some_and(|k| k.is_degraded()));
    let mut thin = 0;
    let mut without_h1 = 0;
    for page in analyzable {
        if page.page.word_count < THIN_PAGE_WORDS {
            thin += 1;
        }
        if !page.page.headings.iter().any(|h| h.level == 1) {
            without_h1 += 1;
        }
    }
    if thin > 0 {
        gaps.push(format!("{thin} page(s) with fewer than {THIN_PAGE_WORDS} words"));
    }
    if without_h1 > 0 {
        gaps.push(format!("{without_h1} page(s) without an H1 heading"));
    }
    gaps
}
