use std::sync::Arc;

use url::Url;

use crate::config::CrawlSettings;
use crate::context::CrawlContext;
use crate::extract::ExtractEngine;
use crate::formats::{ErrorKind, PageResult};
use crate::frontier::{Frontier, PatternCounter, is_valid_crawl_url};
use crate::render::{BrowserHandle, BrowserProvider};

/// Walks one site breadth-first in sequential batches of concurrent fetches.
pub struct RecursiveCrawler {
    engine: Arc<ExtractEngine>,
    provider: Arc<dyn BrowserProvider>,
    settings: CrawlSettings,
}

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct CrawlStats {
    pub processed: usize,
    pub capped: usize,
    pub rejected: usize,
    pub batches: usize,
}

impl RecursiveCrawler {
    pub fn new(
        engine: Arc<ExtractEngine>,
        provider: Arc<dyn BrowserProvider>,
        settings: CrawlSettings,
    ) -> Self {
        Self {
            engine,
            provider,
            settings,
        }
    }

    /// Launches one browser for the run and always closes it. Browser launch
    /// failure is the only error; per-page failures are results.
    pub async fn run(&self, ctx: &CrawlContext) -> anyhow::Result<Vec<PageResult>> {
        let browser = self.provider.launch().await?;
        let (results, stats) = self.crawl_with(browser.as_ref(), ctx).await;
        if let Err(err) = browser.close().await {
            tracing::warn!(site_id = ctx.site_id(), ?err, "browser close failed");
        }
        tracing::info!(
            site_id = ctx.site_id(),
            pages = results.len(),
            capped = stats.capped,
            rejected = stats.rejected,
            batches = stats.batches,
            "crawl finished"
        );
        Ok(results)
    }

    pub async fn crawl_with(
        &self,
        browser: &dyn BrowserHandle,
        ctx: &CrawlContext,
    ) -> (Vec<PageResult>, CrawlStats) {
        let budget = self.settings.page_budget;
        let concurrency = self.settings.concurrency.max(1);

        let mut frontier = Frontier::seeded(ctx.root_url().as_str());
        let mut patterns = PatternCounter::new(self.settings.pattern_cap);
        let mut stats = CrawlStats::default();
        let mut results = Vec::new();

        while !frontier.is_empty() && stats.processed < budget {
            let room = concurrency.min(budget - stats.processed);
            let mut batch = Vec::with_capacity(room);
            while batch.len() < room {
                let Some(entry) = frontier.pop() else {
                    break;
                };
                if !patterns.try_admit(&entry.pattern) {
                    tracing::debug!(url = %entry.url, pattern = %entry.pattern, "pattern cap reached; skipping");
                    stats.capped += 1;
                    continue;
                }
                batch.push(entry);
            }
            if batch.is_empty() {
                break;
            }

            stats.batches += 1;
            stats.processed += batch.len();
            tracing::debug!(site_id = ctx.site_id(), size = batch.len(), queued = frontier.len(), "crawl batch");

            let pages = futures::future::join_all(
                batch
                    .iter()
                    .map(|entry| self.engine.extract(&entry.url, browser, ctx)),
            )
            .await;

            for page in pages {
                if page.error_kind != Some(ErrorKind::ConnectionError) {
                    for link in &page.internal_links {
                        stats.rejected += usize::from(!enqueue_link(&mut frontier, ctx, link));
                    }
                }
                results.push(page);
            }
        }

        (results, stats)
    }
}

/// Returns false only when the link was rejected as invalid or off-site.
fn enqueue_link(frontier: &mut Frontier, ctx: &CrawlContext, link: &str) -> bool {
    let Ok(url) = Url::parse(link) else {
        tracing::debug!(link, "unparseable link discarded");
        return false;
    };
    if !is_valid_crawl_url(&url) {
        tracing::debug!(link, "invalid host discarded");
        return false;
    }
    if !ctx.is_same_site(&url) {
        tracing::debug!(link, "off-site link discarded");
        return false;
    }
    frontier.push(link);
    true
}
