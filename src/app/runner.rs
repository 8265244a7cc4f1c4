use std::future::Future;
use std::sync::Arc;

use anyhow::Context as _;
use chrono::Utc;
use futures::StreamExt as _;
use url::Url;

use crate::app::deep::DeepAnalyzer;
use crate::app::model::{CrawlJob, JobKind, SiteRecord, SiteState};
use crate::app::site_store::SiteStore;
use crate::config::Settings;
use crate::context::CrawlContext;
use crate::crawl::RecursiveCrawler;
use crate::extract::ExtractEngine;
use crate::formats::{AggregatedReport, DeepAnalysisReport, PageResult, ScoredPage};
use crate::quality::{PageSummary, QualitativeScorer, SiteSummary};
use crate::render::BrowserProvider;
use crate::report;

#[derive(Debug, Clone)]
pub enum JobOutcome {
    Crawled(AggregatedReport),
    Analyzed(DeepAnalysisReport),
}

/// Executes crawl jobs end to end and owns the site state machine.
pub struct JobRunner {
    settings: Settings,
    store: Arc<dyn SiteStore>,
    scorer: Arc<dyn QualitativeScorer>,
    deep: Arc<dyn DeepAnalyzer>,
    provider: Arc<dyn BrowserProvider>,
    engine: Arc<ExtractEngine>,
}

impl JobRunner {
    pub fn new(
        settings: Settings,
        store: Arc<dyn SiteStore>,
        scorer: Arc<dyn QualitativeScorer>,
        deep: Arc<dyn DeepAnalyzer>,
        provider: Arc<dyn BrowserProvider>,
        engine: Arc<ExtractEngine>,
    ) -> Self {
        Self {
            settings,
            store,
            scorer,
            deep,
            provider,
            engine,
        }
    }

    pub async fn run_job(&self, job: &CrawlJob) -> anyhow::Result<JobOutcome> {
        tracing::info!(job_id = %job.job_id, site_id = %job.site_id, kind = job.kind.as_str(), "job started");
        let outcome = match job.kind {
            JobKind::GeneralCrawl => self.general_crawl(job).await.map(JobOutcome::Crawled),
            JobKind::DeepAnalysis => self.deep_analysis(job).await.map(JobOutcome::Analyzed),
        };
        match &outcome {
            Ok(_) => tracing::info!(job_id = %job.job_id, "job finished"),
            Err(err) => tracing::error!(job_id = %job.job_id, ?err, "job failed"),
        }
        outcome
    }

    /// Sets the site to `Crawling`, then to `Completed` only after pages and
    /// report are persisted. Any error leaves it `Failed`.
    pub async fn general_crawl(&self, job: &CrawlJob) -> anyhow::Result<AggregatedReport> {
        match self.try_general_crawl(job).await {
            Ok(report) => Ok(report),
            Err(err) => {
                if let Err(mark_err) = self.mark_failed(&job.site_id, format!("{err:#}")).await {
                    tracing::warn!(site_id = %job.site_id, ?mark_err, "could not mark site failed");
                }
                Err(err)
            }
        }
    }

    async fn try_general_crawl(&self, job: &CrawlJob) -> anyhow::Result<AggregatedReport> {
        self.ensure_site(job).await.context("load site")?;
        self.store
            .set_site_state(&job.site_id, SiteState::Crawling, None)
            .await
            .context("mark crawling")?;

        let root_url = Url::parse(&job.root_url).context("parse root url")?;
        if root_url.scheme() != "http" && root_url.scheme() != "https" {
            anyhow::bail!("root url must be http/https: {root_url}");
        }

        let ctx = CrawlContext::new(&job.site_id, root_url);
        let crawl_settings = job.options.apply(self.settings.crawl);
        let crawler = RecursiveCrawler::new(
            Arc::clone(&self.engine),
            Arc::clone(&self.provider),
            crawl_settings,
        );
        let pages = crawler.run(&ctx).await.context("crawl site")?;

        let scored = self.score_pages(pages, crawl_settings.concurrency).await;
        self.persist_pages(&job.site_id, &scored)
            .await
            .context("persist pages")?;

        let mut report = report::aggregate(&scored, Vec::new());
        if report.pages_scored > 0 {
            let summary = SiteSummary {
                root_url: job.root_url.clone(),
                overall_score: report.overall_score,
                pages_crawled: report.pages_crawled,
                technical_issues: report.technical_issues.clone(),
                content_issues: report.content_issues.clone(),
            };
            match self.scorer.recommend(&summary).await {
                Ok(strategic) if !strategic.is_empty() => report.recommendations = strategic,
                Ok(_) => {}
                Err(err) => {
                    tracing::warn!(site_id = %job.site_id, ?err, "strategic recommendations unavailable; using page suggestions");
                }
            }
        }

        self.store
            .save_report(&job.site_id, &report)
            .await
            .context("save report")?;
        self.store
            .set_site_state(&job.site_id, SiteState::Completed, None)
            .await
            .context("mark completed")?;

        tracing::info!(
            site_id = %job.site_id,
            pages = report.pages_crawled,
            scored = report.pages_scored,
            overall_score = report.overall_score,
            "site crawl completed"
        );
        Ok(report)
    }

    async fn score_pages(&self, pages: Vec<PageResult>, concurrency: usize) -> Vec<ScoredPage> {
        futures::stream::iter(pages)
            .map(|page| self.score_page(page))
            .buffered(concurrency.max(1))
            .collect()
            .await
    }

    /// Clean pages blend the quantitative score with a qualitative call;
    /// degraded pages keep the floor score; failed pages stay unscored.
    async fn score_page(&self, page: PageResult) -> ScoredPage {
        let rules = &self.settings.scoring;
        match page.error_kind {
            Some(kind) if kind.is_fatal() => ScoredPage {
                final_score: None,
                qualitative_score: None,
                recommendations: Vec::new(),
                page,
            },
            Some(kind) if kind.is_degraded() => ScoredPage {
                final_score: Some(rules.degraded_floor_score),
                qualitative_score: None,
                recommendations: Vec::new(),
                page,
            },
            _ => {
                let quantitative = page.score.unwrap_or(0);
                let (qualitative_score, recommendations) =
                    match self.scorer.score(&PageSummary::from_page(&page)).await {
                        Ok(assessment) => (Some(assessment.score), assessment.recommendations),
                        Err(err) => {
                            tracing::warn!(url = %page.url, ?err, "qualitative scoring failed; using neutral score");
                            (None, Vec::new())
                        }
                    };
                let qualitative = qualitative_score.unwrap_or(rules.neutral_qualitative_score);
                ScoredPage {
                    final_score: Some(rules.blend(quantitative, qualitative)),
                    qualitative_score,
                    recommendations,
                    page,
                }
            }
        }
    }

    /// Replaces the site's pages in batches; a failed batch is retried one
    /// page at a time.
    async fn persist_pages(&self, site_id: &str, pages: &[ScoredPage]) -> anyhow::Result<()> {
        self.store.clear_pages(site_id).await.context("clear pages")?;

        let batch_size = self.settings.storage.page_batch_size.max(1);
        let mut dropped = 0usize;
        for batch in pages.chunks(batch_size) {
            let Err(err) = self.store.insert_pages(site_id, batch).await else {
                continue;
            };
            tracing::warn!(site_id, ?err, size = batch.len(), "batch insert failed; inserting pages one by one");
            for page in batch {
                if let Err(err) = self.store.insert_page(site_id, page).await {
                    tracing::warn!(site_id, url = %page.page.url, ?err, "page insert failed");
                    dropped += 1;
                }
            }
        }

        if dropped > 0 && dropped == pages.len() {
            anyhow::bail!("no page could be stored ({dropped} failed)");
        }
        Ok(())
    }

    /// Runs every enrichment step; individual failures are recorded in the
    /// report and never fail the job.
    pub async fn deep_analysis(&self, job: &CrawlJob) -> anyhow::Result<DeepAnalysisReport> {
        let site = self.ensure_site(job).await.context("load site")?;
        let mut report = DeepAnalysisReport::default();

        let pages = best_effort(
            "load pages",
            self.store.list_pages(&job.site_id),
            &mut report.errors,
        )
        .await
        .unwrap_or_default();

        report.backlinks =
            best_effort("backlinks", self.deep.backlinks(&site), &mut report.errors).await;
        report.content_gaps = best_effort(
            "content gaps",
            self.deep.content_gaps(&site, &pages),
            &mut report.errors,
        )
        .await;
        report.analytics =
            best_effort("analytics", self.deep.analytics(&site), &mut report.errors).await;
        report.completed_at = Some(Utc::now());

        self.store
            .save_deep_analysis(&job.site_id, &report)
            .await
            .context("save deep analysis")?;
        Ok(report)
    }

    async fn ensure_site(&self, job: &CrawlJob) -> anyhow::Result<SiteRecord> {
        if let Some(site) = self.store.get_site(&job.site_id).await? {
            return Ok(site);
        }
        let site = SiteRecord::new(&job.site_id, &job.root_url);
        self.store.put_site(&site).await?;
        Ok(site)
    }

    async fn mark_failed(&self, site_id: &str, message: String) -> anyhow::Result<()> {
        self.store
            .set_site_state(site_id, SiteState::Failed, Some(message))
            .await
    }
}

async fn best_effort<T>(
    step: &str,
    fut: impl Future<Output = anyhow::Result<T>>,
    errors: &mut Vec<String>,
) -> Option<T> {
    match fut.await {
        Ok(value) => Some(value),
        Err(err) => {
            tracing::warn!(step, ?err, "deep analysis step failed");
            errors.push(format!("{step}: {err:#}"));
            None
        }
    }
}
