mod support;

use std::sync::Arc;
use std::sync::atomic::Ordering;

use async_trait::async_trait;
use sitescore::app::deep::LocalDeepAnalyzer;
use sitescore::app::model::{CrawlJob, CrawlOptions, JobKind, SiteRecord, SiteState};
use sitescore::app::runner::{JobOutcome, JobRunner};
use sitescore::app::site_store::{LocalFsSiteStore, SiteStore};
use sitescore::config::{CrawlSettings, Settings};
use sitescore::context::CrawlContext;
use sitescore::crawl::RecursiveCrawler;
use sitescore::extract::ExtractEngine;
use sitescore::formats::{AggregatedReport, DeepAnalysisReport, ErrorKind, ScoredPage};
use sitescore::quality::{
    NoopScorer, PageSummary, QualitativeScorer, QualityAssessment, SiteSummary,
};
use sitescore::render::BrowserProvider;
use sitescore::variants::{ProbeOutcome, UrlProbe};
use support::{Behavior, BrokenProvider, FakeBrowser, Route, SiteStub, fast_settings};
use url::Url;

fn runner(
    settings: Settings,
    store: Arc<dyn SiteStore>,
    scorer: Arc<dyn QualitativeScorer>,
    provider: Arc<dyn BrowserProvider>,
) -> anyhow::Result<JobRunner> {
    let engine = Arc::new(ExtractEngine::new(&settings)?);
    Ok(JobRunner::new(
        settings,
        store,
        scorer,
        Arc::new(LocalDeepAnalyzer),
        provider,
        engine,
    ))
}

fn noop() -> Arc<dyn QualitativeScorer> {
    Arc::new(NoopScorer::new(50))
}

fn crawl_job(stub: &SiteStub, options: CrawlOptions) -> CrawlJob {
    let mut job = CrawlJob::new("site-1", stub.url("/"), JobKind::GeneralCrawl);
    job.options = options;
    job
}

fn ctx_for(stub: &SiteStub) -> anyhow::Result<CrawlContext> {
    Ok(CrawlContext::new("site-1", Url::parse(&stub.url("/"))?))
}

fn hrefs(prefix: &str, n: usize) -> Vec<String> {
    (1..=n).map(|i| format!("{prefix}{i}")).collect()
}

#[tokio::test]
async fn well_formed_page_is_scored_and_blended_with_neutral_quality() -> anyhow::Result<()> {
    let html = support::scenario_a_page("");
    let stub = SiteStub::spawn(vec![("/", Route::Html(html.clone()))]);
    let browser = FakeBrowser::new(Behavior::Render(html));
    let settings = fast_settings();

    let engine = ExtractEngine::new(&settings)?;
    let ctx = ctx_for(&stub)?;
    let handle = browser.launch().await?;
    let page = engine.extract(&stub.url("/"), handle.as_ref(), &ctx).await;

    assert_eq!(page.error_kind, None);
    assert_eq!(page.score, Some(90));
    assert_eq!(page.issues.len(), 1);
    assert_eq!(page.issues[0].message, "No JSON-LD structured data");
    assert_eq!(page.suggestions.len(), 2);
    assert_eq!(page.word_count, 402);
    assert_eq!(
        page.title.as_deref(),
        Some("A practical guide to choosing running shoes")
    );

    let tmp = tempfile::tempdir()?;
    let store = Arc::new(LocalFsSiteStore::new(tmp.path()));
    let runner = runner(settings, store.clone(), noop(), Arc::new(browser.clone()))?;
    let outcome = runner.run_job(&crawl_job(&stub, CrawlOptions::default())).await?;
    let JobOutcome::Crawled(report) = outcome else {
        anyhow::bail!("expected a crawl report");
    };

    assert_eq!(report.pages_crawled, 1);
    assert_eq!(report.pages_scored, 1);
    assert_eq!(report.overall_score, 66);

    let pages = store.list_pages("site-1").await?;
    assert_eq!(pages.len(), 1);
    assert_eq!(pages[0].final_score, Some(66));
    assert_eq!(pages[0].qualitative_score, Some(50));

    let site = store.get_site("site-1").await?.expect("site record");
    assert_eq!(site.state, SiteState::Completed);
    assert!(site.crawled_at.is_some());
    // One launch above for the direct extract, one for the job.
    assert_eq!(browser.stats.launches.load(Ordering::SeqCst), 2);
    assert_eq!(browser.stats.closes.load(Ordering::SeqCst), 1);
    Ok(())
}

#[tokio::test]
async fn language_detected_from_redirect_steers_variant_order() -> anyhow::Result<()> {
    let mut links = hrefs("/ro/page-", 8);
    links.push("/about".to_owned());
    links.push("/contact".to_owned());
    let home = support::links_page("Acasa", &links);
    let stub = SiteStub::spawn(vec![
        ("/", Route::Redirect("/ro/home".to_owned())),
        ("/ro/home", Route::Html(home.clone())),
    ]);
    let browser = FakeBrowser::new(Behavior::Render(home));
    let settings = fast_settings();

    let engine = ExtractEngine::new(&settings)?;
    let ctx = ctx_for(&stub)?;
    let handle = browser.launch().await?;
    let page = engine.extract(&stub.url("/"), handle.as_ref(), &ctx).await;

    assert_eq!(page.error_kind, None);
    assert_eq!(
        ctx.language_belief().primary_language.as_deref(),
        Some("ro")
    );
    assert!(ctx.language_belief().uses_language_in_path);

    let variants = engine.prober().variants(&ctx, "/contact");
    assert!(variants[0].url.ends_with("/ro/contact"), "{:?}", variants[0]);
    assert_eq!(variants[0].priority, 0);

    // Untranslated links are dropped once the site is known to use /ro/.
    assert!(
        page.internal_links
            .iter()
            .all(|link| !link.ends_with("/about") && !link.ends_with("/contact")),
        "{:?}",
        page.internal_links
    );
    Ok(())
}

#[tokio::test]
async fn render_timeouts_fall_back_to_static_content() -> anyhow::Result<()> {
    let leaves = hrefs("/leaf-", 5);
    let mut routes = vec![("/", Route::Html(support::links_page("Home", &leaves)))];
    let leaf_html = support::links_page("Leaf", &[]);
    for leaf in &leaves {
        routes.push((leaf.as_str(), Route::Html(leaf_html.clone())));
    }
    let stub = SiteStub::spawn(routes);
    let browser = FakeBrowser::new(Behavior::Timeout);

    let tmp = tempfile::tempdir()?;
    let store = Arc::new(LocalFsSiteStore::new(tmp.path()));
    let runner = runner(fast_settings(), store.clone(), noop(), Arc::new(browser))?;
    runner.run_job(&crawl_job(&stub, CrawlOptions::default())).await?;

    let pages = store.list_pages("site-1").await?;
    assert_eq!(pages.len(), 6);
    for page in &pages {
        assert!(
            matches!(
                page.page.error_kind,
                Some(ErrorKind::FallbackSuccess | ErrorKind::ConnectionError)
            ),
            "{}: {:?}",
            page.page.url,
            page.page.error_kind
        );
    }
    let root = pages
        .iter()
        .find(|p| p.page.url == stub.url("/"))
        .expect("root page stored");
    assert_eq!(root.page.error_kind, Some(ErrorKind::FallbackSuccess));
    assert_eq!(root.final_score, Some(30));
    assert!(
        root.page
            .issues
            .iter()
            .any(|i| i.message.starts_with("Rendering failed"))
    );

    let site = store.get_site("site-1").await?.expect("site record");
    assert_eq!(site.state, SiteState::Completed);
    let report = store.get_report("site-1").await?.expect("report saved");
    assert_eq!(report.pages_crawled, 6);
    assert_eq!(report.pages_scored, 1);
    assert_eq!(report.overall_score, 30);
    Ok(())
}

#[tokio::test]
async fn crawl_stops_at_budget_and_bounds_open_pages() -> anyhow::Result<()> {
    let leaves = hrefs("/item/", 30);
    let home = support::links_page("Home", &leaves);
    let stub = SiteStub::spawn(vec![("/", Route::Html(home.clone()))]);
    let browser = FakeBrowser::new(Behavior::Render(support::links_page("Item", &[])))
        .with("/", Behavior::Render(home));

    let engine = Arc::new(ExtractEngine::new(&fast_settings())?);
    let crawler = RecursiveCrawler::new(
        engine,
        Arc::new(browser.clone()),
        CrawlSettings {
            page_budget: 7,
            concurrency: 3,
            pattern_cap: 50,
        },
    );
    let ctx = ctx_for(&stub)?;
    let handle = browser.launch().await?;
    let (results, stats) = crawler.crawl_with(handle.as_ref(), &ctx).await;

    assert_eq!(results.len(), 7);
    assert_eq!(stats.processed, 7);
    assert_eq!(stats.batches, 3);
    assert!(browser.stats.peak() <= 3, "peak {}", browser.stats.peak());

    let mut urls = results.iter().map(|r| r.url.clone()).collect::<Vec<_>>();
    urls.sort();
    urls.dedup();
    assert_eq!(urls.len(), 7);
    Ok(())
}

/// Reports every candidate URL as missing without touching the network.
struct NothingExists;

#[async_trait]
impl UrlProbe for NothingExists {
    async fn probe(&self, _url: &str) -> ProbeOutcome {
        ProbeOutcome::from_status(404)
    }
}

#[tokio::test]
async fn www_root_is_requested_on_its_own_host() -> anyhow::Result<()> {
    let links = vec!["/about/".to_owned(), "https://shop.invalid/pricing".to_owned()];
    let home = support::links_page("Home", &links);
    let browser = FakeBrowser::new(Behavior::Render(support::links_page("Leaf", &[])))
        .with("/", Behavior::Render(home));

    let settings = fast_settings();
    let engine = Arc::new(ExtractEngine::with_probe(&settings, Arc::new(NothingExists))?);
    let crawler = RecursiveCrawler::new(engine, Arc::new(browser.clone()), settings.crawl);
    let ctx = CrawlContext::new("site-1", Url::parse("https://www.shop.invalid/")?);
    let handle = browser.launch().await?;
    let (results, _) = crawler.crawl_with(handle.as_ref(), &ctx).await;

    let mut navigated = browser.stats.navigated();
    navigated.sort();
    navigated.dedup();
    assert_eq!(
        navigated,
        vec![
            "https://www.shop.invalid/",
            "https://www.shop.invalid/about",
            "https://www.shop.invalid/pricing",
        ]
    );

    let mut urls = results.into_iter().map(|r| r.url).collect::<Vec<_>>();
    urls.sort();
    assert_eq!(
        urls,
        vec![
            "https://shop.invalid/",
            "https://shop.invalid/about",
            "https://shop.invalid/pricing",
        ]
    );
    Ok(())
}

#[tokio::test]
async fn pattern_cap_limits_templated_pages() -> anyhow::Result<()> {
    let products = hrefs("/products/", 20);
    let home = support::links_page("Shop", &products);
    let stub = SiteStub::spawn(vec![("/", Route::Html(home.clone()))]);
    let browser = FakeBrowser::new(Behavior::Render(support::links_page("Product", &[])))
        .with("/", Behavior::Render(home));

    let engine = Arc::new(ExtractEngine::new(&fast_settings())?);
    let crawler = RecursiveCrawler::new(
        engine,
        Arc::new(browser.clone()),
        CrawlSettings {
            page_budget: 100,
            concurrency: 4,
            pattern_cap: 5,
        },
    );
    let ctx = ctx_for(&stub)?;
    let handle = browser.launch().await?;
    let (results, stats) = crawler.crawl_with(handle.as_ref(), &ctx).await;

    let product_pages = results
        .iter()
        .filter(|r| r.url.contains("/products/"))
        .count();
    assert_eq!(product_pages, 5);
    assert_eq!(results.len(), 6);
    assert_eq!(stats.capped, 15);
    Ok(())
}

#[tokio::test]
async fn client_crash_with_salvageable_text_is_partial() -> anyhow::Result<()> {
    let plain = support::links_page("App", &[]);
    let stub = SiteStub::spawn(vec![
        ("/", Route::Html(plain.clone())),
        ("/rich", Route::Html(plain.clone())),
        ("/empty", Route::Html(plain)),
    ]);
    let browser = FakeBrowser::new(Behavior::Timeout)
        .with(
            "/rich",
            Behavior::Crash {
                text: support::words(80),
                links: vec![stub.url("/pricing"), "https://other.example.org/x".to_owned()],
            },
        )
        .with(
            "/empty",
            Behavior::Crash {
                text: "Loading".to_owned(),
                links: Vec::new(),
            },
        );

    let engine = ExtractEngine::new(&fast_settings())?;
    let ctx = ctx_for(&stub)?;
    let handle = browser.launch().await?;

    let rich = engine.extract(&stub.url("/rich"), handle.as_ref(), &ctx).await;
    assert_eq!(rich.error_kind, Some(ErrorKind::PartialSuccess));
    assert_eq!(rich.score, Some(30));
    assert_eq!(rich.word_count, 80);
    assert!(rich.internal_links.contains(&stub.url("/pricing")));
    assert!(
        !rich
            .internal_links
            .iter()
            .any(|l| l.contains("other.example.org"))
    );

    let empty = engine.extract(&stub.url("/empty"), handle.as_ref(), &ctx).await;
    assert_eq!(empty.error_kind, Some(ErrorKind::ClientError));
    assert_eq!(empty.score, None);
    assert!(empty.issues[0].message.contains("crash marker"));

    assert_eq!(
        browser.stats.open_pages.load(Ordering::SeqCst),
        0
    );
    Ok(())
}

#[tokio::test]
async fn unreachable_page_is_a_connection_error() -> anyhow::Result<()> {
    let stub = SiteStub::spawn(vec![("/down", Route::Status(503))]);
    let browser = FakeBrowser::new(Behavior::Timeout);

    let engine = ExtractEngine::new(&fast_settings())?;
    let ctx = ctx_for(&stub)?;
    let handle = browser.launch().await?;
    let page = engine.extract(&stub.url("/down"), handle.as_ref(), &ctx).await;

    assert_eq!(page.error_kind, Some(ErrorKind::ConnectionError));
    assert_eq!(page.score, None);
    assert!(page.internal_links.is_empty());
    assert_eq!(page.status, Some(503));
    Ok(())
}

/// Only the listed URLs exist.
struct KnownUrls(Vec<String>);

#[async_trait]
impl UrlProbe for KnownUrls {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        if self.0.iter().any(|known| known == url) {
            ProbeOutcome::from_status(200)
        } else {
            ProbeOutcome::from_status(404)
        }
    }
}

#[tokio::test]
async fn section_seeding_is_kept_for_a_reachable_page() -> anyhow::Result<()> {
    let plain = support::links_page("Plain", &[]);
    let stub = SiteStub::spawn(vec![
        ("/down", Route::Status(503)),
        ("/plain", Route::Html(plain.clone())),
    ]);
    let browser = FakeBrowser::new(Behavior::Timeout).with("/plain", Behavior::Render(plain));

    let probe = KnownUrls(vec![stub.url("/about")]);
    let engine = ExtractEngine::with_probe(&fast_settings(), Arc::new(probe))?;
    let ctx = ctx_for(&stub)?;
    let handle = browser.launch().await?;

    let down = engine.extract(&stub.url("/down"), handle.as_ref(), &ctx).await;
    assert_eq!(down.error_kind, Some(ErrorKind::ConnectionError));
    assert!(down.internal_links.is_empty());

    let plain = engine.extract(&stub.url("/plain"), handle.as_ref(), &ctx).await;
    assert_eq!(plain.error_kind, None);
    assert_eq!(plain.internal_links, vec![stub.url("/about")]);
    Ok(())
}

#[tokio::test]
async fn browser_launch_failure_marks_site_failed() -> anyhow::Result<()> {
    let stub = SiteStub::spawn(vec![("/", Route::Html(support::scenario_a_page("")))]);
    let tmp = tempfile::tempdir()?;
    let store = Arc::new(LocalFsSiteStore::new(tmp.path()));
    let runner = runner(fast_settings(), store.clone(), noop(), Arc::new(BrokenProvider))?;

    let err = runner
        .run_job(&crawl_job(&stub, CrawlOptions::default()))
        .await
        .expect_err("launch failure must fail the job");
    assert!(format!("{err:#}").contains("launch"), "{err:#}");

    let site = store.get_site("site-1").await?.expect("site record");
    assert_eq!(site.state, SiteState::Failed);
    assert!(site.message.unwrap_or_default().contains("launch"));
    assert!(store.get_report("site-1").await?.is_none());
    Ok(())
}

struct FixedScorer;

#[async_trait]
impl QualitativeScorer for FixedScorer {
    async fn score(&self, _page: &PageSummary) -> anyhow::Result<QualityAssessment> {
        Ok(QualityAssessment {
            score: 80,
            recommendations: vec!["Add a comparison table".to_owned()],
        })
    }

    async fn recommend(&self, site: &SiteSummary) -> anyhow::Result<Vec<String>> {
        Ok(vec![format!("Lift the {} score", site.overall_score)])
    }
}

#[tokio::test]
async fn qualitative_score_is_blended_forty_sixty() -> anyhow::Result<()> {
    let html = support::scenario_a_page("");
    let stub = SiteStub::spawn(vec![("/", Route::Html(html.clone()))]);
    let browser = FakeBrowser::new(Behavior::Render(html));

    let tmp = tempfile::tempdir()?;
    let store = Arc::new(LocalFsSiteStore::new(tmp.path()));
    let runner = runner(
        fast_settings(),
        store.clone(),
        Arc::new(FixedScorer),
        Arc::new(browser),
    )?;
    let JobOutcome::Crawled(report) = runner
        .run_job(&crawl_job(&stub, CrawlOptions::default()))
        .await?
    else {
        anyhow::bail!("expected a crawl report");
    };

    assert_eq!(report.overall_score, 84);
    assert_eq!(report.recommendations, vec!["Lift the 84 score".to_owned()]);

    let pages = store.list_pages("site-1").await?;
    assert_eq!(pages[0].qualitative_score, Some(80));
    assert_eq!(pages[0].final_score, Some(84));
    assert_eq!(pages[0].recommendations, vec!["Add a comparison table".to_owned()]);
    Ok(())
}

/// Records which pages were sent for a qualitative call.
#[derive(Default)]
struct RecordingScorer {
    seen: std::sync::Mutex<Vec<String>>,
}

#[async_trait]
impl QualitativeScorer for RecordingScorer {
    async fn score(&self, page: &PageSummary) -> anyhow::Result<QualityAssessment> {
        self.seen.lock().expect("lock seen").push(page.url.clone());
        Ok(QualityAssessment {
            score: 50,
            recommendations: Vec::new(),
        })
    }

    async fn recommend(&self, _site: &SiteSummary) -> anyhow::Result<Vec<String>> {
        Ok(Vec::new())
    }
}

#[tokio::test]
async fn fatal_pages_skip_the_qualitative_call() -> anyhow::Result<()> {
    let links = vec!["/crash".to_owned(), "/down".to_owned()];
    let home = support::links_page("Home", &links);
    let stub = SiteStub::spawn(vec![
        ("/", Route::Html(home.clone())),
        ("/crash", Route::Html(support::links_page("App", &[]))),
        ("/down", Route::Status(503)),
    ]);
    let browser = FakeBrowser::new(Behavior::Timeout)
        .with("/", Behavior::Render(home))
        .with(
            "/crash",
            Behavior::Crash {
                text: "Loading".to_owned(),
                links: Vec::new(),
            },
        );

    let tmp = tempfile::tempdir()?;
    let store = Arc::new(LocalFsSiteStore::new(tmp.path()));
    let scorer = Arc::new(RecordingScorer::default());
    let runner = runner(fast_settings(), store.clone(), scorer.clone(), Arc::new(browser))?;
    runner.run_job(&crawl_job(&stub, CrawlOptions::default())).await?;

    let seen = scorer.seen.lock().expect("lock seen").clone();
    assert_eq!(seen, vec![stub.url("/")]);

    let pages = store.list_pages("site-1").await?;
    assert_eq!(pages.len(), 3);
    for page in pages.iter().filter(|p| p.page.url != stub.url("/")) {
        assert!(
            page.page.error_kind.is_some_and(ErrorKind::is_fatal),
            "{}: {:?}",
            page.page.url,
            page.page.error_kind
        );
        assert_eq!(page.final_score, None);
    }
    Ok(())
}

/// Rejects every batch insert and any single page whose URL contains `/b`.
struct FlakyStore {
    inner: LocalFsSiteStore,
}

#[async_trait]
impl SiteStore for FlakyStore {
    async fn get_site(&self, site_id: &str) -> anyhow::Result<Option<SiteRecord>> {
        self.inner.get_site(site_id).await
    }

    async fn put_site(&self, site: &SiteRecord) -> anyhow::Result<()> {
        self.inner.put_site(site).await
    }

    async fn set_site_state(
        &self,
        site_id: &str,
        state: SiteState,
        message: Option<String>,
    ) -> anyhow::Result<()> {
        self.inner.set_site_state(site_id, state, message).await
    }

    async fn clear_pages(&self, site_id: &str) -> anyhow::Result<()> {
        self.inner.clear_pages(site_id).await
    }

    async fn insert_pages(&self, _site_id: &str, _pages: &[ScoredPage]) -> anyhow::Result<()> {
        anyhow::bail!("batch insert rejected")
    }

    async fn insert_page(&self, site_id: &str, page: &ScoredPage) -> anyhow::Result<()> {
        if page.page.url.contains("/b") {
            anyhow::bail!("row rejected: {}", page.page.url);
        }
        self.inner.insert_page(site_id, page).await
    }

    async fn list_pages(&self, site_id: &str) -> anyhow::Result<Vec<ScoredPage>> {
        self.inner.list_pages(site_id).await
    }

    async fn save_report(&self, site_id: &str, report: &AggregatedReport) -> anyhow::Result<()> {
        self.inner.save_report(site_id, report).await
    }

    async fn get_report(&self, site_id: &str) -> anyhow::Result<Option<AggregatedReport>> {
        self.inner.get_report(site_id).await
    }

    async fn save_deep_analysis(
        &self,
        site_id: &str,
        report: &DeepAnalysisReport,
    ) -> anyhow::Result<()> {
        self.inner.save_deep_analysis(site_id, report).await
    }

    async fn get_deep_analysis(
        &self,
        site_id: &str,
    ) -> anyhow::Result<Option<DeepAnalysisReport>> {
        self.inner.get_deep_analysis(site_id).await
    }
}

/// Refuses the transition into `Crawling`.
struct StuckStore {
    inner: LocalFsSiteStore,
}

#[async_trait]
impl SiteStore for StuckStore {
    async fn get_site(&self, site_id: &str) -> anyhow::Result<Option<SiteRecord>> {
        self.inner.get_site(site_id).await
    }

    async fn put_site(&self, site: &SiteRecord) -> anyhow::Result<()> {
        self.inner.put_site(site).await
    }

    async fn set_site_state(
        &self,
        site_id: &str,
        state: SiteState,
        message: Option<String>,
    ) -> anyhow::Result<()> {
        if state == SiteState::Crawling {
            anyhow::bail!("state column locked");
        }
        self.inner.set_site_state(site_id, state, message).await
    }

    async fn clear_pages(&self, site_id: &str) -> anyhow::Result<()> {
        self.inner.clear_pages(site_id).await
    }

    async fn insert_pages(&self, site_id: &str, pages: &[ScoredPage]) -> anyhow::Result<()> {
        self.inner.insert_pages(site_id, pages).await
    }

    async fn insert_page(&self, site_id: &str, page: &ScoredPage) -> anyhow::Result<()> {
        self.inner.insert_page(site_id, page).await
    }

    async fn list_pages(&self, site_id: &str) -> anyhow::Result<Vec<ScoredPage>> {
        self.inner.list_pages(site_id).await
    }

    async fn save_report(&self, site_id: &str, report: &AggregatedReport) -> anyhow::Result<()> {
        self.inner.save_report(site_id, report).await
    }

    async fn get_report(&self, site_id: &str) -> anyhow::Result<Option<AggregatedReport>> {
        self.inner.get_report(site_id).await
    }

    async fn save_deep_analysis(
        &self,
        site_id: &str,
        report: &DeepAnalysisReport,
    ) -> anyhow::Result<()> {
        self.inner.save_deep_analysis(site_id, report).await
    }

    async fn get_deep_analysis(
        &self,
        site_id: &str,
    ) -> anyhow::Result<Option<DeepAnalysisReport>> {
        self.inner.get_deep_analysis(site_id).await
    }
}

#[tokio::test]
async fn failure_to_start_crawling_marks_site_failed() -> anyhow::Result<()> {
    let stub = SiteStub::spawn(vec![("/", Route::Html(support::scenario_a_page("")))]);
    let browser = FakeBrowser::new(Behavior::Render(support::scenario_a_page("")));
    let tmp = tempfile::tempdir()?;
    let store = Arc::new(StuckStore {
        inner: LocalFsSiteStore::new(tmp.path()),
    });
    let runner = runner(fast_settings(), store.clone(), noop(), Arc::new(browser.clone()))?;

    let err = runner
        .run_job(&crawl_job(&stub, CrawlOptions::default()))
        .await
        .expect_err("state write failure must fail the job");
    assert!(format!("{err:#}").contains("mark crawling"), "{err:#}");

    let site = store.get_site("site-1").await?.expect("site record");
    assert_eq!(site.state, SiteState::Failed);
    assert!(site.message.unwrap_or_default().contains("state column locked"));
    assert_eq!(browser.stats.launches.load(Ordering::SeqCst), 0);
    Ok(())
}

#[tokio::test]
async fn failed_batch_insert_falls_back_to_single_rows() -> anyhow::Result<()> {
    let links = vec!["/a".to_owned(), "/b".to_owned(), "/c".to_owned()];
    let home = support::links_page("Home", &links);
    let stub = SiteStub::spawn(vec![("/", Route::Html(home.clone()))]);
    let browser = FakeBrowser::new(Behavior::Render(support::links_page("Leaf", &[])))
        .with("/", Behavior::Render(home));

    let tmp = tempfile::tempdir()?;
    let store = Arc::new(FlakyStore {
        inner: LocalFsSiteStore::new(tmp.path()),
    });
    let runner = runner(fast_settings(), store.clone(), noop(), Arc::new(browser))?;
    let JobOutcome::Crawled(report) = runner
        .run_job(&crawl_job(&stub, CrawlOptions::default()))
        .await?
    else {
        anyhow::bail!("expected a crawl report");
    };
    assert_eq!(report.pages_crawled, 4);

    let stored = store
        .list_pages("site-1")
        .await?
        .into_iter()
        .map(|p| p.page.url)
        .collect::<Vec<_>>();
    assert_eq!(stored.len(), 3);
    assert!(!stored.iter().any(|u| u.ends_with("/b")));

    let site = store.get_site("site-1").await?.expect("site record");
    assert_eq!(site.state, SiteState::Completed);
    Ok(())
}
