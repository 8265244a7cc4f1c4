use std::sync::Arc;

use chrono::Utc;
use scraper::Html;
use url::Url;

use crate::config::{ScoringRules, Settings, TimeoutSettings};
use crate::context::CrawlContext;
use crate::fetch::{StaticFetcher, StaticPage};
use crate::formats::{ErrorKind, Issue, PageResult};
use crate::html;
use crate::links::{prune_untranslated, same_site_links, union_links};
use crate::normalize::normalize_url;
use crate::render::{BrowserHandle, NavigationWait, PageRenderer};
use crate::scorer::{self, PageSignals};
use crate::variants::{HttpProbe, UrlProbe, VariantProber};

/// Section paths probed when a page exposes no links at all.
pub const COMMON_SECTION_PATHS: &[&str] =
    &["about", "contact", "services", "products", "blog", "news", "faq"];

/// Text shown by common frameworks when the client-side app has crashed.
pub const CRASH_MARKERS: &[&str] = &[
    "Application error: a client-side exception has occurred",
    "Minified React error",
    "ChunkLoadError",
    "Something went wrong",
    "Uncaught TypeError",
];

pub const CONTENT_SAMPLE_CHARS: usize = 8000;
/// Salvaged text below this length (with no links) is a client error.
pub const MIN_SALVAGE_CHARS: usize = 100;

pub const SETTLE_SCRIPT: &str = r#"(() => {
  const spinner = document.querySelector('.loading, .loader, .spinner, [aria-busy="true"]');
  const root = document.querySelector('#root, #app, #__next, [data-reactroot]');
  return {
    spinner: !!spinner && spinner.offsetParent !== null,
    mounted: !root || root.children.length > 0
  };
})()"#;

pub const ERROR_COUNT_SCRIPT: &str = "(window.__sitescoreErrors || []).length";

pub const SALVAGE_SCRIPT: &str = r#"(() => ({
  text: document.body ? document.body.innerText : '',
  links: Array.from(document.querySelectorAll('a[href]')).map((a) => a.href)
}))()"#;

const DEGRADED_SUGGESTION: &str =
    "Ensure the page renders server-side or without client-side errors so crawlers see full content";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strategy {
    Render,
    Salvage,
    StaticRetry,
}

pub struct Step {
    pub strategy: Strategy,
    pub should_attempt: fn(&Attempt) -> bool,
}

/// Fallback chain after the static pass, evaluated in order until a step
/// produces an outcome.
pub const STEPS: &[Step] = &[
    Step {
        strategy: Strategy::Render,
        should_attempt: always,
    },
    Step {
        strategy: Strategy::Salvage,
        should_attempt: after_client_error,
    },
    Step {
        strategy: Strategy::StaticRetry,
        should_attempt: after_render_failure_with_links,
    },
];

fn always(_: &Attempt) -> bool {
    true
}

fn after_client_error(attempt: &Attempt) -> bool {
    attempt.client_error.is_some() && attempt.page.is_some()
}

fn after_render_failure_with_links(attempt: &Attempt) -> bool {
    attempt.render_error.is_some()
        && attempt.client_error.is_none()
        && !attempt.static_links.is_empty()
}

#[derive(Debug, Clone, Default)]
pub struct Salvage {
    pub text: String,
    pub links: Vec<String>,
}

#[derive(Debug, Clone)]
pub enum Outcome {
    Clean { html: String },
    Partial(Salvage),
    Fallback(StaticPage),
    ConnectionError(String),
    ClientError(String),
}

enum StepResult {
    Done(Outcome),
    Continue,
}

/// Everything learned about one URL so far.
#[derive(Default)]
pub struct Attempt {
    pub url: String,
    /// Normalized form of `url`, reported as the result URL.
    pub key: String,
    pub static_page: Option<StaticPage>,
    pub static_error: Option<String>,
    pub static_links: Vec<String>,
    pub seeded_links: Vec<String>,
    seeding_claimed: bool,
    pub render_error: Option<String>,
    pub client_error: Option<String>,
    page: Option<Box<dyn PageRenderer>>,
}

impl Attempt {
    pub fn new(url: &str) -> Self {
        Self {
            url: url.to_owned(),
            key: normalize_url(url),
            ..Self::default()
        }
    }

    fn base_url(&self) -> Option<Url> {
        self.static_page
            .as_ref()
            .map(|p| p.final_url.clone())
            .or_else(|| Url::parse(&self.url).ok())
    }

    /// Decides which outcome a finished chain falls back to.
    fn exhausted(&self) -> Outcome {
        if let Some(message) = &self.client_error {
            return Outcome::ClientError(message.clone());
        }
        let message = self
            .render_error
            .clone()
            .or_else(|| self.static_error.clone())
            .unwrap_or_else(|| "no content could be retrieved".to_owned());
        Outcome::ConnectionError(message)
    }
}

/// Resolves one URL into a [`PageResult`] through a static pass, a rendered
/// pass and the degraded fallbacks.
pub struct ExtractEngine {
    fetcher: StaticFetcher,
    prober: VariantProber<Arc<dyn UrlProbe>>,
    timeouts: TimeoutSettings,
    rules: ScoringRules,
}

impl ExtractEngine {
    pub fn new(settings: &Settings) -> anyhow::Result<Self> {
        let probe: Arc<dyn UrlProbe> = Arc::new(HttpProbe::new(settings.timeouts.probe())?);
        Self::with_probe(settings, probe)
    }

    pub fn with_probe(settings: &Settings, probe: Arc<dyn UrlProbe>) -> anyhow::Result<Self> {
        Ok(Self {
            fetcher: StaticFetcher::new(settings.timeouts.http())?,
            prober: VariantProber::new(probe),
            timeouts: settings.timeouts,
            rules: settings.scoring.clone(),
        })
    }

    pub fn prober(&self) -> &VariantProber<Arc<dyn UrlProbe>> {
        &self.prober
    }

    /// Never fails: every outcome is a `PageResult` carrying a score or an
    /// error kind.
    pub async fn extract(
        &self,
        url: &str,
        browser: &dyn BrowserHandle,
        ctx: &CrawlContext,
    ) -> PageResult {
        let mut attempt = Attempt::new(url);
        self.static_pass(&mut attempt, ctx).await;

        let mut outcome = None;
        for step in STEPS {
            if !(step.should_attempt)(&attempt) {
                continue;
            }
            let result = match step.strategy {
                Strategy::Render => self.render(&mut attempt, browser).await,
                Strategy::Salvage => self.salvage(&mut attempt, ctx).await,
                Strategy::StaticRetry => self.static_retry(&mut attempt).await,
            };
            if let StepResult::Done(done) = result {
                outcome = Some(done);
                break;
            }
        }

        if let Some(page) = attempt.page.take()
            && let Err(err) = page.close().await
        {
            tracing::debug!(url, ?err, "page close failed");
        }

        let outcome = outcome.unwrap_or_else(|| attempt.exhausted());
        // Links of an unreachable page are never followed.
        if attempt.seeding_claimed && matches!(outcome, Outcome::ConnectionError(_)) {
            ctx.release_section_seeding();
        }
        self.build_result(&attempt, outcome, ctx)
    }

    async fn static_pass(&self, attempt: &mut Attempt, ctx: &CrawlContext) {
        match self.fetcher.get(&attempt.url).await {
            Ok(page) => {
                if page.is_success() {
                    let document = Html::parse_document(&page.html);
                    let links = same_site_links(&document, &page.final_url, ctx, &["a[href]"]);
                    let mut observed = vec![page.final_url.to_string()];
                    observed.extend(links.iter().cloned());
                    let belief = ctx.observe_language(&observed);
                    attempt.static_links = prune_untranslated(links, &belief, ctx);
                } else {
                    tracing::debug!(url = %attempt.url, status = page.status, "static pass returned error status");
                    attempt.static_error = Some(format!("HTTP {}", page.status));
                }
                attempt.static_page = Some(page);
            }
            Err(err) => {
                tracing::debug!(url = %attempt.url, ?err, "static pass failed");
                attempt.static_error = Some(format!("{err:#}"));
            }
        }

        if attempt.static_links.is_empty() && ctx.claim_section_seeding() {
            attempt.seeding_claimed = true;
            attempt.seeded_links = self.seed_common_sections(ctx).await;
        }
    }

    async fn seed_common_sections(&self, ctx: &CrawlContext) -> Vec<String> {
        let mut found = Vec::new();
        for path in COMMON_SECTION_PATHS {
            if let Some(url) = self.prober.resolve_first_working(ctx, path).await {
                found.push(normalize_url(&url));
            }
        }
        tracing::info!(site_id = ctx.site_id(), seeded = found.len(), "seeded frontier from common sections");
        found
    }

    fn navigation_waits(&self) -> [NavigationWait; 3] {
        [
            NavigationWait::NetworkIdle,
            NavigationWait::DomContentLoaded,
            NavigationWait::Timed(self.timeouts.settle_max()),
        ]
    }

    async fn render(&self, attempt: &mut Attempt, browser: &dyn BrowserHandle) -> StepResult {
        let page = match browser.new_page().await {
            Ok(page) => page,
            Err(err) => {
                attempt.render_error = Some(format!("{err:#}"));
                return StepResult::Continue;
            }
        };
        let page = attempt.page.insert(page);

        let mut navigation_error = None;
        for wait in self.navigation_waits() {
            match page
                .navigate(&attempt.url, wait, self.timeouts.navigation())
                .await
            {
                Ok(()) => {
                    navigation_error = None;
                    break;
                }
                Err(err) => {
                    tracing::debug!(url = %attempt.url, ?wait, ?err, "navigation strategy failed");
                    navigation_error = Some(format!("{err:#}"));
                }
            }
        }
        if let Some(message) = navigation_error {
            tracing::warn!(url = %attempt.url, error = %message, "rendering failed");
            attempt.render_error = Some(message);
            return StepResult::Continue;
        }

        settle(&**page, &self.timeouts).await;

        let script_errors = page
            .evaluate(ERROR_COUNT_SCRIPT)
            .await
            .ok()
            .and_then(|v| v.as_u64())
            .unwrap_or(0);

        let html = match page.content().await {
            Ok(html) => html,
            Err(err) => {
                attempt.render_error = Some(format!("{err:#}"));
                return StepResult::Continue;
            }
        };

        if script_errors > 0 {
            attempt.client_error = Some(format!("{script_errors} client-side script error(s)"));
            return StepResult::Continue;
        }
        if let Some(marker) = crash_marker(&html) {
            attempt.client_error = Some(format!("app crash marker found: {marker}"));
            return StepResult::Continue;
        }

        StepResult::Done(Outcome::Clean { html })
    }

    async fn salvage(&self, attempt: &mut Attempt, ctx: &CrawlContext) -> StepResult {
        let Some(page) = attempt.page.as_ref() else {
            return StepResult::Continue;
        };

        let value = match page.evaluate(SALVAGE_SCRIPT).await {
            Ok(value) => value,
            Err(err) => {
                tracing::debug!(url = %attempt.url, ?err, "partial extraction script failed");
                serde_json::Value::Null
            }
        };
        let text = value
            .get("text")
            .and_then(|v| v.as_str())
            .map(html::collapse_whitespace)
            .unwrap_or_default();

        let belief = ctx.language_belief();
        let mut seen = std::collections::HashSet::new();
        let links = value
            .get("links")
            .and_then(|v| v.as_array())
            .into_iter()
            .flatten()
            .filter_map(|v| v.as_str())
            .filter_map(|href| Url::parse(href).ok())
            .filter(|url| matches!(url.scheme(), "http" | "https") && ctx.is_same_site(url))
            .map(|url| normalize_url(url.as_str()))
            .filter(|url| seen.insert(url.clone()))
            .collect::<Vec<_>>();
        let links = prune_untranslated(links, &belief, ctx);

        if text.chars().count() >= MIN_SALVAGE_CHARS || !links.is_empty() {
            tracing::info!(url = %attempt.url, chars = text.len(), links = links.len(), "salvaged partial content");
            return StepResult::Done(Outcome::Partial(Salvage { text, links }));
        }
        StepResult::Continue
    }

    async fn static_retry(&self, attempt: &mut Attempt) -> StepResult {
        match self.fetcher.get_with_fallback_agent(&attempt.url).await {
            Ok(page) if page.is_success() => {
                let document = Html::parse_document(&page.html);
                let text = html::visible_text(&document, html::NON_CONTENT_TAGS);
                if text.is_empty() && attempt.static_links.is_empty() {
                    return StepResult::Continue;
                }
                tracing::info!(url = %attempt.url, "static fallback succeeded after render failure");
                StepResult::Done(Outcome::Fallback(page))
            }
            Ok(page) => {
                tracing::debug!(url = %attempt.url, status = page.status, "static fallback returned error status");
                StepResult::Continue
            }
            Err(err) => {
                tracing::debug!(url = %attempt.url, ?err, "static fallback failed");
                StepResult::Continue
            }
        }
    }

    fn build_result(&self, attempt: &Attempt, outcome: Outcome, ctx: &CrawlContext) -> PageResult {
        let status = attempt.static_page.as_ref().map(|p| p.status);
        let discovered = union_links([attempt.static_links.clone(), attempt.seeded_links.clone()]);

        let mut result = match outcome {
            Outcome::Clean { html } => {
                let document = Html::parse_document(&html);
                let base = attempt.base_url();
                let dom_links = base
                    .map(|base| {
                        let mut selectors = vec!["a[href]"];
                        selectors.extend_from_slice(html::NAVIGATION_LINK_SELECTORS);
                        same_site_links(&document, &base, ctx, &selectors)
                    })
                    .unwrap_or_default();
                let belief = ctx.observe_language(&dom_links);
                let links = prune_untranslated(union_links([discovered, dom_links]), &belief, ctx);

                let scored = scorer::score_document(&document, &self.rules);
                let text = html::visible_text(&document, html::NON_CONTENT_TAGS);
                let mut result = page_from_signals(&attempt.key, &scored.signals, &text);
                result.score = Some(scored.score);
                result.issues = scored.issues;
                result.suggestions = scored.suggestions;
                result.internal_links = links;
                result
            }
            Outcome::Partial(salvage) => {
                let mut result = PageResult::failed(
                    &attempt.key,
                    ErrorKind::PartialSuccess,
                    attempt
                        .client_error
                        .clone()
                        .unwrap_or_else(|| "client-side error".to_owned()),
                );
                result.word_count = salvage.text.split_whitespace().count();
                result.content_sample = html::truncate_chars(&salvage.text, CONTENT_SAMPLE_CHARS);
                result.score = Some(self.rules.degraded_floor_score);
                result.suggestions = vec![DEGRADED_SUGGESTION.to_owned()];
                result.internal_links = union_links([discovered, salvage.links]);
                result
            }
            Outcome::Fallback(page) => {
                let document = Html::parse_document(&page.html);
                let belief = ctx.language_belief();
                let page_links = prune_untranslated(
                    same_site_links(&document, &page.final_url, ctx, &["a[href]"]),
                    &belief,
                    ctx,
                );
                let scored = scorer::score_document(&document, &self.rules);
                let text = html::visible_text(&document, html::NON_CONTENT_TAGS);
                let mut result = page_from_signals(&attempt.key, &scored.signals, &text);
                result.error_kind = Some(ErrorKind::FallbackSuccess);
                result.score = Some(self.rules.degraded_floor_score);
                result.issues = scored.issues;
                if let Some(message) = &attempt.render_error {
                    result
                        .issues
                        .push(Issue::technical(format!("Rendering failed: {message}")));
                }
                result.suggestions = scored.suggestions;
                result.suggestions.push(DEGRADED_SUGGESTION.to_owned());
                result.internal_links = union_links([discovered, page_links]);
                result.status = Some(page.status);
                result
            }
            Outcome::ClientError(message) => {
                let mut result = PageResult::failed(&attempt.key, ErrorKind::ClientError, message);
                result.internal_links = discovered;
                result
            }
            Outcome::ConnectionError(message) => {
                tracing::warn!(url = %attempt.url, error = %message, "page could not be retrieved");
                PageResult::failed(&attempt.key, ErrorKind::ConnectionError, message)
            }
        };

        if result.status.is_none() {
            result.status = status;
        }
        result.fetched_at = Utc::now();
        result
    }
}

fn page_from_signals(url: &str, signals: &PageSignals, text: &str) -> PageResult {
    PageResult {
        url: url.to_owned(),
        title: signals.title.clone(),
        meta_description: signals.meta_description.clone(),
        headings: signals.headings.clone(),
        word_count: signals.word_count,
        issues: Vec::new(),
        suggestions: Vec::new(),
        score: None,
        internal_links: Vec::new(),
        error_kind: None,
        content_sample: html::truncate_chars(text, CONTENT_SAMPLE_CHARS),
        has_structured_data: signals.has_structured_data,
        status: None,
        fetched_at: Utc::now(),
    }
}

pub fn crash_marker(html: &str) -> Option<&'static str> {
    CRASH_MARKERS.iter().copied().find(|marker| html.contains(marker))
}

/// Best-effort wait for spinners to disappear and the app root to mount.
async fn settle(page: &dyn PageRenderer, timeouts: &TimeoutSettings) {
    let poll = async {
        loop {
            match page.evaluate(SETTLE_SCRIPT).await {
                Ok(value) if value.is_object() => {
                    let spinner = value.get("spinner").and_then(|v| v.as_bool()).unwrap_or(false);
                    let mounted = value.get("mounted").and_then(|v| v.as_bool()).unwrap_or(true);
                    if !spinner && mounted {
                        return;
                    }
                }
                _ => {
                    tokio::time::sleep(timeouts.settle_min()).await;
                    return;
                }
            }
            tokio::time::sleep(std::time::Duration::from_millis(250)).await;
        }
    };
    if tokio::time::timeout(timeouts.settle_max(), poll).await.is_err() {
        tracing::debug!("content settle wait elapsed");
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn attempt_with(
        render_error: Option<&str>,
        client_error: Option<&str>,
        static_links: &[&str],
    ) -> Attempt {
        Attempt {
            render_error: render_error.map(str::to_owned),
            client_error: client_error.map(str::to_owned),
            static_links: static_links.iter().map(|s| (*s).to_owned()).collect(),
            ..Attempt::new("https://example.com/")
        }
    }

    fn planned(attempt: &Attempt) -> Vec<Strategy> {
        STEPS
            .iter()
            .filter(|step| (step.should_attempt)(attempt))
            .map(|step| step.strategy)
            .collect()
    }

    #[test]
    fn render_is_always_attempted_first() {
        let attempt = Attempt::new("https://example.com/");
        assert_eq!(planned(&attempt), vec![Strategy::Render]);
        assert_eq!(STEPS[0].strategy, Strategy::Render);
    }

    #[test]
    fn static_retry_requires_render_failure_and_static_links() {
        let attempt = attempt_with(Some("timeout"), None, &["https://example.com/a"]);
        assert_eq!(planned(&attempt), vec![Strategy::Render, Strategy::StaticRetry]);

        let attempt = attempt_with(Some("timeout"), None, &[]);
        assert_eq!(planned(&attempt), vec![Strategy::Render]);
    }

    #[test]
    fn salvage_requires_an_open_page() {
        let attempt = attempt_with(None, Some("crash"), &["https://example.com/a"]);
        assert_eq!(planned(&attempt), vec![Strategy::Render]);
    }

    #[test]
    fn exhausted_chain_prefers_client_error() {
        let attempt = attempt_with(Some("timeout"), Some("crash"), &[]);
        assert!(matches!(attempt.exhausted(), Outcome::ClientError(m) if m == "crash"));

        let attempt = attempt_with(Some("timeout"), None, &[]);
        assert!(matches!(attempt.exhausted(), Outcome::ConnectionError(m) if m == "timeout"));

        let attempt = Attempt {
            static_error: Some("HTTP 503".to_owned()),
            ..Attempt::new("https://example.com/")
        };
        assert!(matches!(attempt.exhausted(), Outcome::ConnectionError(m) if m == "HTTP 503"));
    }

    #[test]
    fn crash_markers_are_detected() {
        assert_eq!(
            crash_marker("<div>Application error: a client-side exception has occurred</div>"),
            Some("Application error: a client-side exception has occurred")
        );
        assert_eq!(crash_marker("<h1>Welcome</h1>"), None);
    }
}
