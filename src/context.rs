use std::sync::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};

use url::Url;

use crate::language::{LanguageBelief, SiteLanguageResolver};
use crate::normalize::strip_www;

/// Per-job crawl state shared by the prober, the extractor and the crawler.
///
/// Created fresh for every job and never stored globally, so language
/// detection for one site cannot leak into another.
#[derive(Debug)]
pub struct CrawlContext {
    site_id: String,
    root_url: Url,
    language: Mutex<SiteLanguageResolver>,
    sections_seeded: AtomicBool,
}

impl CrawlContext {
    pub fn new(site_id: impl Into<String>, root_url: Url) -> Self {
        let mut resolver = SiteLanguageResolver::new();
        resolver.reset();
        Self {
            site_id: site_id.into(),
            root_url,
            language: Mutex::new(resolver),
            sections_seeded: AtomicBool::new(false),
        }
    }

    pub fn site_id(&self) -> &str {
        &self.site_id
    }

    pub fn root_url(&self) -> &Url {
        &self.root_url
    }

    pub fn language_belief(&self) -> LanguageBelief {
        self.with_language(|resolver| resolver.belief().clone())
    }

    pub fn observe_language<S: AsRef<str>>(&self, urls: &[S]) -> LanguageBelief {
        self.with_language(|resolver| resolver.observe(urls))
    }

    pub fn record_language(&self, code: &str) {
        self.with_language(|resolver| resolver.record_language(code));
    }

    pub fn build_language_path(&self, base_path: &str) -> String {
        self.with_language(|resolver| resolver.build_path(base_path))
    }

    /// True the first time it is called for this run.
    pub fn claim_section_seeding(&self) -> bool {
        !self.sections_seeded.swap(true, Ordering::SeqCst)
    }

    /// Gives the claim back when the seeding page could not be retrieved.
    pub fn release_section_seeding(&self) {
        self.sections_seeded.store(false, Ordering::SeqCst);
    }

    /// Same host (ignoring `www.`) and port as the crawl root.
    pub fn is_same_site(&self, url: &Url) -> bool {
        let (Some(root_host), Some(host)) = (self.root_url.host_str(), url.host_str()) else {
            return false;
        };
        strip_www(root_host).eq_ignore_ascii_case(strip_www(host))
            && self.root_url.port_or_known_default() == url.port_or_known_default()
    }

    pub fn is_site_root(&self, url: &Url) -> bool {
        self.is_same_site(url) && url.path().trim_matches('/').is_empty()
    }

    fn with_language<T>(&self, f: impl FnOnce(&mut SiteLanguageResolver) -> T) -> T {
        let mut guard = self
            .language
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        f(&mut guard)
    }
}
