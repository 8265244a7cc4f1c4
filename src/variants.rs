use std::collections::HashSet;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use reqwest::header::USER_AGENT;
use serde::Serialize;
use url::Url;

use crate::context::CrawlContext;
use crate::language::{LanguageBelief, language_of_url, strip_language};

/// Languages tried after the detected one, with their priorities.
const FALLBACK_LANGUAGES: &[(&str, u8)] = &[("ro", 1), ("en", 2), ("ru", 2)];
const NO_LANGUAGE_PRIORITY: u8 = 3;

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UrlVariant {
    pub url: String,
    pub priority: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub language: Option<String>,
}

/// Candidate absolute URLs for `path` on the site of `base_url`, tried in
/// ascending priority: detected language (0), `ro` (1), `en`/`ru` (2), no
/// language (3). Each language is combined with the original host and the
/// host with `www.` toggled.
pub fn variants(base_url: &Url, path: &str, belief: &LanguageBelief) -> Vec<UrlVariant> {
    let bare = strip_language(path);

    let mut languages: Vec<(Option<&str>, u8)> = Vec::new();
    if let Some(detected) = belief.primary_language.as_deref() {
        languages.push((Some(detected), 0));
    }
    for (code, priority) in FALLBACK_LANGUAGES {
        languages.push((Some(*code), *priority));
    }
    languages.push((None, NO_LANGUAGE_PRIORITY));

    let hosts = host_variants(base_url);

    let mut out = Vec::new();
    let mut seen = HashSet::new();
    for (language, priority) in languages {
        let candidate_path = match (language, bare.is_empty()) {
            (Some(code), true) => format!("/{code}"),
            (Some(code), false) => format!("/{code}/{bare}"),
            (None, _) => format!("/{bare}"),
        };
        for host in &hosts {
            let mut url = base_url.clone();
            if url.set_host(Some(host.as_str())).is_err() {
                continue;
            }
            url.set_path(&candidate_path);
            url.set_query(None);
            url.set_fragment(None);
            let url = url.to_string();
            if seen.insert(url.clone()) {
                out.push(UrlVariant {
                    url,
                    priority,
                    language: language.map(str::to_owned),
                });
            }
        }
    }

    out.sort_by_key(|variant| variant.priority);
    out
}

fn host_variants(base_url: &Url) -> Vec<String> {
    let Some(host) = base_url.host_str() else {
        return Vec::new();
    };
    let mut hosts = vec![host.to_owned()];
    // IP literals and single-label hosts have no www form.
    if base_url.domain().is_some_and(|domain| domain.contains('.')) {
        let toggled = match host.strip_prefix("www.") {
            Some(bare) => bare.to_owned(),
            None => format!("www.{host}"),
        };
        hosts.push(toggled);
    }
    hosts
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ProbeOutcome {
    pub exists: bool,
    pub status: Option<u16>,
}

impl ProbeOutcome {
    pub fn from_status(status: u16) -> Self {
        Self {
            exists: (200..400).contains(&status),
            status: Some(status),
        }
    }

    pub fn unreachable() -> Self {
        Self {
            exists: false,
            status: None,
        }
    }
}

#[async_trait]
pub trait UrlProbe: Send + Sync {
    async fn probe(&self, url: &str) -> ProbeOutcome;
}

/// HEAD-based existence check. Redirects are not followed, so a 3xx counts as
/// existing.
#[derive(Debug, Clone)]
pub struct HttpProbe {
    client: reqwest::Client,
}

impl HttpProbe {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::none())
            .build()
            .context("build url probe http client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl UrlProbe for HttpProbe {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        match self
            .client
            .head(url)
            .header(USER_AGENT, crate::fetch::USER_AGENT_VALUE)
            .send()
            .await
        {
            Ok(response) => ProbeOutcome::from_status(response.status().as_u16()),
            Err(err) => {
                tracing::debug!(url, ?err, "variant probe failed");
                ProbeOutcome::unreachable()
            }
        }
    }
}

#[async_trait]
impl<T: UrlProbe + ?Sized> UrlProbe for Arc<T> {
    async fn probe(&self, url: &str) -> ProbeOutcome {
        (**self).probe(url).await
    }
}

pub struct VariantProber<P> {
    probe: P,
}

impl<P: UrlProbe> VariantProber<P> {
    pub fn new(probe: P) -> Self {
        Self { probe }
    }

    pub fn variants(&self, ctx: &CrawlContext, path: &str) -> Vec<UrlVariant> {
        variants(ctx.root_url(), path, &ctx.language_belief())
    }

    pub async fn probe(&self, ctx: &CrawlContext, candidate: &UrlVariant) -> ProbeOutcome {
        let outcome = self.probe.probe(&candidate.url).await;
        if outcome.exists {
            let language = candidate
                .language
                .as_deref()
                .or_else(|| language_of_url(&candidate.url));
            if let Some(language) = language {
                ctx.record_language(language);
            }
        }
        outcome
    }

    /// First candidate that responds, in priority order. Stops at the first
    /// success.
    pub async fn resolve_first_working(&self, ctx: &CrawlContext, path: &str) -> Option<String> {
        for candidate in self.variants(ctx, path) {
            let outcome = self.probe(ctx, &candidate).await;
            tracing::debug!(
                url = %candidate.url,
                priority = candidate.priority,
                exists = outcome.exists,
                status = ?outcome.status,
                "variant probe"
            );
            if outcome.exists {
                return Some(candidate.url);
            }
        }
        None
    }
}
