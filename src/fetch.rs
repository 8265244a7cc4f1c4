use std::time::Duration;

use anyhow::Context as _;
use reqwest::header::{ACCEPT, CONTENT_TYPE, USER_AGENT};
use url::Url;

pub const USER_AGENT_VALUE: &str = "sitescore/0.1 (+https://github.com/sitescore/sitescore)";
/// Used for the last-resort retry after rendering fails.
pub const FALLBACK_USER_AGENT_VALUE: &str =
    "Mozilla/5.0 (compatible; sitescore-fallback/0.1; +https://github.com/sitescore/sitescore)";

const ACCEPT_HTML: &str = "text/html,application/xhtml+xml;q=0.9,*/*;q=0.8";
const MAX_REDIRECTS: usize = 5;

#[derive(Debug, Clone)]
pub struct StaticPage {
    pub final_url: Url,
    pub status: u16,
    pub html: String,
}

impl StaticPage {
    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Lightweight HTTP fetcher for link discovery and the static fallback.
#[derive(Debug, Clone)]
pub struct StaticFetcher {
    client: reqwest::Client,
}

impl StaticFetcher {
    pub fn new(timeout: Duration) -> anyhow::Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .redirect(reqwest::redirect::Policy::limited(MAX_REDIRECTS))
            .build()
            .context("build static fetch http client")?;
        Ok(Self { client })
    }

    pub async fn get(&self, url: &str) -> anyhow::Result<StaticPage> {
        self.get_as(url, USER_AGENT_VALUE).await
    }

    pub async fn get_with_fallback_agent(&self, url: &str) -> anyhow::Result<StaticPage> {
        self.get_as(url, FALLBACK_USER_AGENT_VALUE).await
    }

    async fn get_as(&self, url: &str, user_agent: &str) -> anyhow::Result<StaticPage> {
        let response = self
            .client
            .get(url)
            .header(USER_AGENT, user_agent)
            .header(ACCEPT, ACCEPT_HTML)
            .send()
            .await
            .with_context(|| format!("GET {url}"))?;

        let status = response.status().as_u16();
        let final_url = response.url().clone();

        if let Some(content_type) = response
            .headers()
            .get(CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
        {
            let content_type = content_type.to_ascii_lowercase();
            if !(content_type.starts_with("text/html")
                || content_type.starts_with("application/xhtml+xml"))
            {
                anyhow::bail!("GET {url}: not an html document ({content_type})");
            }
        }

        let html = response
            .text()
            .await
            .with_context(|| format!("read body of {url}"))?;

        Ok(StaticPage {
            final_url,
            status,
            html,
        })
    }
}
