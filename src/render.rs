use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use async_trait::async_trait;
use chromiumoxide::Page;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{EnableParams, SetBlockedUrLsParams};
use chromiumoxide::cdp::browser_protocol::page::AddScriptToEvaluateOnNewDocumentParams;
use futures::StreamExt as _;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;

/// Collects uncaught script errors into `window.__sitescoreErrors` before any
/// page script runs.
pub const ERROR_HOOK_SCRIPT: &str = r#"(() => {
  window.__sitescoreErrors = [];
  window.addEventListener('error', (e) => window.__sitescoreErrors.push(String(e.message || e)));
  window.addEventListener('unhandledrejection', (e) => window.__sitescoreErrors.push(String(e.reason || 'unhandled rejection')));
})();"#;

/// URL patterns blocked in rendered pages (images, fonts, stylesheets, media).
const BLOCKED_RESOURCE_PATTERNS: &[&str] = &[
    "*.png", "*.jpg", "*.jpeg", "*.gif", "*.webp", "*.avif", "*.svg", "*.ico", "*.woff",
    "*.woff2", "*.ttf", "*.otf", "*.eot", "*.css", "*.mp4", "*.webm", "*.mp3", "*.ogg", "*.wav",
];

const POLL_INTERVAL: Duration = Duration::from_millis(250);
const IDLE_QUIET_POLLS: usize = 2;

/// How long navigation waits before the page counts as loaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NavigationWait {
    NetworkIdle,
    DomContentLoaded,
    Timed(Duration),
}

/// One open browser page.
#[async_trait]
pub trait PageRenderer: Send + Sync {
    async fn navigate(&self, url: &str, wait: NavigationWait, timeout: Duration)
    -> anyhow::Result<()>;
    async fn evaluate(&self, script: &str) -> anyhow::Result<serde_json::Value>;
    async fn content(&self) -> anyhow::Result<String>;
    async fn close(&self) -> anyhow::Result<()>;
}

/// A running browser shared by every fetch of one crawl run.
#[async_trait]
pub trait BrowserHandle: Send + Sync {
    async fn new_page(&self) -> anyhow::Result<Box<dyn PageRenderer>>;
    async fn close(&self) -> anyhow::Result<()>;
}

#[async_trait]
pub trait BrowserProvider: Send + Sync {
    async fn launch(&self) -> anyhow::Result<Arc<dyn BrowserHandle>>;
}

/// Headless Chromium over the DevTools protocol.
#[derive(Debug, Clone, Default)]
pub struct ChromiumProvider {
    pub executable: Option<std::path::PathBuf>,
}

impl ChromiumProvider {
    pub fn from_env() -> Self {
        Self {
            executable: std::env::var_os("SITESCORE_CHROME_BIN").map(Into::into),
        }
    }
}

#[async_trait]
impl BrowserProvider for ChromiumProvider {
    async fn launch(&self) -> anyhow::Result<Arc<dyn BrowserHandle>> {
        let mut builder = BrowserConfig::builder()
            .no_sandbox()
            .arg("--disable-gpu")
            .arg("--disable-dev-shm-usage")
            .arg(format!("--user-agent={}", crate::fetch::USER_AGENT_VALUE));
        if let Some(executable) = &self.executable {
            builder = builder.chrome_executable(executable);
        }
        let config = builder
            .build()
            .map_err(|err| anyhow::anyhow!("build browser config: {err}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("launch headless browser")?;
        let handler_task = tokio::spawn(async move { while handler.next().await.is_some() {} });

        tracing::info!("headless browser launched");
        Ok(Arc::new(ChromiumBrowser {
            browser: Mutex::new(Some(browser)),
            handler_task,
        }))
    }
}

struct ChromiumBrowser {
    browser: Mutex<Option<Browser>>,
    handler_task: JoinHandle<()>,
}

#[async_trait]
impl BrowserHandle for ChromiumBrowser {
    async fn new_page(&self) -> anyhow::Result<Box<dyn PageRenderer>> {
        let page = {
            let guard = self.browser.lock().await;
            let browser = guard
                .as_ref()
                .ok_or_else(|| anyhow::anyhow!("browser is already closed"))?;
            browser.new_page("about:blank").await.context("open page")?
        };

        page.execute(AddScriptToEvaluateOnNewDocumentParams::new(ERROR_HOOK_SCRIPT))
            .await
            .context("install error hook")?;

        let blocked = BLOCKED_RESOURCE_PATTERNS
            .iter()
            .map(|p| (*p).to_owned())
            .collect::<Vec<_>>();
        let blocking = async {
            page.execute(EnableParams::default()).await?;
            page.execute(SetBlockedUrLsParams::new(blocked)).await?;
            anyhow::Ok(())
        };
        if let Err(err) = blocking.await {
            tracing::debug!(?err, "resource blocking unavailable; rendering with all resources");
        }

        Ok(Box::new(ChromiumPage { page }))
    }

    async fn close(&self) -> anyhow::Result<()> {
        let browser = self.browser.lock().await.take();
        if let Some(mut browser) = browser {
            browser.close().await.context("close browser")?;
            let _ = browser.wait().await;
        }
        self.handler_task.abort();
        tracing::info!("headless browser closed");
        Ok(())
    }
}

struct ChromiumPage {
    page: Page,
}

impl ChromiumPage {
    async fn poll_until(&self, script: &str, done: impl Fn(&serde_json::Value) -> bool) {
        loop {
            match self.evaluate(script).await {
                Ok(value) if done(&value) => return,
                Ok(_) => {}
                Err(err) => tracing::debug!(?err, "navigation poll failed"),
            }
            tokio::time::sleep(POLL_INTERVAL).await;
        }
    }
}

#[async_trait]
impl PageRenderer for ChromiumPage {
    async fn navigate(
        &self,
        url: &str,
        wait: NavigationWait,
        timeout: Duration,
    ) -> anyhow::Result<()> {
        match wait {
            NavigationWait::NetworkIdle => {
                tokio::time::timeout(timeout, async {
                    self.page.goto(url).await?;
                    self.page.wait_for_navigation().await?;
                    let mut last = None;
                    let mut quiet = 0_usize;
                    while quiet < IDLE_QUIET_POLLS {
                        let count = self
                            .evaluate("performance.getEntriesByType('resource').length")
                            .await?;
                        if last.as_ref() == Some(&count) {
                            quiet += 1;
                        } else {
                            quiet = 0;
                            last = Some(count);
                        }
                        tokio::time::sleep(POLL_INTERVAL).await;
                    }
                    anyhow::Ok(())
                })
                .await
                .with_context(|| format!("network idle timeout for {url}"))?
            }
            NavigationWait::DomContentLoaded => {
                tokio::time::timeout(timeout, async {
                    let target = serde_json::to_string(url)?;
                    self.evaluate(&format!("window.location.href = {target}"))
                        .await?;
                    self.poll_until(
                        "location.href !== 'about:blank' && document.readyState !== 'loading'",
                        |v| v.as_bool() == Some(true),
                    )
                    .await;
                    anyhow::Ok(())
                })
                .await
                .with_context(|| format!("dom content loaded timeout for {url}"))?
            }
            NavigationWait::Timed(delay) => {
                if tokio::time::timeout(delay.min(timeout), self.page.goto(url))
                    .await
                    .is_err()
                {
                    tracing::debug!(url, "timed navigation elapsed before load");
                }
                let href = self.evaluate("location.href").await?;
                if href.as_str().is_none_or(|h| h == "about:blank") {
                    anyhow::bail!("navigation to {url} did not start");
                }
                Ok(())
            }
        }
    }

    async fn evaluate(&self, script: &str) -> anyhow::Result<serde_json::Value> {
        let result = self
            .page
            .evaluate_expression(script)
            .await
            .context("evaluate script")?;
        Ok(result.value().cloned().unwrap_or(serde_json::Value::Null))
    }

    async fn content(&self) -> anyhow::Result<String> {
        self.page.content().await.context("read page content")
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.page.clone().close().await.context("close page")
    }
}
