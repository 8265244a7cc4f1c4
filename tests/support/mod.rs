#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, mpsc};
use std::thread;
use std::time::Duration;

use async_trait::async_trait;
use sitescore::config::{Settings, TimeoutSettings};
use sitescore::extract::{ERROR_COUNT_SCRIPT, SALVAGE_SCRIPT, SETTLE_SCRIPT};
use sitescore::render::{BrowserHandle, BrowserProvider, NavigationWait, PageRenderer};

pub const CRASH_TEXT: &str = "Application error: a client-side exception has occurred";

pub fn words(n: usize) -> String {
    (0..n).map(|i| format!("word{i}")).collect::<Vec<_>>().join(" ")
}

/// Title 43 chars, meta description 127 chars, one H1, 400 words, no JSON-LD.
pub fn scenario_a_page(extra_body: &str) -> String {
    format!(
        r#"<!doctype html>
<html>
  <head>
    <title>A practical guide to choosing running shoes</title>
    <meta name="description" content="Compare cushioning, drop and fit across popular running shoes so you can pick the right pair for your training plan and budget.">
  </head>
  <body>
    <h1>Running shoes</h1>
    <p>{}</p>
    {extra_body}
  </body>
</html>
"#,
        words(400)
    )
}

pub fn links_page(title: &str, hrefs: &[String]) -> String {
    let anchors = hrefs
        .iter()
        .map(|href| format!(r#"<a href="{href}">{href}</a>"#))
        .collect::<Vec<_>>()
        .join("\n");
    format!(
        "<!doctype html><html><head><title>{title}</title></head><body><h1>{title}</h1><p>{}</p>{anchors}</body></html>",
        words(50)
    )
}

/// Small timeouts so failing navigations and settle waits stay fast.
pub fn fast_settings() -> Settings {
    Settings {
        timeouts: TimeoutSettings {
            http_secs: 5,
            navigation_secs: 2,
            probe_secs: 2,
            settle_min_ms: 0,
            settle_max_ms: 50,
        },
        ..Settings::default()
    }
}

#[derive(Debug, Clone)]
pub enum Route {
    Html(String),
    Redirect(String),
    Status(u16),
}

/// Static site served over HTTP on 127.0.0.1. Unknown paths are 404.
pub struct SiteStub {
    pub base_url: String,
    shutdown_tx: Option<mpsc::Sender<()>>,
    handle: Option<thread::JoinHandle<()>>,
}

impl SiteStub {
    pub fn spawn(routes: Vec<(&str, Route)>) -> Self {
        let routes = routes
            .into_iter()
            .map(|(path, route)| (path.to_owned(), route))
            .collect::<HashMap<_, _>>();
        let server = tiny_http::Server::http("127.0.0.1:0").expect("start site stub server");
        let base_url = format!("http://{}", server.server_addr());
        let (shutdown_tx, shutdown_rx) = mpsc::channel::<()>();

        let handle = thread::spawn(move || {
            loop {
                if shutdown_rx.try_recv().is_ok() {
                    break;
                }
                let request = match server.recv_timeout(Duration::from_millis(50)) {
                    Ok(Some(req)) => req,
                    Ok(None) => continue,
                    Err(_) => break,
                };

                let url = request.url().to_string();
                let path = url.split('?').next().unwrap_or(&url).to_owned();
                let response = match routes.get(&path) {
                    Some(Route::Html(body)) => {
                        let header = tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/html; charset=utf-8"[..],
                        )
                        .expect("build header");
                        tiny_http::Response::from_string(body.clone()).with_header(header)
                    }
                    Some(Route::Redirect(location)) => {
                        let header =
                            tiny_http::Header::from_bytes(&b"Location"[..], location.as_bytes())
                                .expect("build header");
                        tiny_http::Response::from_string("")
                            .with_status_code(302)
                            .with_header(header)
                    }
                    Some(Route::Status(code)) => {
                        let header = tiny_http::Header::from_bytes(
                            &b"Content-Type"[..],
                            &b"text/html; charset=utf-8"[..],
                        )
                        .expect("build header");
                        tiny_http::Response::from_string("<html><body>error</body></html>")
                            .with_status_code(*code)
                            .with_header(header)
                    }
                    None => tiny_http::Response::from_string("not found").with_status_code(404),
                };
                let _ = request.respond(response);
            }
        });

        Self {
            base_url,
            shutdown_tx: Some(shutdown_tx),
            handle: Some(handle),
        }
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url)
    }
}

impl Drop for SiteStub {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
        if let Some(handle) = self.handle.take() {
            let _ = handle.join();
        }
    }
}

/// How the fake browser treats a path.
#[derive(Debug, Clone)]
pub enum Behavior {
    /// Navigation succeeds and the DOM is this HTML.
    Render(String),
    /// Every navigation strategy fails.
    Timeout,
    /// The app crashes; the salvage script sees `text` and `links`.
    Crash { text: String, links: Vec<String> },
}

#[derive(Debug, Default)]
pub struct BrowserStats {
    pub launches: AtomicUsize,
    pub closes: AtomicUsize,
    pub open_pages: AtomicUsize,
    pub peak_pages: AtomicUsize,
    pub pages_opened: AtomicUsize,
    pub navigated: Mutex<Vec<String>>,
}

impl BrowserStats {
    pub fn peak(&self) -> usize {
        self.peak_pages.load(Ordering::SeqCst)
    }

    pub fn navigated(&self) -> Vec<String> {
        self.navigated.lock().expect("lock navigations").clone()
    }
}

/// Canned-HTML browser keyed by URL path.
#[derive(Clone)]
pub struct FakeBrowser {
    behaviors: Arc<HashMap<String, Behavior>>,
    fallback: Behavior,
    nav_delay: Duration,
    pub stats: Arc<BrowserStats>,
}

impl FakeBrowser {
    pub fn new(fallback: Behavior) -> Self {
        Self {
            behaviors: Arc::new(HashMap::new()),
            fallback,
            nav_delay: Duration::from_millis(10),
            stats: Arc::new(BrowserStats::default()),
        }
    }

    pub fn with(mut self, path: &str, behavior: Behavior) -> Self {
        Arc::make_mut(&mut self.behaviors).insert(path.to_owned(), behavior);
        self
    }

    fn behavior_for(&self, url: &str) -> Behavior {
        let path = url::Url::parse(url)
            .map(|u| u.path().to_owned())
            .unwrap_or_default();
        self.behaviors
            .get(&path)
            .cloned()
            .unwrap_or_else(|| self.fallback.clone())
    }
}

#[async_trait]
impl BrowserProvider for FakeBrowser {
    async fn launch(&self) -> anyhow::Result<Arc<dyn BrowserHandle>> {
        self.stats.launches.fetch_add(1, Ordering::SeqCst);
        Ok(Arc::new(self.clone()))
    }
}

#[async_trait]
impl BrowserHandle for FakeBrowser {
    async fn new_page(&self) -> anyhow::Result<Box<dyn PageRenderer>> {
        let open = self.stats.open_pages.fetch_add(1, Ordering::SeqCst) + 1;
        self.stats.peak_pages.fetch_max(open, Ordering::SeqCst);
        self.stats.pages_opened.fetch_add(1, Ordering::SeqCst);
        Ok(Box::new(FakePage {
            browser: self.clone(),
            current: Mutex::new(None),
        }))
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.stats.closes.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

struct FakePage {
    browser: FakeBrowser,
    current: Mutex<Option<Behavior>>,
}

impl FakePage {
    fn current(&self) -> Option<Behavior> {
        self.current.lock().expect("lock fake page").clone()
    }
}

#[async_trait]
impl PageRenderer for FakePage {
    async fn navigate(
        &self,
        url: &str,
        _wait: NavigationWait,
        _timeout: Duration,
    ) -> anyhow::Result<()> {
        tokio::time::sleep(self.browser.nav_delay).await;
        self.browser
            .stats
            .navigated
            .lock()
            .expect("lock navigations")
            .push(url.to_owned());
        let behavior = self.browser.behavior_for(url);
        if matches!(behavior, Behavior::Timeout) {
            anyhow::bail!("navigation timeout for {url}");
        }
        *self.current.lock().expect("lock fake page") = Some(behavior);
        Ok(())
    }

    async fn evaluate(&self, script: &str) -> anyhow::Result<serde_json::Value> {
        let value = match (script, self.current()) {
            (SETTLE_SCRIPT, _) => serde_json::json!({ "spinner": false, "mounted": true }),
            (ERROR_COUNT_SCRIPT, _) => serde_json::json!(0),
            (SALVAGE_SCRIPT, Some(Behavior::Crash { text, links })) => {
                serde_json::json!({ "text": text, "links": links })
            }
            _ => serde_json::Value::Null,
        };
        Ok(value)
    }

    async fn content(&self) -> anyhow::Result<String> {
        match self.current() {
            Some(Behavior::Render(html)) => Ok(html),
            Some(Behavior::Crash { .. }) => Ok(format!(
                "<html><body><div id=\"__next\"><h2>{CRASH_TEXT}</h2></div></body></html>"
            )),
            Some(Behavior::Timeout) | None => anyhow::bail!("page has no content"),
        }
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.browser.stats.open_pages.fetch_sub(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Provider whose browser never starts.
pub struct BrokenProvider;

#[async_trait]
impl BrowserProvider for BrokenProvider {
    async fn launch(&self) -> anyhow::Result<Arc<dyn BrowserHandle>> {
        anyhow::bail!("failed to launch headless browser: executable not found")
    }
}
