use std::path::{Path, PathBuf};

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::Utc;
use sha2::{Digest as _, Sha256};
use tokio::fs;

use crate::app::model::{SiteRecord, SiteState, validate_site_id};
use crate::formats::{AggregatedReport, DeepAnalysisReport, ScoredPage};

#[async_trait]
pub trait SiteStore: Send + Sync {
    async fn get_site(&self, site_id: &str) -> anyhow::Result<Option<SiteRecord>>;
    async fn put_site(&self, site: &SiteRecord) -> anyhow::Result<()>;
    async fn set_site_state(
        &self,
        site_id: &str,
        state: SiteState,
        message: Option<String>,
    ) -> anyhow::Result<()>;

    async fn clear_pages(&self, site_id: &str) -> anyhow::Result<()>;
    async fn insert_pages(&self, site_id: &str, pages: &[ScoredPage]) -> anyhow::Result<()>;
    async fn insert_page(&self, site_id: &str, page: &ScoredPage) -> anyhow::Result<()>;
    async fn list_pages(&self, site_id: &str) -> anyhow::Result<Vec<ScoredPage>>;

    async fn save_report(&self, site_id: &str, report: &AggregatedReport) -> anyhow::Result<()>;
    async fn get_report(&self, site_id: &str) -> anyhow::Result<Option<AggregatedReport>>;
    async fn save_deep_analysis(
        &self,
        site_id: &str,
        report: &DeepAnalysisReport,
    ) -> anyhow::Result<()>;
    async fn get_deep_analysis(&self, site_id: &str)
    -> anyhow::Result<Option<DeepAnalysisReport>>;
}

/// One directory per site: `site.json`, `report.json`, `deep_analysis.json`
/// and `pages/<page id>.json`.
#[derive(Debug, Clone)]
pub struct LocalFsSiteStore {
    base_dir: PathBuf,
}

impl LocalFsSiteStore {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn site_dir(&self, site_id: &str) -> anyhow::Result<PathBuf> {
        validate_site_id(site_id)?;
        Ok(self.base_dir.join("sites").join(site_id))
    }

    fn site_json_path(&self, site_id: &str) -> anyhow::Result<PathBuf> {
        Ok(self.site_dir(site_id)?.join("site.json"))
    }

    fn pages_dir(&self, site_id: &str) -> anyhow::Result<PathBuf> {
        Ok(self.site_dir(site_id)?.join("pages"))
    }

    fn page_json_path(&self, site_id: &str, url: &str) -> anyhow::Result<PathBuf> {
        Ok(self
            .pages_dir(site_id)?
            .join(format!("{}.json", page_id_from_normalized_url(url))))
    }

    fn report_json_path(&self, site_id: &str) -> anyhow::Result<PathBuf> {
        Ok(self.site_dir(site_id)?.join("report.json"))
    }

    fn deep_analysis_json_path(&self, site_id: &str) -> anyhow::Result<PathBuf> {
        Ok(self.site_dir(site_id)?.join("deep_analysis.json"))
    }
}

#[async_trait]
impl SiteStore for LocalFsSiteStore {
    async fn get_site(&self, site_id: &str) -> anyhow::Result<Option<SiteRecord>> {
        let path = self.site_json_path(site_id)?;
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }

    async fn put_site(&self, site: &SiteRecord) -> anyhow::Result<()> {
        write_json_atomic(&self.site_json_path(&site.site_id)?, site)
            .await
            .context("write site.json")
    }

    async fn set_site_state(
        &self,
        site_id: &str,
        state: SiteState,
        message: Option<String>,
    ) -> anyhow::Result<()> {
        let mut site = self
            .get_site(site_id)
            .await?
            .ok_or_else(|| anyhow::anyhow!("site not found: {site_id}"))?;
        site.state = state;
        site.message = message;
        site.updated_at = Utc::now();
        if state == SiteState::Completed {
            site.crawled_at = Some(site.updated_at);
        }
        self.put_site(&site).await
    }

    async fn clear_pages(&self, site_id: &str) -> anyhow::Result<()> {
        let dir = self.pages_dir(site_id)?;
        match fs::remove_dir_all(&dir).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => {
                Err(err).with_context(|| format!("remove pages dir: {}", dir.display()))
            }
        }
    }

    async fn insert_pages(&self, site_id: &str, pages: &[ScoredPage]) -> anyhow::Result<()> {
        for page in pages {
            self.insert_page(site_id, page).await?;
        }
        Ok(())
    }

    async fn insert_page(&self, site_id: &str, page: &ScoredPage) -> anyhow::Result<()> {
        let path = self.page_json_path(site_id, &page.page.url)?;
        write_json_atomic(&path, page)
            .await
            .with_context(|| format!("write page: {}", page.page.url))
    }

    async fn list_pages(&self, site_id: &str) -> anyhow::Result<Vec<ScoredPage>> {
        let dir = self.pages_dir(site_id)?;
        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(err) => {
                return Err(err).with_context(|| format!("read pages dir: {}", dir.display()));
            }
        };

        let mut pages = Vec::new();
        while let Some(entry) = entries.next_entry().await.context("read pages dir entry")? {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            if let Some(page) = read_json::<ScoredPage>(&path)
                .await
                .with_context(|| format!("read: {}", path.display()))?
            {
                pages.push(page);
            }
        }
        pages.sort_by(|a, b| a.page.url.cmp(&b.page.url));
        Ok(pages)
    }

    async fn save_report(&self, site_id: &str, report: &AggregatedReport) -> anyhow::Result<()> {
        write_json_atomic(&self.report_json_path(site_id)?, report)
            .await
            .context("write report.json")
    }

    async fn get_report(&self, site_id: &str) -> anyhow::Result<Option<AggregatedReport>> {
        let path = self.report_json_path(site_id)?;
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }

    async fn save_deep_analysis(
        &self,
        site_id: &str,
        report: &DeepAnalysisReport,
    ) -> anyhow::Result<()> {
        write_json_atomic(&self.deep_analysis_json_path(site_id)?, report)
            .await
            .context("write deep_analysis.json")
    }

    async fn get_deep_analysis(
        &self,
        site_id: &str,
    ) -> anyhow::Result<Option<DeepAnalysisReport>> {
        let path = self.deep_analysis_json_path(site_id)?;
        read_json(&path)
            .await
            .with_context(|| format!("read: {}", path.display()))
    }
}

pub fn page_id_from_normalized_url(url: &str) -> String {
    let hash = Sha256::digest(url.as_bytes());
    format!("p_{}", hex::encode(&hash[..16]))
}

pub(crate) async fn read_json<T: serde::de::DeserializeOwned>(
    path: &Path,
) -> anyhow::Result<Option<T>> {
    let bytes = match fs::read(path).await {
        Ok(bytes) => bytes,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(None),
        Err(err) => return Err(err.into()),
    };
    let value = serde_json::from_slice(&bytes).context("parse json")?;
    Ok(Some(value))
}

pub(crate) async fn write_json_atomic<T: serde::Serialize>(
    path: &Path,
    value: &T,
) -> anyhow::Result<()> {
    let parent = path
        .parent()
        .ok_or_else(|| anyhow::anyhow!("path has no parent: {}", path.display()))?;
    fs::create_dir_all(parent)
        .await
        .with_context(|| format!("create parent dir: {}", parent.display()))?;

    let tmp_path = path.with_extension(format!("tmp.{}", uuid::Uuid::new_v4().simple()));
    let data = serde_json::to_vec_pretty(value).context("serialize json")?;
    fs::write(&tmp_path, &data)
        .await
        .with_context(|| format!("write tmp: {}", tmp_path.display()))?;
    fs::rename(&tmp_path, path)
        .await
        .with_context(|| format!("rename tmp to final: {}", path.display()))?;
    Ok(())
}
