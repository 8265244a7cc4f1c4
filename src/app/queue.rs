use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context as _;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::fs;
use tokio::sync::{OwnedSemaphorePermit, Semaphore};
use tokio::task::JoinHandle;

use crate::app::model::CrawlJob;
use crate::app::site_store::{read_json, write_json_atomic};

/// Bounds how many jobs run at once inside one process.
#[derive(Debug, Clone)]
pub struct InProcessQueue {
    semaphore: Arc<Semaphore>,
}

impl InProcessQueue {
    pub fn new(max_concurrency: usize) -> Self {
        let permits = max_concurrency.max(1);
        Self {
            semaphore: Arc::new(Semaphore::new(permits)),
        }
    }

    /// Waits for a free slot, then runs `fut` on it.
    pub async fn spawn<F>(&self, fut: F) -> anyhow::Result<JoinHandle<()>>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        Ok(self.reserve().await?.spawn(fut))
    }

    /// Waits for a free slot without starting anything yet.
    pub async fn reserve(&self) -> anyhow::Result<Reservation> {
        let permit = Arc::clone(&self.semaphore)
            .acquire_owned()
            .await
            .map_err(|_| anyhow::anyhow!("in-process queue semaphore is closed"))?;
        Ok(Reservation { permit })
    }

    pub fn available(&self) -> usize {
        self.semaphore.available_permits()
    }
}

/// A held slot of an [`InProcessQueue`]. Dropping it frees the slot.
#[derive(Debug)]
pub struct Reservation {
    permit: OwnedSemaphorePermit,
}

impl Reservation {
    pub fn spawn<F>(self, fut: F) -> JoinHandle<()>
    where
        F: Future<Output = ()> + Send + 'static,
    {
        let permit = self.permit;
        tokio::spawn(async move {
            let _permit = permit;
            fut.await;
        })
    }
}

/// A job taken off the durable queue; hand it back with `complete` or `fail`.
#[derive(Debug, Clone)]
pub struct ClaimedJob {
    pub job: CrawlJob,
    file_name: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FailedJob {
    pub job: CrawlJob,
    pub error: String,
    pub failed_at: DateTime<Utc>,
}

/// Durable, at-least-once job queue shared by worker processes.
#[async_trait]
pub trait JobQueue: Send + Sync {
    async fn enqueue(&self, job: &CrawlJob) -> anyhow::Result<()>;
    async fn claim(&self) -> anyhow::Result<Option<ClaimedJob>>;
    async fn complete(&self, claimed: &ClaimedJob) -> anyhow::Result<()>;
    async fn fail(&self, claimed: &ClaimedJob, error: &str) -> anyhow::Result<()>;
    /// Returns orphaned in-flight jobs to the pending set.
    async fn recover(&self) -> anyhow::Result<usize>;
}

/// Directory-backed queue. Claiming is an atomic rename from `pending/` to
/// `running/`, so only one consumer wins a given job.
#[derive(Debug, Clone)]
pub struct LocalFsJobQueue {
    base_dir: PathBuf,
}

impl LocalFsJobQueue {
    pub fn new(base_dir: impl Into<PathBuf>) -> Self {
        Self {
            base_dir: base_dir.into(),
        }
    }

    fn pending_dir(&self) -> PathBuf {
        self.base_dir.join("pending")
    }

    fn running_dir(&self) -> PathBuf {
        self.base_dir.join("running")
    }

    fn done_dir(&self) -> PathBuf {
        self.base_dir.join("done")
    }

    fn failed_dir(&self) -> PathBuf {
        self.base_dir.join("failed")
    }

    pub async fn pending_count(&self) -> anyhow::Result<usize> {
        Ok(job_files(&self.pending_dir()).await?.len())
    }

    pub async fn failed_jobs(&self) -> anyhow::Result<Vec<FailedJob>> {
        let dir = self.failed_dir();
        let mut out = Vec::new();
        for name in job_files(&dir).await? {
            let path = dir.join(&name);
            if let Some(failed) = read_json::<FailedJob>(&path)
                .await
                .with_context(|| format!("read: {}", path.display()))?
            {
                out.push(failed);
            }
        }
        Ok(out)
    }
}

#[async_trait]
impl JobQueue for LocalFsJobQueue {
    async fn enqueue(&self, job: &CrawlJob) -> anyhow::Result<()> {
        let file_name = format!(
            "{:020}_{}.json",
            job.enqueued_at.timestamp_micros().max(0),
            job.job_id
        );
        write_json_atomic(&self.pending_dir().join(file_name), job)
            .await
            .context("write pending job")?;
        tracing::info!(job_id = %job.job_id, site_id = %job.site_id, kind = job.kind.as_str(), "job enqueued");
        Ok(())
    }

    async fn claim(&self) -> anyhow::Result<Option<ClaimedJob>> {
        let running_dir = self.running_dir();
        fs::create_dir_all(&running_dir)
            .await
            .with_context(|| format!("create dir: {}", running_dir.display()))?;

        for file_name in job_files(&self.pending_dir()).await? {
            let from = self.pending_dir().join(&file_name);
            let to = running_dir.join(&file_name);
            match fs::rename(&from, &to).await {
                Ok(()) => {}
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => continue,
                Err(err) => {
                    return Err(err).with_context(|| format!("claim: {}", from.display()));
                }
            }
            let job = read_json::<CrawlJob>(&to)
                .await
                .with_context(|| format!("read: {}", to.display()))?
                .ok_or_else(|| anyhow::anyhow!("claimed job vanished: {}", to.display()))?;
            tracing::debug!(job_id = %job.job_id, "job claimed");
            return Ok(Some(ClaimedJob { job, file_name }));
        }
        Ok(None)
    }

    async fn complete(&self, claimed: &ClaimedJob) -> anyhow::Result<()> {
        let done_dir = self.done_dir();
        fs::create_dir_all(&done_dir)
            .await
            .with_context(|| format!("create dir: {}", done_dir.display()))?;
        let from = self.running_dir().join(&claimed.file_name);
        fs::rename(&from, done_dir.join(&claimed.file_name))
            .await
            .with_context(|| format!("complete: {}", from.display()))
    }

    async fn fail(&self, claimed: &ClaimedJob, error: &str) -> anyhow::Result<()> {
        let failed = FailedJob {
            job: claimed.job.clone(),
            error: error.to_owned(),
            failed_at: Utc::now(),
        };
        write_json_atomic(&self.failed_dir().join(&claimed.file_name), &failed)
            .await
            .context("write failed job")?;
        let running = self.running_dir().join(&claimed.file_name);
        match fs::remove_file(&running).await {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(err) => Err(err).with_context(|| format!("remove: {}", running.display())),
        }
    }

    async fn recover(&self) -> anyhow::Result<usize> {
        let pending_dir = self.pending_dir();
        fs::create_dir_all(&pending_dir)
            .await
            .with_context(|| format!("create dir: {}", pending_dir.display()))?;
        let mut recovered = 0;
        for file_name in job_files(&self.running_dir()).await? {
            let from = self.running_dir().join(&file_name);
            match fs::rename(&from, pending_dir.join(&file_name)).await {
                Ok(()) => recovered += 1,
                Err(err) if err.kind() == std::io::ErrorKind::NotFound => {}
                Err(err) => {
                    return Err(err).with_context(|| format!("recover: {}", from.display()));
                }
            }
        }
        if recovered > 0 {
            tracing::warn!(recovered, "returned orphaned jobs to the queue");
        }
        Ok(recovered)
    }
}

/// Sorted `*.json` file names in `dir`; a missing dir is empty.
async fn job_files(dir: &Path) -> anyhow::Result<Vec<String>> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(err) => return Err(err).with_context(|| format!("read dir: {}", dir.display())),
    };
    let mut names = Vec::new();
    while let Some(entry) = entries.next_entry().await.context("read dir entry")? {
        let name = entry.file_name().to_string_lossy().into_owned();
        if name.ends_with(".json") {
            names.push(name);
        }
    }
    names.sort();
    Ok(names)
}
