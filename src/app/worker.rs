use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use tokio::sync::watch;
use tokio::task::JoinHandle;

use crate::app::queue::{ClaimedJob, InProcessQueue, JobQueue};
use crate::app::runner::JobRunner;

#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct WorkerStats {
    pub completed: usize,
    pub failed: usize,
}

#[derive(Debug, Default)]
struct Counters {
    completed: AtomicUsize,
    failed: AtomicUsize,
}

/// Pulls jobs from a durable queue and runs up to `max_concurrent_jobs` of
/// them at once, each with its own crawl state.
pub struct Worker {
    queue: Arc<dyn JobQueue>,
    runner: Arc<JobRunner>,
    slots: InProcessQueue,
    poll_interval: Duration,
    shutdown: Arc<watch::Sender<bool>>,
}

impl Worker {
    pub fn new(
        queue: Arc<dyn JobQueue>,
        runner: Arc<JobRunner>,
        max_concurrent_jobs: usize,
        poll_interval: Duration,
    ) -> Self {
        Self {
            queue,
            runner,
            slots: InProcessQueue::new(max_concurrent_jobs),
            poll_interval,
            shutdown: Arc::new(watch::channel(false).0),
        }
    }

    /// Stops claiming new jobs. Jobs already running are waited for.
    pub fn request_shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    /// With `once`, drains the queue and returns when every claimed job has
    /// finished. Otherwise polls until ctrl-c or [`Worker::request_shutdown`].
    pub async fn run(&self, once: bool) -> anyhow::Result<WorkerStats> {
        let counters = Arc::new(Counters::default());
        let mut in_flight: Vec<JoinHandle<()>> = Vec::new();
        let mut stop = self.shutdown.subscribe();
        let listener = (!once).then(|| {
            let shutdown = Arc::clone(&self.shutdown);
            tokio::spawn(async move {
                if tokio::signal::ctrl_c().await.is_ok() {
                    tracing::info!("shutdown requested; waiting for running jobs");
                    shutdown.send_replace(true);
                }
            })
        });

        loop {
            in_flight.retain(|handle| !handle.is_finished());
            let stopped = *stop.borrow_and_update();
            if stopped {
                break;
            }

            let reservation = tokio::select! {
                reservation = self.slots.reserve() => reservation?,
                changed = stop.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    continue;
                }
            };

            let Some(claimed) = self.queue.claim().await? else {
                drop(reservation);
                if once || self.idle(&mut stop).await {
                    break;
                }
                continue;
            };

            let queue = Arc::clone(&self.queue);
            let runner = Arc::clone(&self.runner);
            let counters = Arc::clone(&counters);
            in_flight.push(reservation.spawn(async move {
                process(queue.as_ref(), &runner, &claimed, &counters).await;
            }));
        }

        if let Some(listener) = listener {
            listener.abort();
        }
        for handle in in_flight {
            if let Err(err) = handle.await {
                tracing::error!(?err, "job task panicked");
                counters.failed.fetch_add(1, Ordering::SeqCst);
            }
        }

        Ok(WorkerStats {
            completed: counters.completed.load(Ordering::SeqCst),
            failed: counters.failed.load(Ordering::SeqCst),
        })
    }

    /// Sleeps one poll interval. True when shutdown was requested instead.
    async fn idle(&self, stop: &mut watch::Receiver<bool>) -> bool {
        tokio::select! {
            _ = tokio::time::sleep(self.poll_interval) => false,
            _ = stop.changed() => true,
        }
    }
}

async fn process(queue: &dyn JobQueue, runner: &JobRunner, claimed: &ClaimedJob, counters: &Counters) {
    let acked = match runner.run_job(&claimed.job).await {
        Ok(_) => {
            counters.completed.fetch_add(1, Ordering::SeqCst);
            queue.complete(claimed).await
        }
        Err(err) => {
            counters.failed.fetch_add(1, Ordering::SeqCst);
            queue.fail(claimed, &format!("{err:#}")).await
        }
    };
    if let Err(err) = acked {
        tracing::error!(job_id = %claimed.job.job_id, ?err, "could not acknowledge job");
    }
}
