use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context as _;
use url::Url;

use crate::app::deep::LocalDeepAnalyzer;
use crate::app::model::{CrawlJob, CrawlOptions, JobKind, validate_site_id};
use crate::app::queue::{JobQueue, LocalFsJobQueue};
use crate::app::runner::{JobOutcome, JobRunner};
use crate::app::site_store::LocalFsSiteStore;
use crate::app::worker::Worker;
use crate::cli::{CrawlArgs, EnqueueArgs, NormalizeArgs, ScoreArgs, ScorerEngine, VariantsArgs, WorkerArgs};
use crate::config::Settings;
use crate::extract::ExtractEngine;
use crate::language::{LANGUAGE_CODES, LanguageBelief};
use crate::normalize::{normalize_url, strip_www};
use crate::render::ChromiumProvider;

pub fn score(args: ScoreArgs) -> anyhow::Result<()> {
    let settings = Settings::load(args.config.as_deref().map(Path::new)).context("load settings")?;
    let html = std::fs::read_to_string(&args.html)
        .with_context(|| format!("read html: {}", args.html))?;
    let scored = crate::scorer::score_html(&html, &settings.scoring);

    let mut out = serde_json::to_value(&scored).context("serialize score")?;
    if let (Some(url), Some(obj)) = (args.url, out.as_object_mut()) {
        obj.insert("url".to_owned(), serde_json::Value::String(normalize_url(&url)));
    }
    print_json(&out)
}

pub fn normalize(args: NormalizeArgs) -> anyhow::Result<()> {
    println!("{}", normalize_url(&args.url));
    Ok(())
}

pub fn variants(args: VariantsArgs) -> anyhow::Result<()> {
    let base = parse_http_url(&args.url).context("parse --url")?;
    let belief = match args.language {
        Some(code) => {
            let code = code.trim().to_ascii_lowercase();
            if !LANGUAGE_CODES.contains(&code.as_str()) {
                anyhow::bail!("unknown language code: {code}");
            }
            LanguageBelief {
                uses_language_in_path: true,
                primary_language: Some(code),
            }
        }
        None => LanguageBelief::default(),
    };
    print_json(&crate::variants::variants(&base, &args.path, &belief))
}

pub async fn crawl(args: CrawlArgs) -> anyhow::Result<()> {
    let root = parse_http_url(&args.url).context("parse --url")?;
    let settings = Settings::load(args.config.as_deref().map(Path::new)).context("load settings")?;
    let runner = build_runner(settings, &args.store, args.engine).context("build job runner")?;

    let site_id = args.site_id.unwrap_or_else(|| site_id_for(&root));
    validate_site_id(&site_id).context("parse --site-id")?;
    let mut job = CrawlJob::new(site_id, root.as_str(), JobKind::GeneralCrawl);
    job.options = CrawlOptions {
        page_budget: args.max_pages,
        ..CrawlOptions::default()
    };

    match runner.run_job(&job).await? {
        JobOutcome::Crawled(report) => print_json(&report),
        JobOutcome::Analyzed(report) => print_json(&report),
    }
}

pub async fn enqueue(args: EnqueueArgs) -> anyhow::Result<()> {
    let root = parse_http_url(&args.url).context("parse --url")?;
    validate_site_id(&args.site_id).context("parse --site-id")?;
    let mut job = CrawlJob::new(args.site_id, root.as_str(), args.kind);
    job.options.page_budget = args.max_pages;

    LocalFsJobQueue::new(&args.queue)
        .enqueue(&job)
        .await
        .context("enqueue job")?;
    println!("{}", job.job_id);
    Ok(())
}

pub async fn worker(args: WorkerArgs) -> anyhow::Result<()> {
    let settings = Settings::load(args.config.as_deref().map(Path::new)).context("load settings")?;
    let runner = build_runner(settings, &args.store, args.engine).context("build job runner")?;
    let queue = Arc::new(LocalFsJobQueue::new(&args.queue));
    if args.recover {
        queue.recover().await.context("recover running jobs")?;
    }

    tracing::info!(
        queue = %args.queue,
        store = %args.store,
        max_concurrent_jobs = args.max_concurrent_jobs,
        once = args.once,
        "worker started"
    );
    let worker = Worker::new(
        queue,
        Arc::new(runner),
        args.max_concurrent_jobs,
        Duration::from_secs(args.poll_secs.max(1)),
    );
    let stats = worker.run(args.once).await.context("run worker")?;
    tracing::info!(completed = stats.completed, failed = stats.failed, "worker stopped");
    Ok(())
}

fn build_runner(settings: Settings, store_dir: &str, engine: ScorerEngine) -> anyhow::Result<JobRunner> {
    let scorer = crate::quality::build_scorer(engine, settings.scoring.neutral_qualitative_score)
        .context("build qualitative scorer")?;
    let engine = Arc::new(ExtractEngine::new(&settings).context("build extract engine")?);
    Ok(JobRunner::new(
        settings,
        Arc::new(LocalFsSiteStore::new(store_dir)),
        scorer,
        Arc::new(LocalDeepAnalyzer),
        Arc::new(ChromiumProvider::from_env()),
        engine,
    ))
}

fn parse_http_url(raw: &str) -> anyhow::Result<Url> {
    let url = Url::parse(raw)?;
    if url.scheme() != "http" && url.scheme() != "https" {
        anyhow::bail!("url must be http/https: {url}");
    }
    Ok(url)
}

/// `www.Example.com:8080` becomes `example-com-8080`.
pub fn site_id_for(root: &Url) -> String {
    let host = strip_www(root.host_str().unwrap_or("site")).to_ascii_lowercase();
    let mut id = host.replace(['.', ':', '[', ']'], "-");
    if let Some(port) = root.port() {
        id.push_str(&format!("-{port}"));
    }
    id
}

fn print_json<T: serde::Serialize + ?Sized>(value: &T) -> anyhow::Result<()> {
    let json = serde_json::to_string_pretty(value).context("serialize output")?;
    println!("{json}");
    Ok(())
}
