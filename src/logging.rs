use anyhow::Context as _;
use tracing_subscriber::EnvFilter;

const DEFAULT_DIRECTIVES: &str = "info";

/// Stderr logging filtered by `RUST_LOG`, `info` when unset.
pub fn init() -> anyhow::Result<()> {
    let filter = filter_from(std::env::var("RUST_LOG").ok().as_deref())?;

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|err| anyhow::anyhow!("initialize tracing subscriber: {err}"))?;

    Ok(())
}

fn filter_from(directives: Option<&str>) -> anyhow::Result<EnvFilter> {
    match directives.map(str::trim).filter(|d| !d.is_empty()) {
        Some(directives) => EnvFilter::try_new(directives)
            .with_context(|| format!("parse RUST_LOG={directives:?}")),
        None => EnvFilter::try_new(DEFAULT_DIRECTIVES).context("build log filter"),
    }
}
