use anyhow::{Context, Result};
use perfscraper::{pipeline, FileConfig, LogObserver};
use std::{env, path::PathBuf, sync::Arc};
use tokio::time::Instant;
use tracing::{info, warn};
use tracing_subscriber::{fmt, EnvFilter};

#[tokio::main]
async fn main() -> Result<()> {
    // ─── 1) init logging ─────────────────────────────────────────────
    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,perfscraper=info"));
    fmt::Subscriber::builder()
        .with_env_filter(env_filter)
        .with_span_events(fmt::format::FmtSpan::CLOSE)
        .init();
    info!("startup");

    // ─── 2) load config ──────────────────────────────────────────────
    let path = env::args_os()
        .nth(1)
        .map(PathBuf::from)
        .or_else(|| env::var_os("PERFSCRAPER_CONFIG").map(PathBuf::from));
    let file_config = match &path {
        Some(p) => {
            info!(path = %p.display(), "loading config");
            FileConfig::load(p).with_context(|| format!("loading {}", p.display()))?
        }
        None => {
            info!("no config given; using defaults");
            FileConfig::default()
        }
    };
    let config = file_config.into_run_config()?;
    info!(
        start = %config.start_date,
        months = config.months,
        funds = config.funds.len(),
        mode = ?config.mode,
        "run configured"
    );

    // ─── 3) run ──────────────────────────────────────────────────────
    let start = Instant::now();
    let outcome = pipeline::run_with_http(&config, Arc::new(LogObserver)).await?;

    for failure in &outcome.report.fetch_failures {
        warn!(date = %failure.date, url = %failure.url, reason = %failure.reason, "month missing");
    }
    info!(
        rows = outcome.table.len(),
        output = %config.output.display(),
        elapsed = ?start.elapsed(),
        "all done"
    );
    Ok(())
}
