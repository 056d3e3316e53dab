// src/pipeline.rs
//! One scrape run: locate → fetch → extract → build → persist.

use std::{path::Path, sync::Arc, time::Duration};
use tokio::task;
use tracing::{error, info, instrument};

use crate::config::{RunConfig, RunMode};
use crate::error::{PipelineError, Result};
use crate::extract;
use crate::fetch::{self, DocumentSource, FetchOptions, HttpSource, ProgressFn, RetryingSource};
use crate::report::RunReport;
use crate::table::{self, write, ResultTable};

/// Callbacks for whoever drives a run (a UI, the binary, a test).
pub trait RunObserver: Send + Sync {
    fn on_progress(&self, _completed: usize, _total: usize) {}
    fn on_complete(&self, _outcome: &RunOutcome) {}
    fn on_error(&self, _message: &str) {}
}

/// Reports through `tracing`.
pub struct LogObserver;

impl RunObserver for LogObserver {
    fn on_progress(&self, completed: usize, total: usize) {
        info!(completed, total, "progress");
    }

    fn on_complete(&self, outcome: &RunOutcome) {
        let r = &outcome.report;
        info!(
            rows = r.rows,
            fetched = r.fetched,
            fetch_failures = r.failure_count(),
            rejected = r.rejected_rows.len(),
            duplicates = r.duplicate_rows.len(),
            "run complete"
        );
    }

    fn on_error(&self, message: &str) {
        error!(%message, "run failed");
    }
}

#[derive(Debug)]
pub struct RunOutcome {
    pub table: ResultTable,
    pub report: RunReport,
}

/// Run against an arbitrary source. Each fetch is capped at
/// `config.fetch_timeout`.
pub async fn run(
    config: &RunConfig,
    source: Arc<dyn DocumentSource>,
    observer: Arc<dyn RunObserver>,
) -> Result<RunOutcome> {
    let opts = FetchOptions {
        max_concurrent: config.max_concurrent,
        timeout: config.fetch_timeout,
    };
    finish(run_with_options(config, source, &opts, observer.clone()).await, observer.as_ref())
}

/// Run against the live endpoint over HTTP, with retries.
pub async fn run_with_http(config: &RunConfig, observer: Arc<dyn RunObserver>) -> Result<RunOutcome> {
    if let Err(e) = config.validate() {
        return finish(Err(e), observer.as_ref());
    }
    let http = match HttpSource::new(config.fetch_timeout) {
        Ok(http) => http,
        Err(e) => {
            return finish(
                Err(PipelineError::config(format!("{:#}", e))),
                observer.as_ref(),
            )
        }
    };
    let source = RetryingSource::new(http, config.max_retries, config.retry_backoff);
    let opts = FetchOptions {
        max_concurrent: config.max_concurrent,
        timeout: retry_budget(config),
    };
    finish(
        run_with_options(config, Arc::new(source), &opts, observer.clone()).await,
        observer.as_ref(),
    )
}

/// Worst case for one ref: every attempt times out, plus every backoff.
fn retry_budget(config: &RunConfig) -> Duration {
    let attempts = config.max_retries.saturating_add(1);
    // backoff doubles each retry: b + 2b + … = b * (2^n - 1)
    let backoffs = config
        .retry_backoff
        .saturating_mul(2u32.saturating_pow(config.max_retries).saturating_sub(1));
    config
        .fetch_timeout
        .saturating_mul(attempts)
        .saturating_add(backoffs)
}

fn finish(result: Result<RunOutcome>, observer: &dyn RunObserver) -> Result<RunOutcome> {
    match &result {
        Ok(outcome) => observer.on_complete(outcome),
        Err(e) => observer.on_error(&e.to_string()),
    }
    result
}

#[instrument(level = "info", skip_all, fields(start = %config.start_date, months = config.months, mode = ?config.mode))]
async fn run_with_options(
    config: &RunConfig,
    source: Arc<dyn DocumentSource>,
    opts: &FetchOptions,
    observer: Arc<dyn RunObserver>,
) -> Result<RunOutcome> {
    config.validate()?;
    let patterns = extract::compile_patterns(&config.funds)?;
    let mut report = RunReport::default();

    match config.mode {
        RunMode::Live => {
            fetch::prepare_workspace(&config.workspace).await?;
            let refs = fetch::generate(&config.url_template, config.start_date, config.months);
            info!(count = refs.len(), workspace = %config.workspace.display(), "fetching monthly reports");

            let obs = Arc::clone(&observer);
            let progress: ProgressFn = Arc::new(move |done, total| obs.on_progress(done, total));
            let summary =
                fetch::fetch_all(source, &refs, &config.workspace, opts, progress).await;

            report.total = refs.len();
            report.fetched = summary.saved.len();
            report.fetch_failures = summary.failures;
        }
        RunMode::ReuseWorkspace => {
            if !config.workspace.is_dir() {
                return Err(PipelineError::config(format!(
                    "workspace {} does not exist; run in live mode first",
                    config.workspace.display()
                )));
            }
            info!(workspace = %config.workspace.display(), "reusing existing workspace");
        }
    }

    let workspace = config.workspace.clone();
    let output = config.output.clone();
    let parquet = config.parquet_snapshot.then(|| config.parquet_path());
    let (documents, extracted, built) = task::spawn_blocking(move || -> Result<_> {
        let (documents, rows) = extract::extract_workspace(&workspace, &patterns)?;
        let extracted = rows.len();
        let built = table::build(rows)?;
        ensure_parent(&output)?;
        write::write_csv(&built.table, &output)?;
        if let Some(path) = parquet {
            write::write_parquet(&built.table, &path)?;
        }
        Ok((documents, extracted, built))
    })
    .await??;

    report.documents = documents;
    report.extracted = extracted;
    report.rejected_rows = built.rejected;
    report.duplicate_rows = built.duplicates;
    report.rows = built.table.len();
    report.write_json(&config.report_path())?;
    info!(output = %config.output.display(), rows = report.rows, "table written");

    Ok(RunOutcome {
        table: built.table,
        report,
    })
}

fn ensure_parent(path: &Path) -> std::io::Result<()> {
    match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => std::fs::create_dir_all(dir),
        _ => Ok(()),
    }
}
