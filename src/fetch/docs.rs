// src/fetch/docs.rs
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use std::{
    io,
    path::{Component, Path, PathBuf},
    sync::{
        atomic::{AtomicUsize, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    fs,
    sync::{mpsc, Semaphore},
    time::{sleep, timeout, Instant},
};
use tracing::{debug, error, info, instrument, warn};

use super::urls::ResourceRef;
use crate::report::FetchFailure;

/// Anything that can hand back the body behind a URL.
#[async_trait]
pub trait DocumentSource: Send + Sync {
    async fn get(&self, url: &str) -> Result<Vec<u8>>;
}

/// Plain HTTP GET through `reqwest`.
#[derive(Clone)]
pub struct HttpSource {
    client: Client,
}

impl HttpSource {
    /// Client with a per-request timeout.
    pub fn new(request_timeout: Duration) -> Result<Self> {
        let client = Client::builder()
            .user_agent(concat!("perfscraper/", env!("CARGO_PKG_VERSION")))
            .timeout(request_timeout)
            .build()
            .context("building HTTP client")?;
        Ok(Self { client })
    }
}

#[async_trait]
impl DocumentSource for HttpSource {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let resp = self
            .client
            .get(url)
            .send()
            .await
            .with_context(|| format!("GET {} failed", url))?
            .error_for_status()
            .with_context(|| format!("Non-success status {}", url))?;

        let mut body = Vec::new();
        let mut stream = resp.bytes_stream();
        while let Some(chunk) = stream.next().await {
            let chunk = chunk.with_context(|| format!("reading body from {}", url))?;
            body.extend_from_slice(&chunk);
        }
        Ok(body)
    }
}

/// Retries the wrapped source with exponential backoff.
pub struct RetryingSource<S> {
    inner: S,
    max_retries: u32,
    initial_backoff: Duration,
}

impl<S> RetryingSource<S> {
    pub fn new(inner: S, max_retries: u32, initial_backoff: Duration) -> Self {
        Self {
            inner,
            max_retries,
            initial_backoff,
        }
    }
}

#[async_trait]
impl<S: DocumentSource> DocumentSource for RetryingSource<S> {
    async fn get(&self, url: &str) -> Result<Vec<u8>> {
        let mut attempts = 0;
        loop {
            match self.inner.get(url).await {
                Ok(body) => return Ok(body),
                Err(e) if attempts < self.max_retries => {
                    attempts += 1;
                    let backoff = self
                        .initial_backoff
                        .saturating_mul(2u32.saturating_pow(attempts - 1));
                    warn!(%url, attempt = attempts, delay_ms = backoff.as_millis() as u64, error = %e, "Retrying");
                    sleep(backoff).await;
                }
                Err(e) => return Err(e),
            }
        }
    }
}

/// Called with `(completed, total)` after every finished fetch.
pub type ProgressFn = Arc<dyn Fn(usize, usize) + Send + Sync>;

#[derive(Debug, Clone)]
pub struct FetchOptions {
    pub max_concurrent: usize,
    /// Upper bound on a single fetch, retries included.
    pub timeout: Duration,
}

impl Default for FetchOptions {
    fn default() -> Self {
        Self {
            max_concurrent: 4,
            timeout: Duration::from_secs(30),
        }
    }
}

#[derive(Debug, Default)]
pub struct FetchSummary {
    /// Stored documents, in ref order.
    pub saved: Vec<PathBuf>,
    pub failures: Vec<FetchFailure>,
}

/// Refuse paths whose removal would take more than the workspace with it:
/// `.`, `..`, the root, or any directory holding the current directory.
pub fn ensure_disposable(workspace: &Path) -> io::Result<()> {
    let refuse = |why: &str| -> io::Result<()> {
        Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            format!("refusing to use {} as workspace: {}", workspace.display(), why),
        ))
    };
    if !workspace
        .components()
        .any(|c| matches!(c, Component::Normal(_)))
    {
        return refuse("not a directory of its own");
    }
    if let Ok(ws) = std::fs::canonicalize(workspace) {
        let cwd = std::env::current_dir()?.canonicalize()?;
        if cwd.starts_with(&ws) {
            return refuse("it contains the current directory");
        }
    }
    Ok(())
}

/// Wipe `workspace` and recreate it empty.
pub async fn prepare_workspace(workspace: &Path) -> io::Result<()> {
    ensure_disposable(workspace)?;
    if fs::try_exists(workspace).await? {
        debug!(path = %workspace.display(), "removing previous workspace");
        fs::remove_dir_all(workspace).await?;
    }
    fs::create_dir_all(workspace).await
}

/// Fetch every ref into `workspace`, at most `max_concurrent` at a time.
///
/// A failed ref is logged and recorded; the others carry on.
#[instrument(level = "info", skip_all, fields(total = refs.len(), workspace = %workspace.display()))]
pub async fn fetch_all(
    source: Arc<dyn DocumentSource>,
    refs: &[ResourceRef],
    workspace: &Path,
    opts: &FetchOptions,
    on_progress: ProgressFn,
) -> FetchSummary {
    let total = refs.len();
    let sem = Arc::new(Semaphore::new(opts.max_concurrent.clamp(1, Semaphore::MAX_PERMITS)));
    let (tx, mut rx) = mpsc::channel::<(usize, Result<PathBuf, String>)>(total.max(1));
    let mut handles = Vec::with_capacity(total);

    for (idx, r) in refs.iter().cloned().enumerate() {
        let source = Arc::clone(&source);
        let sem = Arc::clone(&sem);
        let tx = tx.clone();
        let dest = workspace.join(r.file_name());
        let limit = opts.timeout;

        handles.push(tokio::spawn(async move {
            let outcome = match sem.acquire_owned().await {
                Ok(_permit) => {
                    let start = Instant::now();
                    let res = download_one(source.as_ref(), &r, &dest, limit).await;
                    match &res {
                        Ok(_) => {
                            info!(file = %r.file_name(), elapsed = ?start.elapsed(), "downloaded")
                        }
                        Err(e) => error!(url = %r.url, error = %e, "download failed"),
                    }
                    res.map_err(|e| format!("{:#}", e))
                }
                Err(e) => Err(format!("worker pool closed: {}", e)),
            };
            let _ = tx.send((idx, outcome)).await;
        }));
    }
    // drop the original sender so `rx.recv()` ends once every task has reported
    drop(tx);

    let mut saved: Vec<Option<PathBuf>> = vec![None; total];
    let mut reported = vec![false; total];
    let mut failures = Vec::new();
    // completions arrive one at a time here, so the count only ever goes up
    let completed = AtomicUsize::new(0);
    while let Some((idx, outcome)) = rx.recv().await {
        reported[idx] = true;
        let done = completed.fetch_add(1, Ordering::SeqCst) + 1;
        on_progress(done, total);
        match outcome {
            Ok(path) => saved[idx] = Some(path),
            Err(reason) => failures.push(failure(&refs[idx], reason)),
        }
    }

    for (idx, h) in handles.into_iter().enumerate() {
        if let Err(e) = h.await {
            if !reported[idx] {
                error!(url = %refs[idx].url, error = %e, "download task died");
                failures.push(failure(&refs[idx], format!("task failed: {}", e)));
            }
        }
    }

    failures.sort_by_key(|f| f.date);
    let saved: Vec<PathBuf> = saved.into_iter().flatten().collect();
    info!(saved = saved.len(), failed = failures.len(), "fetch finished");
    FetchSummary { saved, failures }
}

async fn download_one(
    source: &dyn DocumentSource,
    r: &ResourceRef,
    dest: &Path,
    limit: Duration,
) -> Result<PathBuf> {
    let body = timeout(limit, source.get(&r.url))
        .await
        .map_err(|_| anyhow!("timed out after {:?}", limit))??;
    fs::write(dest, &body)
        .await
        .with_context(|| format!("writing {}", dest.display()))?;
    Ok(dest.to_path_buf())
}

fn failure(r: &ResourceRef, reason: String) -> FetchFailure {
    FetchFailure {
        url: r.url.clone(),
        date: r.date,
        reason,
    }
}
