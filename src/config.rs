// src/config.rs
use chrono::{Local, Months, NaiveDate};
use serde::{Deserialize, Serialize};
use std::{
    collections::HashSet,
    fs,
    path::{Path, PathBuf},
    time::Duration,
};
use url::Url;

use crate::error::{PipelineError, Result};
use crate::fetch::{
    ensure_disposable,
    urls::{self, DEFAULT_URL_TEMPLATE},
};

pub const MAX_MONTHS: u32 = 99;
pub const MAX_CONCURRENT: usize = 64;
pub const MAX_FETCH_TIMEOUT: Duration = Duration::from_secs(600);
pub const MAX_RETRIES: u32 = 10;
pub const MAX_RETRY_BACKOFF: Duration = Duration::from_secs(60);

/// Funds offered by the performance report.
pub const DEFAULT_FUNDS: &[&str] = &[
    "Core Strategy",
    "Balanced",
    "Capital Stable",
    "Diversified",
    "High Growth",
    "Cash",
    "Bonds",
    "Shares",
    "Property",
    "Australian Shares",
    "Australian Shares - Indexed",
    "Overseas Shares",
    "Overseas Shares - Indexed",
];

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunMode {
    /// Recreate the workspace and fetch every month.
    #[default]
    Live,
    /// Skip fetching; extract from whatever the workspace already holds.
    ReuseWorkspace,
}

/// On-disk (YAML) form of the configuration. Every key is optional.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct FileConfig {
    pub workspace: PathBuf,
    /// `dd/mm/YYYY` or `YYYY-MM-DD`; five years ago when absent.
    pub start_date: Option<String>,
    pub months: u32,
    pub funds: Vec<String>,
    pub mode: RunMode,
    pub url_template: String,
    pub max_concurrent: usize,
    pub fetch_timeout_secs: u64,
    pub max_retries: u32,
    pub retry_backoff_ms: u64,
    /// Defaults to `<workspace>/Output.csv`.
    pub output: Option<PathBuf>,
    pub parquet_snapshot: bool,
}

impl Default for FileConfig {
    fn default() -> Self {
        Self {
            workspace: PathBuf::from("Raw_Rest_data"),
            start_date: None,
            months: 3,
            funds: DEFAULT_FUNDS.iter().map(|s| s.to_string()).collect(),
            mode: RunMode::Live,
            url_template: DEFAULT_URL_TEMPLATE.to_string(),
            max_concurrent: 4,
            fetch_timeout_secs: 30,
            max_retries: 2,
            retry_backoff_ms: 500,
            output: None,
            parquet_snapshot: false,
        }
    }
}

impl FileConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let text = fs::read_to_string(path).map_err(|e| {
            PipelineError::config(format!("reading config {}: {}", path.display(), e))
        })?;
        Ok(serde_yaml::from_str(&text)?)
    }

    pub fn into_run_config(self) -> Result<RunConfig> {
        let start_date = match &self.start_date {
            Some(s) => parse_start_date(s)?,
            None => default_start_date(),
        };
        let output = self
            .output
            .unwrap_or_else(|| self.workspace.join("Output.csv"));
        let cfg = RunConfig {
            workspace: self.workspace,
            start_date,
            months: self.months,
            funds: self.funds,
            mode: self.mode,
            url_template: self.url_template,
            max_concurrent: self.max_concurrent,
            fetch_timeout: Duration::from_secs(self.fetch_timeout_secs),
            max_retries: self.max_retries,
            retry_backoff: Duration::from_millis(self.retry_backoff_ms),
            output,
            parquet_snapshot: self.parquet_snapshot,
        };
        cfg.validate()?;
        Ok(cfg)
    }
}

/// Everything one run needs. Fixed for the duration of the run.
#[derive(Debug, Clone, PartialEq)]
pub struct RunConfig {
    pub workspace: PathBuf,
    pub start_date: NaiveDate,
    pub months: u32,
    /// Requested funds, in order.
    pub funds: Vec<String>,
    pub mode: RunMode,
    pub url_template: String,
    pub max_concurrent: usize,
    pub fetch_timeout: Duration,
    pub max_retries: u32,
    pub retry_backoff: Duration,
    pub output: PathBuf,
    pub parquet_snapshot: bool,
}

impl RunConfig {
    /// Defaults for everything but the four run inputs.
    pub fn new(
        workspace: impl Into<PathBuf>,
        start_date: NaiveDate,
        months: u32,
        funds: &[&str],
    ) -> Self {
        let workspace = workspace.into();
        let base = FileConfig::default();
        Self {
            output: workspace.join("Output.csv"),
            workspace,
            start_date,
            months,
            funds: funds.iter().map(|s| s.to_string()).collect(),
            mode: base.mode,
            url_template: base.url_template,
            max_concurrent: base.max_concurrent,
            fetch_timeout: Duration::from_secs(base.fetch_timeout_secs),
            max_retries: base.max_retries,
            retry_backoff: Duration::from_millis(base.retry_backoff_ms),
            parquet_snapshot: base.parquet_snapshot,
        }
    }

    /// Checks that need no network access.
    pub fn validate(&self) -> Result<()> {
        if self.months == 0 || self.months > MAX_MONTHS {
            return Err(PipelineError::config(format!(
                "month count must be between 1 and {}, got {}",
                MAX_MONTHS, self.months
            )));
        }
        if urls::month_end_after(self.start_date, self.months - 1).is_none() {
            return Err(PipelineError::config(format!(
                "start date {} is out of range",
                self.start_date
            )));
        }
        if self.funds.is_empty() {
            return Err(PipelineError::config("no funds requested"));
        }
        let mut seen = HashSet::new();
        for f in &self.funds {
            if f.trim().is_empty() {
                return Err(PipelineError::config("blank fund name"));
            }
            if !seen.insert(f.trim()) {
                return Err(PipelineError::config(format!("fund {:?} listed twice", f)));
            }
        }
        let sample = urls::resource_url(&self.url_template, self.start_date);
        Url::parse(&sample).map_err(|e| {
            PipelineError::config(format!("bad URL template {:?}: {}", self.url_template, e))
        })?;
        if self.max_concurrent == 0 || self.max_concurrent > MAX_CONCURRENT {
            return Err(PipelineError::config(format!(
                "max_concurrent must be between 1 and {}, got {}",
                MAX_CONCURRENT, self.max_concurrent
            )));
        }
        if self.fetch_timeout.is_zero() || self.fetch_timeout > MAX_FETCH_TIMEOUT {
            return Err(PipelineError::config(format!(
                "fetch timeout must be positive and at most {:?}, got {:?}",
                MAX_FETCH_TIMEOUT, self.fetch_timeout
            )));
        }
        if self.max_retries > MAX_RETRIES {
            return Err(PipelineError::config(format!(
                "max_retries must be at most {}, got {}",
                MAX_RETRIES, self.max_retries
            )));
        }
        if self.retry_backoff > MAX_RETRY_BACKOFF {
            return Err(PipelineError::config(format!(
                "retry backoff must be at most {:?}, got {:?}",
                MAX_RETRY_BACKOFF, self.retry_backoff
            )));
        }
        if self.workspace.as_os_str().is_empty() {
            return Err(PipelineError::config("workspace path is empty"));
        }
        ensure_disposable(&self.workspace).map_err(|e| PipelineError::config(e.to_string()))?;
        Ok(())
    }

    pub fn report_path(&self) -> PathBuf {
        self.output.with_file_name("run_report.json")
    }

    pub fn parquet_path(&self) -> PathBuf {
        self.output.with_extension("parquet")
    }
}

/// `dd/mm/YYYY` (as entered in the date picker) or ISO `YYYY-MM-DD`.
pub fn parse_start_date(s: &str) -> Result<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%d/%m/%Y")
        .or_else(|_| NaiveDate::parse_from_str(s, "%Y-%m-%d"))
        .map_err(|_| PipelineError::config(format!("invalid start date {:?}", s)))
}

fn default_start_date() -> NaiveDate {
    let today = Local::now().date_naive();
    today.checked_sub_months(Months::new(60)).unwrap_or(today)
}
