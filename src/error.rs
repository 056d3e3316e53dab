//! Error types for a scrape run.

use thiserror::Error;

/// Errors that fail a run outright.
///
/// Per-resource fetch failures, rejected rows and duplicate rows are not
/// errors: they are collected into the [`RunReport`](crate::report::RunReport)
/// and the run carries on with whatever succeeded.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// The run configuration is unusable. Raised before any network activity.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// An extracted row carries the wrong number of return fields.
    #[error(
        "schema mismatch in document {document} for {option}: expected {expected} return fields, found {found}"
    )]
    Schema {
        document: String,
        option: String,
        expected: usize,
        found: usize,
    },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("arrow error: {0}")]
    Arrow(#[from] arrow::error::ArrowError),

    #[error("parquet error: {0}")]
    Parquet(#[from] parquet::errors::ParquetError),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("YAML error: {0}")]
    Yaml(#[from] serde_yaml::Error),

    #[error("glob error: {0}")]
    Glob(#[from] glob::PatternError),

    /// A background task panicked or was cancelled.
    #[error("task failed: {0}")]
    Task(String),
}

impl PipelineError {
    pub fn config(msg: impl Into<String>) -> Self {
        PipelineError::Configuration(msg.into())
    }

    /// True for errors raised before the run touched the network or disk.
    pub fn is_configuration(&self) -> bool {
        matches!(self, PipelineError::Configuration(_))
    }
}

impl From<tokio::task::JoinError> for PipelineError {
    fn from(e: tokio::task::JoinError) -> Self {
        PipelineError::Task(e.to_string())
    }
}

pub type Result<T, E = PipelineError> = std::result::Result<T, E>;
