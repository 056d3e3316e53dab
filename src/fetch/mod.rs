// src/fetch/mod.rs
//! Monthly report discovery and download.

pub mod docs;
pub mod urls;

pub use docs::{
    ensure_disposable, fetch_all, prepare_workspace, DocumentSource, FetchOptions, FetchSummary,
    HttpSource, ProgressFn, RetryingSource,
};
pub use urls::{generate, ResourceRef};
