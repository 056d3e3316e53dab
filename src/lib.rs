pub mod config;
pub mod error;
pub mod extract;
pub mod fetch;
pub mod pipeline;
pub mod report;
pub mod table;

pub use config::{FileConfig, RunConfig, RunMode};
pub use error::PipelineError;
pub use pipeline::{run, run_with_http, LogObserver, RunObserver, RunOutcome};
pub use report::RunReport;
pub use table::{ResultRow, ResultTable};
