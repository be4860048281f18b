pub mod config;
pub mod fetch;
pub mod logging;
pub mod metrics;
pub mod pipeline;
pub mod retry;

pub use config::{FetchConfig, PipelineConfig};
pub use fetch::{DownloadOutcome, FetchReport, Fetcher};
pub use pipeline::{BatchReport, BatchSummary, ExitStatus, Pipeline, Warning, WarningKind};
