use clap::Parser;
use sds_cli::config::{self, PipelineConfig};
use sds_cli::{ExitStatus, Pipeline, logging};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::Ordering;
use tracing::{error, warn};

/// Index a directory of safety data sheets by product name and hazard class.
#[derive(Parser, Debug)]
#[command(name = "sds-index", version)]
struct Args {
    /// Directory of SDS documents to scan
    #[arg(long)]
    input: PathBuf,

    /// Directory for records, indices and the batch summary
    #[arg(long)]
    output: PathBuf,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Maximum documents processed at once
    #[arg(long)]
    concurrency: Option<usize>,

    /// Per-file read timeout
    #[arg(long)]
    read_timeout_secs: Option<u64>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

impl Args {
    fn pipeline_config(&self) -> anyhow::Result<PipelineConfig> {
        let mut config: PipelineConfig = match &self.config {
            Some(path) => config::load_json(path)?,
            None => PipelineConfig::default(),
        };
        if let Some(n) = self.concurrency {
            config.concurrency.max_concurrent_documents = n;
        }
        if let Some(secs) = self.read_timeout_secs {
            config.ingest.read_timeout_secs = secs;
        }
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.log_json);

    let config = match args.pipeline_config() {
        Ok(config) => config,
        Err(e) => {
            error!("{:#}", e);
            return ExitStatus::Failed.into();
        }
    };

    let pipeline = Pipeline::new(config);
    let cancel = pipeline.cancel_handle();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            warn!("Interrupted, finishing documents already in progress");
            cancel.store(true, Ordering::SeqCst);
        }
    });

    let result = pipeline.run(&args.input, &args.output).await;
    let status = ExitStatus::of(&result);
    status.report(&result);

    if let Ok(report) = &result {
        match serde_json::to_string_pretty(&report.summary) {
            Ok(json) => println!("{}", json),
            Err(e) => error!("Failed to render summary: {}", e),
        }
    }

    status.into()
}
