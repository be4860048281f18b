use anyhow::{Context, Result};
use clap::Parser;
use sds_cli::config::{self, FetchConfig};
use sds_cli::{Fetcher, logging};
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use tracing::{error, info, warn};

/// Download SDS PDFs from disclosure pages and direct links.
#[derive(Parser, Debug)]
#[command(name = "sds-fetch", version)]
struct Args {
    /// Directory the sheets are saved to
    #[arg(long)]
    output: PathBuf,

    /// Listing page to scrape for SDS links (repeatable)
    #[arg(long = "page")]
    pages: Vec<String>,

    /// Direct SDS download URL (repeatable)
    #[arg(long = "pdf")]
    pdfs: Vec<String>,

    /// File of URLs, one per line; lines starting with `#` are ignored
    #[arg(long)]
    urls_file: Option<PathBuf>,

    /// JSON configuration file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Emit logs as JSON lines
    #[arg(long)]
    log_json: bool,
}

fn read_urls_file(path: &Path) -> Result<Vec<String>> {
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("Failed to read URL list: {:?}", path))?;
    Ok(raw
        .lines()
        .map(str::trim)
        .filter(|line| !line.is_empty() && !line.starts_with('#'))
        .map(String::from)
        .collect())
}

async fn run(args: &Args) -> Result<usize> {
    let config: FetchConfig = match &args.config {
        Some(path) => config::load_json(path)?,
        None => FetchConfig::default(),
    };

    let mut direct = args.pdfs.clone();
    if let Some(path) = &args.urls_file {
        direct.extend(read_urls_file(path)?);
    }
    if args.pages.is_empty() && direct.is_empty() {
        warn!("No pages or URLs given");
    }

    let fetcher = Fetcher::new(&config, &args.output)?;
    let report = fetcher.run(&args.pages, &direct).await?;

    info!(
        pages = report.pages_scraped,
        links = report.links_found,
        invalid = report.invalid_urls.len(),
        available = report.available(),
        output = %fetcher.output_dir().display(),
        "Fetch finished"
    );
    Ok(report.available())
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    logging::init(args.log_json);

    match run(&args).await {
        Ok(0) => {
            error!("No SDS files were downloaded");
            ExitCode::from(2)
        }
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::from(2)
        }
    }
}
