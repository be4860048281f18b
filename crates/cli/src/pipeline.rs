//! Batch run: Ingestor -> Extractor -> Indexer.
//!
//! Documents are scheduled lazily from the scan and processed on independent
//! tasks. The index rebuild waits for every task to finish.
//!
//! A document this run could not settle (a read failure, or never scheduled
//! because the batch was cancelled) keeps its entry and record from the
//! previous run's manifest. Only settled documents replace earlier output.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use extract::{ExtractError, Extractor, Record, generate_record_id};
use index::{Index, IndexStats, Indexer, OutputStore};
use ingest::{DiscoveredFile, DocumentEntry, IngestError, Ingestor};
use serde::Serialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use crate::config::PipelineConfig;
use crate::metrics::{BatchMetrics, MetricsSnapshot, TimedOperation};

pub const MANIFEST_FILE: &str = "documents.json";
pub const SUMMARY_FILE: &str = "summary.json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum WarningKind {
    Read,
    MalformedInput,
    Aborted,
}

/// A recovered error, reported in the batch summary.
#[derive(Debug, Clone, Serialize)]
pub struct Warning {
    pub kind: WarningKind,
    pub path: String,
    pub message: String,
}

impl Warning {
    fn from_ingest(root: &Path, err: &IngestError) -> Self {
        let path = err.path();
        let path = path.strip_prefix(root).unwrap_or(path);
        Self {
            kind: WarningKind::Read,
            path: path.to_string_lossy().to_string(),
            message: err.to_string(),
        }
    }

    fn from_extract(err: &ExtractError) -> Self {
        let kind = match err {
            ExtractError::MalformedInput { .. } => WarningKind::MalformedInput,
            ExtractError::Aborted { .. } => WarningKind::Aborted,
        };
        Self {
            kind,
            path: err.path().to_string(),
            message: err.to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct BatchSummary {
    pub run_id: Uuid,
    pub input: PathBuf,
    pub output: PathBuf,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub cancelled: bool,
    pub documents_discovered: usize,
    /// Read and extracted without error, whether or not a record came out
    pub documents_processed: usize,
    pub records_written: usize,
    /// Earlier documents kept because this run could not read or reach them
    pub documents_carried_forward: usize,
    pub records_removed: usize,
    pub index: IndexStats,
    pub metrics: MetricsSnapshot,
    pub warnings: Vec<Warning>,
}

#[derive(Debug)]
pub struct BatchReport {
    pub summary: BatchSummary,
    pub documents: Vec<DocumentEntry>,
    pub records: Vec<Record>,
    pub index: Index,
}

enum DocumentOutcome {
    Extracted {
        entry: DocumentEntry,
        record: Option<Record>,
    },
    Failed {
        entry: DocumentEntry,
        warning: Warning,
    },
    Skipped {
        path: String,
        warning: Warning,
    },
}

pub struct Pipeline {
    config: PipelineConfig,
    extractor: Extractor,
    cancelled: Arc<AtomicBool>,
}

impl Pipeline {
    pub fn new(config: PipelineConfig) -> Self {
        Self {
            config,
            extractor: Extractor::new(),
            cancelled: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Setting the flag stops scheduling new documents; in-flight ones finish.
    pub fn cancel_handle(&self) -> Arc<AtomicBool> {
        Arc::clone(&self.cancelled)
    }

    pub async fn run(&self, input: &Path, output: &Path) -> Result<BatchReport> {
        let started_at = Utc::now();
        let wall = TimedOperation::start();
        let run_id = Uuid::new_v4();

        let mut ingestor = Ingestor::open(input, self.config.ingest.clone())?;
        tokio::fs::create_dir_all(output)
            .await
            .with_context(|| format!("Failed to create output directory: {:?}", output))?;
        if let Some(nested) = nested_output(input, output) {
            ingestor = ingestor.exclude(nested);
        }
        let ingestor = Arc::new(ingestor);

        info!(%run_id, input = %input.display(), output = %output.display(), "Starting batch");

        let store = OutputStore::new(output, self.config.output.pretty);
        let previous = match store.read_file::<Vec<DocumentEntry>>(MANIFEST_FILE).await {
            Ok(previous) => previous,
            Err(e) => {
                warn!(error = %e, "Ignoring unreadable manifest from an earlier run");
                None
            }
        };

        let metrics = BatchMetrics::new();
        let semaphore = Arc::new(Semaphore::new(
            self.config.concurrency.max_concurrent_documents.max(1),
        ));
        let mut tasks = JoinSet::new();
        let mut warnings = Vec::new();
        // Relative paths (or subtrees) whose current state is unknown
        let mut unsettled: Vec<String> = Vec::new();
        let mut discovered = 0;
        let mut cancelled = false;

        for item in ingestor.scan() {
            if self.cancelled.load(Ordering::SeqCst) {
                cancelled = true;
                warn!("Cancellation requested, no further documents will be scheduled");
                break;
            }

            let file = match item {
                Ok(file) => file,
                Err(e) => {
                    let warning = Warning::from_ingest(ingestor.root(), &e);
                    unsettled.push(warning.path.clone());
                    warnings.push(warning);
                    continue;
                }
            };
            discovered += 1;

            let permit = Arc::clone(&semaphore)
                .acquire_owned()
                .await
                .context("Document semaphore closed")?;
            let ingestor = Arc::clone(&ingestor);
            let metrics = Arc::clone(&metrics);
            let extractor = self.extractor;

            tasks.spawn(async move {
                let _permit = permit;
                process_document(&ingestor, extractor, file, &metrics).await
            });
        }
        if cancelled {
            // Everything not yet scheduled
            unsettled.push(String::new());
        }

        // Barrier: the index needs every extraction result.
        let mut documents = Vec::new();
        let mut records = Vec::new();
        let mut processed = 0;

        while let Some(joined) = tasks.join_next().await {
            match joined.context("Document task panicked")? {
                DocumentOutcome::Extracted { entry, record } => {
                    processed += 1;
                    documents.push(entry);
                    records.extend(record);
                }
                DocumentOutcome::Failed { entry, warning } => {
                    documents.push(entry);
                    warnings.push(warning);
                }
                DocumentOutcome::Skipped { path, warning } => {
                    unsettled.push(path);
                    warnings.push(warning);
                }
            }
        }

        let carried = match &previous {
            Some(previous) if !unsettled.is_empty() => {
                carry_forward(&store, previous, &documents, &unsettled).await?
            }
            _ => Vec::new(),
        };
        let carried_forward = carried.len();
        for (entry, record) in carried {
            documents.push(entry);
            records.extend(record);
        }

        documents.sort_by(|a, b| a.path.cmp(&b.path));
        records.sort_by(|a, b| a.record_id.cmp(&b.record_id));
        warnings.sort_by(|a, b| a.path.cmp(&b.path));

        let index = Indexer::rebuild(&records, &documents)?;

        store.write_records(&records).await?;
        // Without an earlier manifest, unsettled documents cannot be told
        // apart from stale ones, so nothing is deleted.
        let records_removed = if previous.is_some() || unsettled.is_empty() {
            store.prune_records(&records).await?
        } else {
            warn!(
                unsettled = unsettled.len(),
                "No earlier manifest, keeping existing record files"
            );
            0
        };
        store.write_index(&index).await?;
        store.write_file(MANIFEST_FILE, &documents).await?;

        let summary = BatchSummary {
            run_id,
            input: input.to_path_buf(),
            output: output.to_path_buf(),
            started_at,
            finished_at: Utc::now(),
            cancelled,
            documents_discovered: discovered,
            documents_processed: processed,
            records_written: records.len(),
            documents_carried_forward: carried_forward,
            records_removed,
            index: index.stats(),
            metrics: metrics.snapshot(wall.elapsed()),
            warnings,
        };
        store.write_file(SUMMARY_FILE, &summary).await?;
        log_summary(&summary);

        Ok(BatchReport {
            summary,
            documents,
            records,
            index,
        })
    }
}

async fn process_document(
    ingestor: &Ingestor,
    extractor: Extractor,
    file: DiscoveredFile,
    metrics: &BatchMetrics,
) -> DocumentOutcome {
    let timer = TimedOperation::start();
    let document = match ingestor.load(&file).await {
        Ok(document) => document,
        Err(e) => {
            return DocumentOutcome::Skipped {
                warning: Warning::from_ingest(ingestor.root(), &e),
                path: file.relative_path,
            };
        }
    };
    metrics.record_read(timer.elapsed(), document.content().len() as u64);

    let entry = document.entry();
    let timer = TimedOperation::start();
    match extractor.extract_blocking(Arc::new(document)).await {
        Ok(record) => {
            metrics.record_extract(timer.elapsed(), record.is_some());
            DocumentOutcome::Extracted { entry, record }
        }
        Err(e) => DocumentOutcome::Failed {
            entry,
            warning: Warning::from_extract(&e),
        },
    }
}

/// Entries of the previous manifest that this run did not settle, with the
/// record each one had.
async fn carry_forward(
    store: &OutputStore,
    previous: &[DocumentEntry],
    settled: &[DocumentEntry],
    unsettled: &[String],
) -> Result<Vec<(DocumentEntry, Option<Record>)>> {
    let settled: HashSet<&str> = settled.iter().map(|d| d.path.as_str()).collect();
    let mut carried = Vec::new();

    for entry in previous {
        if settled.contains(entry.path.as_str())
            || !unsettled.iter().any(|prefix| covers(prefix, &entry.path))
        {
            continue;
        }

        let record_id = generate_record_id(&entry.doc_id, &entry.content_hash);
        let record = store.load_record(&record_id).await?;
        debug!(path = %entry.path, has_record = record.is_some(), "Carrying forward");
        carried.push((entry.clone(), record));
    }

    if !carried.is_empty() {
        info!(documents = carried.len(), "Kept earlier output for unsettled documents");
    }
    Ok(carried)
}

/// `prefix` names `path` itself or a directory above it. Empty covers all.
fn covers(prefix: &str, path: &str) -> bool {
    prefix.is_empty()
        || path == prefix
        || path
            .strip_prefix(prefix)
            .is_some_and(|rest| rest.starts_with('/'))
}

/// `output` spelled relative to `input` when it lives inside it, so the scan
/// never reads back its own records.
fn nested_output(input: &Path, output: &Path) -> Option<PathBuf> {
    let input_canonical = input.canonicalize().ok()?;
    let output_canonical = output.canonicalize().ok()?;
    let relative = output_canonical.strip_prefix(&input_canonical).ok()?;
    Some(input.join(relative))
}

fn log_summary(summary: &BatchSummary) {
    for warning in &summary.warnings {
        warn!(kind = ?warning.kind, path = %warning.path, "{}", warning.message);
    }

    info!(
        run_id = %summary.run_id,
        discovered = summary.documents_discovered,
        processed = summary.documents_processed,
        records = summary.records_written,
        carried = summary.documents_carried_forward,
        removed = summary.records_removed,
        warnings = summary.warnings.len(),
        cancelled = summary.cancelled,
        wall_time_ms = summary.metrics.wall_time_ms as u64,
        "Batch finished"
    );
}

/// Process exit status of `sds-index`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExitStatus {
    Success,
    InputNotFound,
    NothingProcessed,
    Failed,
}

impl ExitStatus {
    pub fn of(result: &Result<BatchReport>) -> Self {
        match result {
            Ok(report) if report.summary.documents_processed == 0 => Self::NothingProcessed,
            Ok(_) => Self::Success,
            Err(err) => match err.downcast_ref::<IngestError>() {
                Some(IngestError::NotFound(_)) => Self::InputNotFound,
                _ => Self::Failed,
            },
        }
    }

    pub fn code(self) -> u8 {
        match self {
            Self::Success => 0,
            Self::InputNotFound => 1,
            Self::NothingProcessed => 2,
            Self::Failed => 3,
        }
    }

    /// Log why a run ended the way it did.
    pub fn report(self, result: &Result<BatchReport>) {
        match (self, result) {
            (Self::NothingProcessed, _) => error!("No documents were processed successfully"),
            (_, Err(err)) => error!("Batch failed: {:#}", err),
            _ => {}
        }
    }
}

impl From<ExitStatus> for ExitCode {
    fn from(status: ExitStatus) -> Self {
        ExitCode::from(status.code())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_covers_path_and_subtree() {
        assert!(covers("", "any/file.txt"));
        assert!(covers("sheets/a.txt", "sheets/a.txt"));
        assert!(covers("sheets", "sheets/a.txt"));
        assert!(!covers("sheets", "sheets-old/a.txt"));
        assert!(!covers("sheets/a.txt", "sheets/a.txt.bak"));
    }

    #[test]
    fn test_exit_codes() {
        assert_eq!(ExitStatus::Success.code(), 0);
        assert_eq!(ExitStatus::InputNotFound.code(), 1);
        assert_eq!(ExitStatus::NothingProcessed.code(), 2);
        assert_eq!(ExitStatus::Failed.code(), 3);

        let err: Result<BatchReport> = Err(anyhow::anyhow!("disk full"));
        assert_eq!(ExitStatus::of(&err), ExitStatus::Failed);
    }
}
