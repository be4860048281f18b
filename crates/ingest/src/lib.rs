pub mod document;
pub mod error;
pub mod reader;
pub mod scanner;

pub use document::{Document, DocumentEntry, DocumentFormat, generate_doc_id, hash_bytes};
pub use error::IngestError;
pub use reader::FileReader;
pub use scanner::{DiscoveredFile, Ingestor};

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct IngestConfig {
    /// Maximum directory depth below the input root
    pub max_depth: usize,
    pub max_file_size: u64,
    /// Lowercase extensions to accept; `None` accepts every file
    pub extensions: Option<Vec<String>>,
    pub read_timeout_secs: u64,
    pub include_hidden: bool,
}

impl Default for IngestConfig {
    fn default() -> Self {
        Self {
            max_depth: 16,
            max_file_size: 64 * 1024 * 1024, // 64MB
            extensions: None,
            read_timeout_secs: 30,
            include_hidden: false,
        }
    }
}

/// Documents read from a directory plus the files that were skipped.
#[derive(Debug, Default)]
pub struct IngestOutcome {
    pub documents: Vec<Document>,
    pub skipped: Vec<IngestError>,
}

/// Ingest an entire directory sequentially
pub async fn ingest_directory(
    dir_path: &Path,
    config: IngestConfig,
) -> Result<IngestOutcome, IngestError> {
    let ingestor = Ingestor::open(dir_path, config)?;
    let mut outcome = IngestOutcome::default();

    for discovered in ingestor.scan() {
        let loaded = match discovered {
            Ok(file) => ingestor.load(&file).await,
            Err(e) => Err(e),
        };

        match loaded {
            Ok(doc) => outcome.documents.push(doc),
            Err(e) => {
                warn!(path = %e.path().display(), error = %e, "Skipping unreadable file");
                outcome.skipped.push(e);
            }
        }
    }

    info!(
        documents = outcome.documents.len(),
        skipped = outcome.skipped.len(),
        "Ingested directory"
    );
    Ok(outcome)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::BTreeSet;

    #[tokio::test]
    async fn test_rescan_yields_same_documents() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("a.txt"), "Product: A").unwrap();
        std::fs::write(dir.path().join("b.json"), "{\"product\": \"B\"}").unwrap();

        let first = ingest_directory(dir.path(), IngestConfig::default()).await.unwrap();
        let second = ingest_directory(dir.path(), IngestConfig::default()).await.unwrap();

        let ids = |o: &IngestOutcome| -> BTreeSet<String> {
            o.documents.iter().map(|d| d.doc_id.clone()).collect()
        };
        assert_eq!(ids(&first), ids(&second));
        assert_eq!(first.documents.len(), 2);
    }

    #[tokio::test]
    async fn test_oversized_files_are_skipped_not_fatal() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("small.txt"), "Product: A").unwrap();
        std::fs::write(dir.path().join("large.txt"), "x".repeat(256)).unwrap();

        let config = IngestConfig {
            max_file_size: 64,
            ..IngestConfig::default()
        };
        let outcome = ingest_directory(dir.path(), config).await.unwrap();

        assert_eq!(outcome.documents.len(), 1);
        assert_eq!(outcome.skipped.len(), 1);
        assert!(outcome.skipped[0].is_recoverable());
    }

    #[tokio::test]
    async fn test_empty_directory() {
        let dir = tempfile::tempdir().unwrap();
        let outcome = ingest_directory(dir.path(), IngestConfig::default()).await.unwrap();

        assert!(outcome.documents.is_empty());
        assert!(outcome.skipped.is_empty());
    }
}
