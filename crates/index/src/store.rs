use extract::Record;
use serde::Serialize;
use serde::de::DeserializeOwned;
use std::collections::HashSet;
use std::io;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::{debug, info};

use crate::error::IndexError;
use crate::{Index, Postings};

const RECORDS_DIR: &str = "records";
const INDEX_DIR: &str = "index";
const BY_PRODUCT_FILE: &str = "by_product.json";
const BY_HAZARD_FILE: &str = "by_hazard.json";

/// The on-disk output directory: one JSON file per record plus the index files.
pub struct OutputStore {
    root: PathBuf,
    pretty: bool,
}

impl OutputStore {
    pub fn new(root: impl Into<PathBuf>, pretty: bool) -> Self {
        Self {
            root: root.into(),
            pretty,
        }
    }

    pub fn records_dir(&self) -> PathBuf {
        self.root.join(RECORDS_DIR)
    }

    pub fn index_dir(&self) -> PathBuf {
        self.root.join(INDEX_DIR)
    }

    /// Write `records/<record_id>.json` for each record.
    pub async fn write_records(&self, records: &[Record]) -> Result<(), IndexError> {
        let dir = self.records_dir();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| IndexError::io(&dir, e))?;

        for record in records {
            self.write_json(&dir.join(record_file_name(&record.record_id)), record)
                .await?;
        }
        info!(written = records.len(), "Records written");
        Ok(())
    }

    /// Delete record files that are not part of `current`. Returns how many
    /// were removed.
    pub async fn prune_records(&self, current: &[Record]) -> Result<usize, IndexError> {
        let dir = self.records_dir();
        let keep: HashSet<String> = current
            .iter()
            .map(|r| record_file_name(&r.record_id))
            .collect();

        let mut entries = match fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == io::ErrorKind::NotFound => return Ok(0),
            Err(e) => return Err(IndexError::io(&dir, e)),
        };
        let mut removed = 0;

        while let Some(entry) = entries
            .next_entry()
            .await
            .map_err(|e| IndexError::io(&dir, e))?
        {
            let path = entry.path();
            if path.extension().and_then(|e| e.to_str()) != Some("json") {
                continue;
            }
            let name = entry.file_name().to_string_lossy().to_string();
            if keep.contains(&name) {
                continue;
            }

            fs::remove_file(&path)
                .await
                .map_err(|e| IndexError::io(&path, e))?;
            debug!(file = %name, "Removed superseded record");
            removed += 1;
        }

        if removed > 0 {
            info!(removed, "Pruned superseded records");
        }
        Ok(removed)
    }

    /// Replace both index files.
    pub async fn write_index(&self, index: &Index) -> Result<(), IndexError> {
        let dir = self.index_dir();
        fs::create_dir_all(&dir)
            .await
            .map_err(|e| IndexError::io(&dir, e))?;

        self.write_json(&dir.join(BY_PRODUCT_FILE), &index.by_product).await?;
        self.write_json(&dir.join(BY_HAZARD_FILE), &index.by_hazard).await?;
        Ok(())
    }

    pub async fn load_index(&self) -> Result<Index, IndexError> {
        let dir = self.index_dir();
        let by_product: Postings = read_json(&dir.join(BY_PRODUCT_FILE)).await?;
        let by_hazard: Postings = read_json(&dir.join(BY_HAZARD_FILE)).await?;
        Ok(Index {
            by_product,
            by_hazard,
        })
    }

    /// `None` when no record file with this id exists.
    pub async fn load_record(&self, record_id: &str) -> Result<Option<Record>, IndexError> {
        read_json_if_exists(&self.records_dir().join(record_file_name(record_id))).await
    }

    /// Read a JSON file relative to the output root; `None` when it is missing.
    pub async fn read_file<T: DeserializeOwned>(&self, path: &str) -> Result<Option<T>, IndexError> {
        read_json_if_exists(&self.root.join(path)).await
    }

    /// Write any serializable value at `path`, relative to the output root
    pub async fn write_file<T: Serialize>(&self, path: &str, value: &T) -> Result<(), IndexError> {
        fs::create_dir_all(&self.root)
            .await
            .map_err(|e| IndexError::io(&self.root, e))?;
        self.write_json(&self.root.join(path), value).await
    }

    async fn write_json<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<(), IndexError> {
        let mut bytes = if self.pretty {
            serde_json::to_vec_pretty(value)
        } else {
            serde_json::to_vec(value)
        }
        .map_err(|e| IndexError::json(path, e))?;
        bytes.push(b'\n');

        fs::write(path, bytes)
            .await
            .map_err(|e| IndexError::io(path, e))
    }
}

fn record_file_name(record_id: &str) -> String {
    format!("{}.json", record_id)
}

async fn read_json_if_exists<T: DeserializeOwned>(path: &Path) -> Result<Option<T>, IndexError> {
    match fs::read(path).await {
        Ok(bytes) => serde_json::from_slice(&bytes)
            .map(Some)
            .map_err(|e| IndexError::json(path, e)),
        Err(e) if e.kind() == io::ErrorKind::NotFound => Ok(None),
        Err(e) => Err(IndexError::io(path, e)),
    }
}

async fn read_json<T: DeserializeOwned>(path: &Path) -> Result<T, IndexError> {
    let bytes = fs::read(path).await.map_err(|e| IndexError::io(path, e))?;
    serde_json::from_slice(&bytes).map_err(|e| IndexError::json(path, e))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Indexer;
    use chrono::Utc;
    use extract::Extractor;
    use ingest::{Document, DocumentEntry};

    fn corpus() -> (Vec<DocumentEntry>, Vec<Record>) {
        let docs: Vec<Document> = [
            ("a.txt", "Product: Foo\nHazard: Flammable"),
            ("b.txt", "Product: Bar\nHazards: Flammable; Toxic"),
        ]
        .iter()
        .map(|(path, text)| Document::new(path, text.as_bytes().to_vec(), Utc::now()))
        .collect();
        let records = docs
            .iter()
            .filter_map(|d| Extractor::new().extract(d).unwrap())
            .collect();
        (docs.iter().map(Document::entry).collect(), records)
    }

    #[tokio::test]
    async fn test_index_files_are_byte_identical_across_rebuilds() {
        let (docs, records) = corpus();
        let first = tempfile::tempdir().unwrap();
        let second = tempfile::tempdir().unwrap();

        for dir in [first.path(), second.path()] {
            let store = OutputStore::new(dir, true);
            let index = Indexer::rebuild(&records, &docs).unwrap();
            store.write_index(&index).await.unwrap();
        }

        for file in [BY_PRODUCT_FILE, BY_HAZARD_FILE] {
            let a = std::fs::read(first.path().join(INDEX_DIR).join(file)).unwrap();
            let b = std::fs::read(second.path().join(INDEX_DIR).join(file)).unwrap();
            assert_eq!(a, b);
        }
    }

    #[tokio::test]
    async fn test_index_round_trip_supports_lookup() {
        let (docs, records) = corpus();
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path(), false);

        let index = Indexer::rebuild(&records, &docs).unwrap();
        store.write_index(&index).await.unwrap();
        let loaded = store.load_index().await.unwrap();

        assert_eq!(loaded, index);
        assert_eq!(loaded.lookup_hazard("Flammable").len(), 2);
        assert_eq!(loaded.lookup_hazard("Toxic").len(), 1);
    }

    #[tokio::test]
    async fn test_superseded_records_are_pruned() {
        let (_docs, records) = corpus();
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path(), true);

        store.write_records(&records).await.unwrap();
        assert_eq!(store.prune_records(&records).await.unwrap(), 0);
        assert_eq!(store.prune_records(&records[..1]).await.unwrap(), 1);

        let kept = store.load_record(&records[0].record_id).await.unwrap();
        assert_eq!(kept.as_ref(), Some(&records[0]));
        assert_eq!(store.load_record(&records[1].record_id).await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_missing_files_read_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let store = OutputStore::new(dir.path(), true);

        assert_eq!(store.prune_records(&[]).await.unwrap(), 0);
        let manifest: Option<Vec<DocumentEntry>> = store.read_file("documents.json").await.unwrap();
        assert!(manifest.is_none());

        std::fs::write(dir.path().join("documents.json"), "not json").unwrap();
        let err = store.read_file::<Vec<DocumentEntry>>("documents.json").await.unwrap_err();
        assert!(matches!(err, IndexError::Json { .. }));
    }
}
