use chrono::{DateTime, Utc};
use std::io;
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::debug;
use walkdir::{DirEntry, WalkDir};

use crate::IngestConfig;
use crate::document::Document;
use crate::error::IngestError;
use crate::reader::FileReader;

/// A file found during a scan, not yet read.
#[derive(Debug, Clone)]
pub struct DiscoveredFile {
    pub path: PathBuf,
    pub relative_path: String,
    pub discovered_at: DateTime<Utc>,
}

/// Discovers and loads documents below a single input root.
pub struct Ingestor {
    root: PathBuf,
    config: IngestConfig,
    excluded: Vec<PathBuf>,
}

impl Ingestor {
    /// Fails with `NotFound` unless `root` is an existing directory.
    pub fn open(root: impl Into<PathBuf>, config: IngestConfig) -> Result<Self, IngestError> {
        let root = root.into();
        if !root.is_dir() {
            return Err(IngestError::NotFound(root));
        }
        Ok(Self {
            root,
            config,
            excluded: Vec::new(),
        })
    }

    /// Never descend into `path`; it must be spelled as `root` joined with a
    /// relative path, the way walked entries are.
    pub fn exclude(mut self, path: impl Into<PathBuf>) -> Self {
        self.excluded.push(path.into());
        self
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Lazily walk the input root in file-name order.
    ///
    /// Each call starts a fresh walk, so an unchanged directory always yields
    /// the same files in the same order. Entries that cannot be listed come
    /// through as recoverable `Read` errors.
    pub fn scan(&self) -> impl Iterator<Item = Result<DiscoveredFile, IngestError>> + '_ {
        let include_hidden = self.config.include_hidden;
        let excluded = &self.excluded;

        WalkDir::new(&self.root)
            .follow_links(false)
            .max_depth(self.config.max_depth)
            .sort_by_file_name()
            .into_iter()
            .filter_entry(move |entry| {
                if entry.depth() == 0 {
                    return true;
                }
                (include_hidden || !is_hidden(entry))
                    && !excluded.iter().any(|ex| entry.path().starts_with(ex))
            })
            .filter_map(move |entry| match entry {
                Ok(entry) => self.discovered(&entry).map(Ok),
                Err(err) => {
                    let path = err
                        .path()
                        .map(Path::to_path_buf)
                        .unwrap_or_else(|| self.root.clone());
                    Some(Err(IngestError::read(path, io::Error::from(err))))
                }
            })
    }

    /// Read a discovered file into a `Document`.
    pub async fn load(&self, file: &DiscoveredFile) -> Result<Document, IngestError> {
        let content =
            FileReader::read_file(&file.path, self.read_timeout(), self.config.max_file_size)
                .await?;
        debug!(path = %file.relative_path, bytes = content.len(), "Loaded document");
        Ok(Document::new(&file.relative_path, content, file.discovered_at))
    }

    fn read_timeout(&self) -> Duration {
        Duration::from_secs(self.config.read_timeout_secs)
    }

    fn discovered(&self, entry: &DirEntry) -> Option<DiscoveredFile> {
        if !entry.file_type().is_file() {
            return None;
        }

        if let Some(allowed) = &self.config.extensions {
            let extension = entry
                .path()
                .extension()
                .and_then(|e| e.to_str())
                .map(|e| e.to_ascii_lowercase())?;
            if !allowed.iter().any(|a| a.eq_ignore_ascii_case(&extension)) {
                return None;
            }
        }

        let relative = entry.path().strip_prefix(&self.root).ok()?;
        let relative_path = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy())
            .collect::<Vec<_>>()
            .join("/");

        Some(DiscoveredFile {
            path: entry.path().to_path_buf(),
            relative_path,
            discovered_at: Utc::now(),
        })
    }
}

fn is_hidden(entry: &DirEntry) -> bool {
    entry
        .file_name()
        .to_str()
        .map(|name| name.starts_with('.'))
        .unwrap_or(false)
}
