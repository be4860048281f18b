use std::path::{Path, PathBuf};
use thiserror::Error;

/// Failures raised while discovering or reading source documents.
#[derive(Debug, Error)]
pub enum IngestError {
    #[error("input directory not found: {}", .0.display())]
    NotFound(PathBuf),

    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("timed out reading {} after {timeout_secs}s", path.display())]
    Timeout { path: PathBuf, timeout_secs: u64 },

    #[error("{} is {size} bytes, above the {limit} byte limit", path.display())]
    TooLarge { path: PathBuf, size: u64, limit: u64 },
}

impl IngestError {
    pub fn read(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Read {
            path: path.into(),
            source,
        }
    }

    /// Everything except a missing input root is skipped with a warning.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self, Self::NotFound(_))
    }

    pub fn path(&self) -> &Path {
        match self {
            Self::NotFound(path) => path,
            Self::Read { path, .. } => path,
            Self::Timeout { path, .. } => path,
            Self::TooLarge { path, .. } => path,
        }
    }
}
