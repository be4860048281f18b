use std::path::Path;
use std::time::Duration;
use tokio::fs;

use crate::error::IngestError;

pub struct FileReader;

impl FileReader {
    /// Read a whole file, bounded by `timeout` and `max_size`.
    ///
    /// The timeout covers the size check as well as the read, so a hung
    /// `stat` on a network mount is cut off too.
    pub async fn read_file(
        path: &Path,
        timeout: Duration,
        max_size: u64,
    ) -> Result<Vec<u8>, IngestError> {
        match tokio::time::timeout(timeout, read_bounded(path, max_size)).await {
            Ok(result) => result,
            Err(_) => Err(IngestError::Timeout {
                path: path.to_path_buf(),
                timeout_secs: timeout.as_secs(),
            }),
        }
    }
}

async fn read_bounded(path: &Path, max_size: u64) -> Result<Vec<u8>, IngestError> {
    let metadata = fs::metadata(path)
        .await
        .map_err(|e| IngestError::read(path, e))?;

    if metadata.len() > max_size {
        return Err(IngestError::TooLarge {
            path: path.to_path_buf(),
            size: metadata.len(),
            limit: max_size,
        });
    }

    fs::read(path).await.map_err(|e| IngestError::read(path, e))
}
