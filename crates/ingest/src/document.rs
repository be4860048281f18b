use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::path::Path;

const UTF8_BOM: &[u8] = b"\xEF\xBB\xBF";

/// How the raw bytes of a document should be interpreted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DocumentFormat {
    Text,
    Json,
    Pdf,
    Binary,
}

impl DocumentFormat {
    /// Detect the format from the file extension, falling back to content sniffing.
    pub fn detect(path: &Path, content: &[u8]) -> Self {
        let extension = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "json" => Self::Json,
            "pdf" => Self::Pdf,
            "txt" | "text" | "md" | "csv" => Self::Text,
            _ if content.starts_with(b"%PDF-") => Self::Pdf,
            _ if std::str::from_utf8(content).is_ok() => Self::Text,
            _ => Self::Binary,
        }
    }
}

impl std::fmt::Display for DocumentFormat {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Self::Text => "text",
            Self::Json => "json",
            Self::Pdf => "pdf",
            Self::Binary => "binary",
        };
        f.write_str(name)
    }
}

/// One source file, immutable once ingested.
#[derive(Debug, Clone)]
pub struct Document {
    pub doc_id: String,
    /// Path relative to the input root, always `/` separated
    pub path: String,
    pub format: DocumentFormat,
    pub content_hash: String,
    pub discovered_at: DateTime<Utc>,
    content: Vec<u8>,
}

/// Everything about a document except its bytes; what the manifest stores.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DocumentEntry {
    pub doc_id: String,
    pub path: String,
    pub format: DocumentFormat,
    pub content_hash: String,
    pub size: u64,
    pub discovered_at: DateTime<Utc>,
}

impl Document {
    pub fn new(relative_path: &str, content: Vec<u8>, discovered_at: DateTime<Utc>) -> Self {
        let doc_id = generate_doc_id(relative_path);
        let content_hash = hash_bytes(&content);
        let format = DocumentFormat::detect(Path::new(relative_path), &content);

        Self {
            doc_id,
            path: relative_path.to_string(),
            format,
            content_hash,
            discovered_at,
            content,
        }
    }

    pub fn content(&self) -> &[u8] {
        &self.content
    }

    /// Content with a leading UTF-8 byte order mark removed. Sheets exported
    /// from spreadsheet tools often carry one.
    pub fn body(&self) -> &[u8] {
        self.content.strip_prefix(UTF8_BOM).unwrap_or(&self.content)
    }

    /// Body as text, replacing invalid UTF-8 sequences
    pub fn text_lossy(&self) -> std::borrow::Cow<'_, str> {
        String::from_utf8_lossy(self.body())
    }

    pub fn file_name(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or(&self.path)
    }

    pub fn entry(&self) -> DocumentEntry {
        DocumentEntry {
            doc_id: self.doc_id.clone(),
            path: self.path.clone(),
            format: self.format,
            content_hash: self.content_hash.clone(),
            size: self.content.len() as u64,
            discovered_at: self.discovered_at,
        }
    }
}

/// Generate a stable document ID from the path relative to the input root
pub fn generate_doc_id(relative_path: &str) -> String {
    hash_bytes(relative_path.as_bytes())
}

/// First 16 bytes of the SHA-256 digest, hex encoded (32 chars)
pub fn hash_bytes(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    let result = hasher.finalize();
    hex::encode(&result[..16])
}
