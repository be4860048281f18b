use ingest::{Document, DocumentFormat};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ExtractError {
    #[error("{path} declares {format} but could not be parsed: {message}")]
    MalformedInput {
        doc_id: String,
        path: String,
        format: DocumentFormat,
        message: String,
    },

    #[error("extraction of {path} did not complete: {message}")]
    Aborted { path: String, message: String },
}

impl ExtractError {
    pub fn malformed(doc: &Document, message: impl Into<String>) -> Self {
        Self::MalformedInput {
            doc_id: doc.doc_id.clone(),
            path: doc.path.clone(),
            format: doc.format,
            message: message.into(),
        }
    }

    pub fn path(&self) -> &str {
        match self {
            Self::MalformedInput { path, .. } => path,
            Self::Aborted { path, .. } => path,
        }
    }
}
