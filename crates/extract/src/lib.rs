pub mod error;
pub mod fields;
pub mod normalizer;
pub mod pdf;
pub mod schema;
pub mod structured;

pub use error::ExtractError;
pub use normalizer::HazardNormalizer;
pub use schema::{ExtractedFields, Record, generate_record_id};

use ingest::{Document, DocumentFormat};
use std::sync::Arc;
use tracing::debug;

/// Turns a document into at most one record. Holds no state between documents.
#[derive(Debug, Clone, Copy, Default)]
pub struct Extractor;

impl Extractor {
    pub fn new() -> Self {
        Self
    }

    /// Extract the safety fields of one document.
    ///
    /// `Ok(None)` means nothing recognizable was found, which is not an
    /// error. Only a document that declares a structured format and fails to
    /// parse under it returns `MalformedInput`.
    pub fn extract(&self, doc: &Document) -> Result<Option<Record>, ExtractError> {
        let fields = match doc.format {
            DocumentFormat::Text => fields::extract_text_fields(&doc.text_lossy()),
            DocumentFormat::Json => structured::extract_json_fields(doc)?,
            DocumentFormat::Pdf => fields::extract_text_fields(&pdf::extract_pdf_text(doc)?),
            DocumentFormat::Binary => {
                debug!(path = %doc.path, "No text to extract from binary document");
                return Ok(None);
            }
        };

        let record = fields.into_record(doc);
        if record.is_none() {
            debug!(path = %doc.path, format = %doc.format, "No product name found");
        }
        Ok(record)
    }

    /// Run `extract` off the async executor; PDF parsing is CPU bound.
    pub async fn extract_blocking(
        &self,
        doc: Arc<Document>,
    ) -> Result<Option<Record>, ExtractError> {
        if doc.format != DocumentFormat::Pdf {
            return self.extract(&doc);
        }

        let extractor = *self;
        let path = doc.path.clone();
        tokio::task::spawn_blocking(move || extractor.extract(&doc))
            .await
            .map_err(|e| ExtractError::Aborted {
                path,
                message: e.to_string(),
            })?
    }
}
