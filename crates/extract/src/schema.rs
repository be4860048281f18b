use ingest::{Document, hash_bytes};
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

/// Normalized safety fields extracted from one document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Record {
    pub record_id: String,
    pub product_name: String,
    pub hazard_classes: BTreeSet<String>,
    pub first_aid: Option<String>,
    pub disposal: Option<String>,
    /// `doc_id` of the document this record was extracted from
    pub source_document: String,
}

/// Raw heuristic output before a record is committed to.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ExtractedFields {
    pub product_name: Option<String>,
    pub hazard_classes: BTreeSet<String>,
    pub first_aid: Option<String>,
    pub disposal: Option<String>,
}

impl ExtractedFields {
    /// A record needs a product name; without one the document yields nothing.
    pub fn into_record(self, doc: &Document) -> Option<Record> {
        let product_name = self.product_name.filter(|p| !p.is_empty())?;

        Some(Record {
            record_id: generate_record_id(&doc.doc_id, &doc.content_hash),
            product_name,
            hazard_classes: self.hazard_classes,
            first_aid: self.first_aid,
            disposal: self.disposal,
            source_document: doc.doc_id.clone(),
        })
    }
}

/// Changes whenever the source document's content changes, so a
/// re-extraction supersedes the previous record instead of overwriting it.
pub fn generate_record_id(doc_id: &str, content_hash: &str) -> String {
    let mut key = String::with_capacity(doc_id.len() + content_hash.len() + 1);
    key.push_str(doc_id);
    key.push(':');
    key.push_str(content_hash);
    hash_bytes(key.as_bytes())
}
