pub mod error;
pub mod store;

pub use error::IndexError;
pub use store::OutputStore;

use extract::Record;
use ingest::DocumentEntry;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashSet};
use tracing::info;

/// Lookup key -> record identifiers. Ordered maps keep the serialized form
/// byte-identical across rebuilds of the same record set.
pub type Postings = BTreeMap<String, BTreeSet<String>>;

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Index {
    pub by_product: Postings,
    pub by_hazard: Postings,
}

impl Index {
    /// Exact-match lookup by product name
    pub fn lookup_product(&self, product_name: &str) -> BTreeSet<String> {
        self.by_product.get(product_name).cloned().unwrap_or_default()
    }

    /// Exact-match lookup by hazard class
    pub fn lookup_hazard(&self, hazard_class: &str) -> BTreeSet<String> {
        self.by_hazard.get(hazard_class).cloned().unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.by_product.is_empty() && self.by_hazard.is_empty()
    }

    pub fn stats(&self) -> IndexStats {
        let records: BTreeSet<&String> = self.by_product.values().flatten().collect();

        IndexStats {
            records: records.len(),
            products: self.by_product.len(),
            hazard_classes: self.by_hazard.len(),
        }
    }
}

/// Builds an `Index` from the complete record set. Always from scratch.
pub struct Indexer;

impl Indexer {
    /// Rebuild the index over `records`.
    ///
    /// Every record must point at one of `documents`, and no document may
    /// own more than one record; either violation is an `IndexError::Consistency`.
    pub fn rebuild(records: &[Record], documents: &[DocumentEntry]) -> Result<Index, IndexError> {
        let known: HashSet<&str> = documents.iter().map(|d| d.doc_id.as_str()).collect();
        let mut seen_sources: HashSet<&str> = HashSet::with_capacity(records.len());
        let mut index = Index::default();

        for record in records {
            if !known.contains(record.source_document.as_str()) {
                return Err(IndexError::Consistency {
                    record_id: record.record_id.clone(),
                    details: format!("source document {} does not exist", record.source_document),
                });
            }
            if !seen_sources.insert(record.source_document.as_str()) {
                return Err(IndexError::Consistency {
                    record_id: record.record_id.clone(),
                    details: format!(
                        "document {} already has a record",
                        record.source_document
                    ),
                });
            }

            index
                .by_product
                .entry(record.product_name.clone())
                .or_default()
                .insert(record.record_id.clone());

            for hazard in &record.hazard_classes {
                index
                    .by_hazard
                    .entry(hazard.clone())
                    .or_default()
                    .insert(record.record_id.clone());
            }
        }

        let stats = index.stats();
        info!(
            records = stats.records,
            products = stats.products,
            hazard_classes = stats.hazard_classes,
            "Index rebuilt"
        );
        Ok(index)
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct IndexStats {
    pub records: usize,
    pub products: usize,
    pub hazard_classes: usize,
}
