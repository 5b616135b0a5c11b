//! Storage statistics across collections

use crate::store::{CollectionStats, DocumentStore};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{error, info};

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageReport {
    pub collections: Vec<CollectionStats>,
    pub total_documents: u64,
    pub total_indexes: usize,
    pub total_size_bytes: u64,
    pub generated_at: DateTime<Utc>,
}

impl StorageReport {
    pub fn get(&self, collection: &str) -> Option<&CollectionStats> {
        self.collections.iter().find(|c| c.collection == collection)
    }
}

/// Collect per-collection statistics
///
/// Any store failure aborts the whole analysis: it is logged and `None` is
/// returned, never a partial report.
pub fn analyze(store: &dyn DocumentStore, collections: &[String]) -> Option<StorageReport> {
    let stats = match collections
        .iter()
        .map(|c| store.collection_stats(c))
        .collect::<Result<Vec<_>, _>>()
    {
        Ok(stats) => stats,
        Err(e) => {
            error!(error = %e, "Storage analysis failed");
            return None;
        }
    };

    let report = StorageReport {
        total_documents: stats.iter().map(|s| s.documents).sum(),
        total_indexes: stats.iter().map(|s| s.indexes).sum(),
        total_size_bytes: stats.iter().map(|s| s.approx_size_bytes).sum(),
        collections: stats,
        generated_at: Utc::now(),
    };
    info!(
        collections = report.collections.len(),
        documents = report.total_documents,
        indexes = report.total_indexes,
        "Storage analysis complete"
    );
    Some(report)
}
