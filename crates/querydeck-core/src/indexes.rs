//! Declarative index catalog and start-up provisioning
//!
//! The catalog mirrors the query shapes the planner emits: equality on
//! `studentId`/`status`/`category`, ranges on `startDate`, sorts on the
//! whitelisted fields, and one text index for `search`.

use crate::error::{ProvisionError, ProvisionReport};
use crate::store::{DocumentStore, IndexOutcome};
use serde::Serialize;
use tracing::{debug, info, warn};

/// How a single field participates in an index
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum IndexKind {
    Ascending,
    Descending,
    Text,
}

impl IndexKind {
    fn suffix(self) -> &'static str {
        match self {
            IndexKind::Ascending => "1",
            IndexKind::Descending => "-1",
            IndexKind::Text => "text",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexField {
    pub name: String,
    pub kind: IndexKind,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IndexOptions {
    pub unique: bool,
    pub text_search: bool,
}

/// One index a store must maintain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct IndexDescriptor {
    pub collection: String,
    pub fields: Vec<IndexField>,
    pub options: IndexOptions,
}

impl IndexDescriptor {
    pub fn new(collection: impl Into<String>) -> Self {
        Self {
            collection: collection.into(),
            fields: Vec::new(),
            options: IndexOptions::default(),
        }
    }

    pub fn asc(self, field: &str) -> Self {
        self.field(field, IndexKind::Ascending)
    }

    pub fn desc(self, field: &str) -> Self {
        self.field(field, IndexKind::Descending)
    }

    /// Add a text-indexed field; marks the descriptor as a text index
    pub fn text(mut self, field: &str) -> Self {
        self.options.text_search = true;
        self.field(field, IndexKind::Text)
    }

    fn field(mut self, name: &str, kind: IndexKind) -> Self {
        self.fields.push(IndexField {
            name: name.to_string(),
            kind,
        });
        self
    }

    pub fn unique(mut self) -> Self {
        self.options.unique = true;
        self
    }

    /// Store-style name, e.g. `studentId_1_createdAt_-1` or `title_text_description_text`
    pub fn name(&self) -> String {
        self.fields
            .iter()
            .map(|f| format!("{}_{}", f.name, f.kind.suffix()))
            .collect::<Vec<_>>()
            .join("_")
    }

    /// Names of the text-indexed fields
    pub fn text_fields(&self) -> impl Iterator<Item = &str> {
        self.fields
            .iter()
            .filter(|f| f.kind == IndexKind::Text)
            .map(|f| f.name.as_str())
    }
}

/// Static catalog of required indexes
pub struct IndexCatalog;

impl IndexCatalog {
    /// Every index the store must hold, grouped by collection
    pub fn required_indexes() -> Vec<IndexDescriptor> {
        vec![
            // users
            IndexDescriptor::new("users").asc("email").unique(),
            IndexDescriptor::new("users").asc("role"),
            IndexDescriptor::new("users").asc("department").asc("role"),
            // activities
            IndexDescriptor::new("activities")
                .asc("studentId")
                .desc("createdAt"),
            IndexDescriptor::new("activities")
                .asc("studentId")
                .asc("status"),
            IndexDescriptor::new("activities")
                .asc("status")
                .desc("createdAt"),
            IndexDescriptor::new("activities").asc("category"),
            IndexDescriptor::new("activities").desc("startDate"),
            IndexDescriptor::new("activities")
                .text("title")
                .text("description"),
            // approvals
            IndexDescriptor::new("approvals").asc("activityId").unique(),
            IndexDescriptor::new("approvals")
                .asc("approverId")
                .asc("status"),
            IndexDescriptor::new("approvals")
                .asc("status")
                .desc("createdAt"),
            // portfolios
            IndexDescriptor::new("portfolios").asc("studentId").unique(),
            IndexDescriptor::new("portfolios").desc("updatedAt"),
        ]
    }

    /// Required indexes for one collection
    pub fn for_collection(collection: &str) -> Vec<IndexDescriptor> {
        Self::required_indexes()
            .into_iter()
            .filter(|d| d.collection == collection)
            .collect()
    }

    /// Distinct collections named by the catalog, in catalog order
    pub fn collections() -> Vec<String> {
        let mut names: Vec<String> = Vec::new();
        for descriptor in Self::required_indexes() {
            if !names.contains(&descriptor.collection) {
                names.push(descriptor.collection);
            }
        }
        names
    }
}

/// Apply `descriptors` against `store`
///
/// Idempotent: an index that already exists counts as success. A failing
/// index is logged and recorded, and the remaining ones are still applied.
pub fn provision(store: &dyn DocumentStore, descriptors: &[IndexDescriptor]) -> ProvisionReport {
    let report = apply(store, descriptors);
    log_summary(&report);
    report
}

/// Provision the full catalog, one collection at a time
pub fn provision_required(store: &dyn DocumentStore) -> ProvisionReport {
    let mut report = ProvisionReport::new();
    for collection in IndexCatalog::collections() {
        let part = apply(store, &IndexCatalog::for_collection(&collection));
        debug!(
            collection = %collection,
            created = part.created,
            failed = part.errors.len(),
            "Collection indexes applied"
        );
        report.merge(part);
    }
    log_summary(&report);
    report
}

fn apply(store: &dyn DocumentStore, descriptors: &[IndexDescriptor]) -> ProvisionReport {
    let mut report = ProvisionReport::new();

    for descriptor in descriptors {
        let source = format!("{}.{}", descriptor.collection, descriptor.name());
        match store.create_index(descriptor) {
            Ok(IndexOutcome::Created) => {
                debug!(index = %source, "Index created");
                report.created += 1;
            }
            Ok(IndexOutcome::AlreadyExists) => {
                debug!(index = %source, "Index already present");
                report.already_present += 1;
            }
            Err(e) => {
                warn!(index = %source, error = %e, "Index provisioning failed, continuing");
                let entry = if descriptor.options.unique {
                    ProvisionError::error(source, e.to_string())
                } else {
                    ProvisionError::warning(source, e.to_string())
                };
                report.add_error(entry);
            }
        }
    }

    report
}

fn log_summary(report: &ProvisionReport) {
    info!(
        created = report.created,
        already_present = report.already_present,
        failed = report.errors.len(),
        "Index provisioning complete"
    );
}
