//! Index provisioning against a partially failing store

use querydeck_core::aggregation::Pipeline;
use querydeck_core::query::Filter;
use querydeck_core::store::{seed_demo, CollectionStats, IndexOutcome};
use querydeck_core::{
    analyze, provision, provision_required, CoreError, DocumentStore, ErrorSeverity,
    IndexCatalog, IndexDescriptor, MemoryStore, QueryPlan,
};
use serde_json::{json, Value};
use std::collections::HashSet;

/// Delegates to a memory store but refuses indexes on selected collections
struct FlakyStore {
    inner: MemoryStore,
    refused: HashSet<String>,
}

impl FlakyStore {
    fn refusing(collections: &[&str]) -> Self {
        Self {
            inner: MemoryStore::new(),
            refused: collections.iter().map(|c| c.to_string()).collect(),
        }
    }
}

impl DocumentStore for FlakyStore {
    fn find(&self, collection: &str, plan: &QueryPlan) -> Result<Vec<Value>, CoreError> {
        self.inner.find(collection, plan)
    }

    fn count(&self, collection: &str, filter: &Filter) -> Result<u64, CoreError> {
        self.inner.count(collection, filter)
    }

    fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<Value>, CoreError> {
        self.inner.aggregate(collection, pipeline)
    }

    fn create_index(&self, index: &IndexDescriptor) -> Result<IndexOutcome, CoreError> {
        if self.refused.contains(&index.collection) {
            return Err(CoreError::store(&index.collection, "not authorized"));
        }
        self.inner.create_index(index)
    }

    fn collection_stats(&self, collection: &str) -> Result<CollectionStats, CoreError> {
        if self.refused.contains(collection) {
            return Err(CoreError::store(collection, "not authorized"));
        }
        self.inner.collection_stats(collection)
    }
}

#[test]
fn test_failures_do_not_stop_provisioning() {
    let store = FlakyStore::refusing(&["approvals"]);
    let required = IndexCatalog::required_indexes();
    let refused = IndexCatalog::for_collection("approvals").len();

    let report = provision(&store, &required);

    assert_eq!(report.errors.len(), refused);
    assert_eq!(report.created, required.len() - refused);
    assert_eq!(report.attempted(), required.len());
    assert!(!report.is_complete());
    assert!(report.errors.iter().all(|e| e.source.starts_with("approvals.")));

    // The unique approvals index is an error, the rest are warnings
    let (warnings, errors) = report.error_count();
    assert_eq!(errors, 1);
    assert_eq!(warnings, refused - 1);
    assert!(report
        .errors
        .iter()
        .any(|e| e.severity == ErrorSeverity::Error && e.source == "approvals.activityId_1"));
}

#[test]
fn test_second_run_reports_existing() {
    let store = MemoryStore::new();
    seed_demo(&store, 10, 40);

    let first = provision_required(&store);
    assert!(first.is_complete());
    assert_eq!(first.already_present, 0);

    let second = provision_required(&store);
    assert_eq!(second.created, 0);
    assert_eq!(second.already_present, IndexCatalog::required_indexes().len());
}

#[test]
fn test_duplicate_emails_block_only_unique_index() {
    let store = MemoryStore::new();
    store.insert("users", json!({"email": "dup@campus.edu", "role": "student"}));
    store.insert("users", json!({"email": "dup@campus.edu", "role": "faculty"}));

    let report = provision(&store, &IndexCatalog::for_collection("users"));

    assert_eq!(report.errors.len(), 1);
    assert_eq!(report.errors[0].source, "users.email_1");
    assert_eq!(report.created, IndexCatalog::for_collection("users").len() - 1);
    assert!(!store.index_names("users").contains(&"email_1".to_string()));
}

#[test]
fn test_analysis_aborts_on_refused_collection() {
    let store = FlakyStore::refusing(&["portfolios"]);
    assert!(analyze(&store, &IndexCatalog::collections()).is_none());

    let allowed = vec!["users".to_string(), "activities".to_string()];
    let report = analyze(&store, &allowed).unwrap();
    assert_eq!(report.collections.len(), 2);
}
