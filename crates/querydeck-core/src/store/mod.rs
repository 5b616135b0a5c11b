//! Document store port
//!
//! The layer never talks to a database directly. Callers provide a
//! [`DocumentStore`]; [`MemoryStore`] is the in-process implementation used by
//! the CLI, the web demo and the tests.

pub mod fixtures;
pub mod memory;

pub use fixtures::{seed_demo, SeedSummary};
pub use memory::MemoryStore;

use crate::aggregation::Pipeline;
use crate::error::CoreError;
use crate::indexes::IndexDescriptor;
use crate::query::{Filter, QueryPlan};
use serde::Serialize;
use serde_json::Value;

/// Result of applying one index
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IndexOutcome {
    Created,
    AlreadyExists,
}

/// Size figures for one collection
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CollectionStats {
    pub collection: String,
    pub documents: u64,
    pub indexes: usize,
    pub approx_size_bytes: u64,
}

/// Query execution backend
pub trait DocumentStore: Send + Sync {
    /// Run a plan: filter, sort, then skip/limit
    fn find(&self, collection: &str, plan: &QueryPlan) -> Result<Vec<Value>, CoreError>;

    /// Count documents matching a filter (ignores pagination)
    fn count(&self, collection: &str, filter: &Filter) -> Result<u64, CoreError>;

    fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<Value>, CoreError>;

    /// Create an index; an identical existing index is not an error
    fn create_index(&self, index: &IndexDescriptor) -> Result<IndexOutcome, CoreError>;

    fn collection_stats(&self, collection: &str) -> Result<CollectionStats, CoreError>;
}
