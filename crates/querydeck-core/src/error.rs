//! Error types for querydeck-core
//!
//! The layer's own operations are total. Errors here come from the store
//! boundary and configuration loading, and provisioning collects them into a
//! report instead of failing on the first one.

use std::path::PathBuf;
use thiserror::Error;

/// Core error type for querydeck operations
#[derive(Error, Debug)]
pub enum CoreError {
    // ===================
    // Store Errors
    // ===================
    #[error("Store operation failed on {collection}: {message}")]
    Store { collection: String, message: String },

    #[error("Collection not found: {collection}")]
    CollectionNotFound { collection: String },

    #[error("Failed to create index {name} on {collection}: {reason}")]
    IndexCreation {
        collection: String,
        name: String,
        reason: String,
    },

    // ===================
    // Config Errors
    // ===================
    #[error("Failed to read config: {path}")]
    ConfigRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("Failed to parse config in {path}")]
    ConfigParse {
        path: PathBuf,
        #[source]
        source: serde_json::Error,
    },

    #[error("Invalid configuration: {message}")]
    InvalidConfig { message: String },
}

impl CoreError {
    pub fn store(collection: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Store {
            collection: collection.into(),
            message: message.into(),
        }
    }
}

/// Severity level for a provisioning step
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorSeverity {
    /// Non-critical, the store still serves queries (unoptimized)
    Warning,
    /// The index is missing and a query shape will scan
    Error,
}

/// One failed step recorded in a [`ProvisionReport`]
#[derive(Debug, Clone)]
pub struct ProvisionError {
    /// `collection.index_name`
    pub source: String,
    pub message: String,
    pub severity: ErrorSeverity,
}

impl ProvisionError {
    pub fn warning(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            severity: ErrorSeverity::Warning,
        }
    }

    pub fn error(source: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            source: source.into(),
            message: message.into(),
            severity: ErrorSeverity::Error,
        }
    }
}

/// Outcome of an index provisioning run
///
/// Provisioning is partial-failure tolerant: every descriptor is attempted
/// and failures are collected here rather than aborting the run.
#[derive(Debug, Default)]
pub struct ProvisionReport {
    pub created: usize,
    pub already_present: usize,
    pub errors: Vec<ProvisionError>,
}

impl ProvisionReport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn add_error(&mut self, error: ProvisionError) {
        self.errors.push(error);
    }

    /// Number of descriptors attempted
    pub fn attempted(&self) -> usize {
        self.created + self.already_present + self.errors.len()
    }

    /// Returns true if every descriptor is in place
    pub fn is_complete(&self) -> bool {
        self.errors.is_empty()
    }

    /// Returns count by severity
    pub fn error_count(&self) -> (usize, usize) {
        let warnings = self
            .errors
            .iter()
            .filter(|e| e.severity == ErrorSeverity::Warning)
            .count();
        (warnings, self.errors.len() - warnings)
    }

    /// Merge another report into this one
    pub fn merge(&mut self, other: ProvisionReport) {
        self.created += other.created;
        self.already_present += other.already_present;
        self.errors.extend(other.errors);
    }
}
