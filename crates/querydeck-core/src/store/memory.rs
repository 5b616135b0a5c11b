//! In-memory document store
//!
//! Collections of JSON documents in a DashMap (per-shard locking, readers of
//! one collection never block writers of another). Evaluates query plans,
//! aggregation pipelines and index creation with the semantics a document
//! database gives them, minus durability.

use super::{CollectionStats, DocumentStore, IndexOutcome};
use crate::aggregation::{Pipeline, ProjectSpec, Projection, Stage};
use crate::config::PoolConfig;
use crate::error::CoreError;
use crate::indexes::IndexDescriptor;
use crate::query::params::parse_date;
use crate::query::{Filter, Predicate, QueryPlan, SortDirection};
use dashmap::DashMap;
use regex::{Regex, RegexBuilder};
use serde_json::{json, Map, Value};
use std::cmp::Ordering;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering as AtomicOrdering};
use tracing::debug;

/// Fields searched by a text predicate when the collection has no text index
const DEFAULT_TEXT_FIELDS: &[&str] = &["title", "description"];

pub struct MemoryStore {
    pool: PoolConfig,
    collections: DashMap<String, Vec<Value>>,
    indexes: DashMap<String, Vec<IndexDescriptor>>,
    next_id: AtomicU64,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::build(PoolConfig::default())
    }

    /// Construct with explicit pool options, validating them first
    pub fn connect(pool: PoolConfig) -> Result<Self, CoreError> {
        pool.validate()?;
        Ok(Self::build(pool))
    }

    fn build(pool: PoolConfig) -> Self {
        debug!(
            max_pool_size = pool.max_pool_size,
            min_pool_size = pool.min_pool_size,
            max_idle_time = ?pool.max_idle_time(),
            server_selection_timeout = ?pool.server_selection_timeout(),
            socket_timeout = ?pool.socket_timeout(),
            "Memory store created"
        );
        Self {
            pool,
            collections: DashMap::new(),
            indexes: DashMap::new(),
            next_id: AtomicU64::new(1),
        }
    }

    pub fn pool(&self) -> &PoolConfig {
        &self.pool
    }

    /// Insert a document, assigning an `_id` if it has none
    ///
    /// Returns the document's id rendered as a string.
    pub fn insert(&self, collection: &str, mut document: Value) -> String {
        if let Value::Object(map) = &mut document {
            if !map.contains_key("_id") {
                let id = format!("{:024x}", self.next_id.fetch_add(1, AtomicOrdering::Relaxed));
                map.insert("_id".to_string(), Value::String(id));
            }
        }
        let id = document
            .get("_id")
            .and_then(id_string)
            .unwrap_or_default();

        self.collections
            .entry(collection.to_string())
            .or_default()
            .push(document);
        id
    }

    /// Insert every document, returning how many were stored
    pub fn insert_many(&self, collection: &str, documents: impl IntoIterator<Item = Value>) -> usize {
        documents
            .into_iter()
            .map(|doc| self.insert(collection, doc))
            .count()
    }

    /// Names of the indexes present on a collection
    pub fn index_names(&self, collection: &str) -> Vec<String> {
        self.indexes
            .get(collection)
            .map(|list| list.iter().map(IndexDescriptor::name).collect())
            .unwrap_or_default()
    }

    pub fn collection_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.collections.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// Copy of a collection's documents (empty for unknown collections)
    fn documents(&self, collection: &str) -> Vec<Value> {
        self.collections
            .get(collection)
            .map(|docs| docs.value().clone())
            .unwrap_or_default()
    }

    fn text_fields(&self, collection: &str) -> Vec<String> {
        self.indexes
            .get(collection)
            .and_then(|list| {
                list.iter()
                    .find(|d| d.options.text_search)
                    .map(|d| d.text_fields().map(str::to_string).collect())
            })
            .unwrap_or_else(|| DEFAULT_TEXT_FIELDS.iter().map(|f| f.to_string()).collect())
    }

    fn matcher<'a>(&self, collection: &str, filter: &'a Filter) -> Result<Matcher<'a>, CoreError> {
        let text = match filter.iter().find_map(|(_, p)| match p {
            Predicate::Text(term) => Some(term),
            _ => None,
        }) {
            Some(term) => Some((text_regex(collection, term)?, self.text_fields(collection))),
            None => None,
        };
        Ok(Matcher { filter, text })
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

struct Matcher<'a> {
    filter: &'a Filter,
    text: Option<(Regex, Vec<String>)>,
}

impl Matcher<'_> {
    fn matches(&self, doc: &Value) -> bool {
        self.filter.iter().all(|(field, predicate)| match predicate {
            Predicate::Eq(expected) => doc.get(field).is_some_and(|v| value_matches(v, expected)),
            Predicate::ObjectId(id) => doc
                .get(field)
                .and_then(id_string)
                .is_some_and(|v| &v == id),
            Predicate::Range { gte, lte } => doc
                .get(field)
                .and_then(Value::as_str)
                .and_then(parse_date)
                .is_some_and(|ts| {
                    gte.is_none_or(|start| ts >= start) && lte.is_none_or(|end| ts <= end)
                }),
            Predicate::Text(_) => self.text.as_ref().is_some_and(|(regex, fields)| {
                fields
                    .iter()
                    .filter_map(|f| doc.get(f).and_then(Value::as_str))
                    .any(|text| regex.is_match(text))
            }),
        })
    }
}

/// Any whitespace-separated word of `term`, case-insensitive, at a word start
fn text_regex(collection: &str, term: &str) -> Result<Regex, CoreError> {
    let words: Vec<String> = term.split_whitespace().map(regex::escape).collect();
    RegexBuilder::new(&format!(r"\b(?:{})", words.join("|")))
        .case_insensitive(true)
        .build()
        .map_err(|e| CoreError::store(collection, format!("invalid text search: {}", e)))
}

/// Equality that also matches an element of an array field
fn value_matches(actual: &Value, expected: &Value) -> bool {
    actual == expected || actual.as_array().is_some_and(|items| items.contains(expected))
}

/// Render an id held as a string, `{"$oid": ...}` or a number
fn id_string(value: &Value) -> Option<String> {
    match value {
        Value::String(s) => Some(s.clone()),
        Value::Number(n) => Some(n.to_string()),
        Value::Object(map) => map.get("$oid").and_then(Value::as_str).map(str::to_string),
        _ => None,
    }
}

fn compare_values(a: Option<&Value>, b: Option<&Value>) -> Ordering {
    fn rank(value: Option<&Value>) -> u8 {
        match value {
            None | Some(Value::Null) => 0,
            Some(Value::Number(_)) => 1,
            Some(Value::String(_)) => 2,
            Some(Value::Object(_)) => 3,
            Some(Value::Array(_)) => 4,
            Some(Value::Bool(_)) => 5,
        }
    }

    match (a, b) {
        (Some(Value::Number(x)), Some(Value::Number(y))) => x
            .as_f64()
            .partial_cmp(&y.as_f64())
            .unwrap_or(Ordering::Equal),
        (Some(Value::String(x)), Some(Value::String(y))) => x.cmp(y),
        (Some(Value::Bool(x)), Some(Value::Bool(y))) => x.cmp(y),
        _ => rank(a).cmp(&rank(b)),
    }
}

fn project(doc: &Value, spec: &ProjectSpec) -> Value {
    let mut out = Map::new();
    for (output, projection) in spec.fields() {
        let value = match projection {
            Projection::Include => doc.get(output).cloned(),
            Projection::From(source) => doc.get(source).cloned(),
            Projection::Truncate { source, len } => doc.get(source).map(|v| match v {
                Value::String(s) => Value::String(s.chars().take(*len).collect()),
                other => other.clone(),
            }),
            Projection::Size { source } => Some(json!(doc
                .get(source)
                .and_then(Value::as_array)
                .map_or(0, Vec::len))),
        };
        if let Some(value) = value {
            out.insert(output.clone(), value);
        }
    }
    Value::Object(out)
}

impl MemoryStore {
    fn run_stage(&self, docs: Vec<Value>, stage: &Stage) -> Vec<Value> {
        match stage {
            Stage::Match { field, values } => docs
                .into_iter()
                .filter(|doc| {
                    doc.get(field)
                        .is_some_and(|v| values.iter().any(|expected| value_matches(v, expected)))
                })
                .collect(),
            Stage::Project(spec) => docs.iter().map(|doc| project(doc, spec)).collect(),
            Stage::Lookup {
                from,
                local_field,
                foreign_field,
                project: inner,
                as_field,
            } => {
                // Joined documents keep their _id unless the projection names it
                let inner = if inner.fields().iter().any(|(f, _)| f == "_id") {
                    inner.clone()
                } else {
                    inner
                        .fields()
                        .iter()
                        .fold(ProjectSpec::new().include("_id"), |spec, (output, projection)| {
                            spec.with(output, projection.clone())
                        })
                };
                let foreign = self.documents(from);

                docs.into_iter()
                    .map(|mut doc| {
                        let local = doc.get(local_field).and_then(id_string);
                        let joined: Vec<Value> = foreign
                            .iter()
                            .filter(|f| {
                                local.is_some()
                                    && f.get(foreign_field).and_then(id_string) == local
                            })
                            .map(|f| project(f, &inner))
                            .collect();
                        if let Value::Object(map) = &mut doc {
                            map.insert(as_field.clone(), Value::Array(joined));
                        }
                        doc
                    })
                    .collect()
            }
            Stage::Unwind {
                path,
                preserve_null_and_empty,
            } => docs
                .into_iter()
                .flat_map(|doc| unwind(doc, path, *preserve_null_and_empty))
                .collect(),
        }
    }
}

fn unwind(doc: Value, path: &str, preserve: bool) -> Vec<Value> {
    let Value::Object(mut map) = doc else {
        return Vec::new();
    };
    match map.remove(path) {
        Some(Value::Array(items)) if !items.is_empty() => items
            .into_iter()
            .map(|item| {
                let mut row = map.clone();
                row.insert(path.to_string(), item);
                Value::Object(row)
            })
            .collect(),
        Some(Value::Array(_)) | Some(Value::Null) | None => {
            if preserve {
                vec![Value::Object(map)]
            } else {
                Vec::new()
            }
        }
        Some(scalar) => {
            map.insert(path.to_string(), scalar);
            vec![Value::Object(map)]
        }
    }
}

impl DocumentStore for MemoryStore {
    fn find(&self, collection: &str, plan: &QueryPlan) -> Result<Vec<Value>, CoreError> {
        let matcher = self.matcher(collection, &plan.filter)?;
        let mut docs: Vec<Value> = self
            .documents(collection)
            .into_iter()
            .filter(|doc| matcher.matches(doc))
            .collect();

        let field = plan.sort.field.as_str();
        docs.sort_by(|a, b| {
            let ord = compare_values(a.get(field), b.get(field));
            match plan.sort.direction {
                SortDirection::Asc => ord,
                SortDirection::Desc => ord.reverse(),
            }
        });

        Ok(docs
            .into_iter()
            .skip(plan.pagination.offset as usize)
            .take(plan.pagination.limit as usize)
            .collect())
    }

    fn count(&self, collection: &str, filter: &Filter) -> Result<u64, CoreError> {
        let matcher = self.matcher(collection, filter)?;
        Ok(self
            .documents(collection)
            .iter()
            .filter(|doc| matcher.matches(doc))
            .count() as u64)
    }

    fn aggregate(&self, collection: &str, pipeline: &Pipeline) -> Result<Vec<Value>, CoreError> {
        Ok(pipeline
            .stages()
            .iter()
            .fold(self.documents(collection), |docs, stage| {
                self.run_stage(docs, stage)
            }))
    }

    fn create_index(&self, index: &IndexDescriptor) -> Result<IndexOutcome, CoreError> {
        let name = index.name();
        let failure = |reason: &str| CoreError::IndexCreation {
            collection: index.collection.clone(),
            name: name.clone(),
            reason: reason.to_string(),
        };

        if index.fields.is_empty() {
            return Err(failure("index has no fields"));
        }

        let docs = self.documents(&index.collection);
        let mut existing = self.indexes.entry(index.collection.clone()).or_default();

        if let Some(present) = existing.iter().find(|d| d.name() == name) {
            return if present == index {
                Ok(IndexOutcome::AlreadyExists)
            } else {
                Err(failure("an index with this name exists with different options"))
            };
        }

        if index.options.text_search && existing.iter().any(|d| d.options.text_search) {
            return Err(failure("collection already has a text index"));
        }

        if index.options.unique {
            let mut seen = HashSet::new();
            for doc in &docs {
                let key: Vec<Value> = index
                    .fields
                    .iter()
                    .map(|f| doc.get(&f.name).cloned().unwrap_or(Value::Null))
                    .collect();
                if !seen.insert(Value::Array(key).to_string()) {
                    return Err(failure("duplicate key in existing documents"));
                }
            }
        }

        existing.push(index.clone());
        Ok(IndexOutcome::Created)
    }

    fn collection_stats(&self, collection: &str) -> Result<CollectionStats, CoreError> {
        let docs = self.documents(collection);
        let approx_size_bytes = docs
            .iter()
            .map(|d| serde_json::to_vec(d).map(|b| b.len() as u64))
            .sum::<Result<u64, _>>()
            .map_err(|e| CoreError::store(collection, e.to_string()))?;

        Ok(CollectionStats {
            collection: collection.to_string(),
            documents: docs.len() as u64,
            indexes: self.indexes.get(collection).map_or(0, |list| list.len()),
            approx_size_bytes,
        })
    }
}
