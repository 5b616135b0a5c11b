//! Query plans: filter predicate + sort + pagination
//!
//! Plans are built from a [`NormalizedQuery`] and render to the document
//! store's JSON dialect (`$oid`, `$gte`/`$lte`, `$search`, `{field: ±1}`).
//! The filter is kept in a `BTreeMap`, so identical input always serializes
//! to identical bytes.

use super::params::{normalize, NormalizedQuery, RawQuery, SortDirection};
use chrono::{DateTime, SecondsFormat, Utc};
use serde::ser::SerializeMap;
use serde::{Serialize, Serializer};
use serde_json::Value;
use std::collections::BTreeMap;

/// Field the date-range filter applies to
pub const DATE_RANGE_FIELD: &str = "startDate";

/// Filter key that carries a free-text search
pub const TEXT_SEARCH_KEY: &str = "$text";

/// One predicate fragment of a conjunctive filter
#[derive(Debug, Clone, PartialEq)]
pub enum Predicate {
    /// Field equals a literal
    Eq(Value),
    /// Field references another document by id
    ObjectId(String),
    /// Closed or half-open interval
    Range {
        gte: Option<DateTime<Utc>>,
        lte: Option<DateTime<Utc>>,
    },
    /// Free-text match against the collection's text index
    Text(String),
}

fn rfc3339(ts: &DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Millis, true)
}

impl Serialize for Predicate {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        match self {
            Predicate::Eq(value) => value.serialize(serializer),
            Predicate::ObjectId(id) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$oid", id)?;
                map.end()
            }
            Predicate::Range { gte, lte } => {
                let len = gte.is_some() as usize + lte.is_some() as usize;
                let mut map = serializer.serialize_map(Some(len))?;
                if let Some(gte) = gte {
                    map.serialize_entry("$gte", &rfc3339(gte))?;
                }
                if let Some(lte) = lte {
                    map.serialize_entry("$lte", &rfc3339(lte))?;
                }
                map.end()
            }
            Predicate::Text(term) => {
                let mut map = serializer.serialize_map(Some(1))?;
                map.serialize_entry("$search", term)?;
                map.end()
            }
        }
    }
}

/// Conjunction of predicate fragments keyed by field
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(transparent)]
pub struct Filter(BTreeMap<String, Predicate>);

impl Filter {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, field: impl Into<String>, predicate: Predicate) {
        self.0.insert(field.into(), predicate);
    }

    pub fn with(mut self, field: impl Into<String>, predicate: Predicate) -> Self {
        self.insert(field, predicate);
        self
    }

    pub fn get(&self, field: &str) -> Option<&Predicate> {
        self.0.get(field)
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = (&String, &Predicate)> {
        self.0.iter()
    }
}

/// Single-field sort
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SortSpec {
    pub field: String,
    pub direction: SortDirection,
}

impl Serialize for SortSpec {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut map = serializer.serialize_map(Some(1))?;
        map.serialize_entry(&self.field, &self.direction.as_i8())?;
        map.end()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Pagination {
    pub limit: u64,
    pub offset: u64,
}

impl Pagination {
    /// 1-based page this window starts on
    pub fn page(&self) -> u64 {
        self.offset / self.limit.max(1) + 1
    }
}

/// Validated, bounded description of one store query
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryPlan {
    pub filter: Filter,
    pub sort: SortSpec,
    pub pagination: Pagination,
    #[serde(skip)]
    params: BTreeMap<String, String>,
}

impl QueryPlan {
    /// Parameter map to feed [`generate_key`](crate::cache::generate_key)
    ///
    /// Rendered from the normalized input, so requests that normalize to the
    /// same plan share a cache key.
    pub fn cache_params(&self) -> &BTreeMap<String, String> {
        &self.params
    }

    /// Store-dialect JSON for logging and the CLI
    pub fn to_json(&self) -> Value {
        serde_json::to_value(self).unwrap_or(Value::Null)
    }
}

/// Build a plan from raw request parameters
///
/// Pure and total: never fails, never reads ambient state.
pub fn build_plan(raw: &RawQuery) -> QueryPlan {
    build_from_normalized(&normalize(raw))
}

pub fn build_from_normalized(query: &NormalizedQuery) -> QueryPlan {
    let mut filter = Filter::new();
    let mut params = BTreeMap::new();

    if let Some(id) = &query.student_id {
        filter.insert("studentId", Predicate::ObjectId(id.clone()));
        params.insert("studentId".to_string(), id.clone());
    }
    if let Some(status) = &query.status {
        filter.insert("status", Predicate::Eq(Value::String(status.clone())));
        params.insert("status".to_string(), status.clone());
    }
    if let Some(category) = &query.category {
        filter.insert("category", Predicate::Eq(Value::String(category.clone())));
        params.insert("category".to_string(), category.clone());
    }
    if query.start_date.is_some() || query.end_date.is_some() {
        filter.insert(
            DATE_RANGE_FIELD,
            Predicate::Range {
                gte: query.start_date,
                lte: query.end_date,
            },
        );
        if let Some(start) = &query.start_date {
            params.insert("startDate".to_string(), rfc3339(start));
        }
        if let Some(end) = &query.end_date {
            params.insert("endDate".to_string(), rfc3339(end));
        }
    }
    if let Some(term) = &query.search {
        filter.insert(TEXT_SEARCH_KEY, Predicate::Text(term.clone()));
        params.insert("search".to_string(), term.clone());
    }

    params.insert("page".to_string(), query.page.to_string());
    params.insert("limit".to_string(), query.limit.to_string());
    params.insert("sortBy".to_string(), query.sort_field.to_string());
    params.insert(
        "sortOrder".to_string(),
        query.sort_direction.as_str().to_string(),
    );

    QueryPlan {
        filter,
        sort: SortSpec {
            field: query.sort_field.to_string(),
            direction: query.sort_direction,
        },
        pagination: Pagination {
            limit: query.limit,
            offset: query.offset(),
        },
        params,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn test_scenario_page_two_sorted_by_title() {
        let raw = RawQuery {
            page: Some(2),
            limit: Some(15),
            sort_by: Some("title".to_string()),
            sort_order: Some("asc".to_string()),
            student_id: Some("abc123".to_string()),
            ..Default::default()
        };

        let plan = build_plan(&raw);

        assert_eq!(
            plan.filter.get("studentId"),
            Some(&Predicate::ObjectId("abc123".to_string()))
        );
        assert_eq!(plan.filter.len(), 1);
        assert_eq!(plan.pagination, Pagination { limit: 15, offset: 15 });
        assert_eq!(
            plan.to_json(),
            json!({
                "filter": {"studentId": {"$oid": "abc123"}},
                "sort": {"title": 1},
                "pagination": {"limit": 15, "offset": 15}
            })
        );
    }

    #[test]
    fn test_unknown_sort_defaults_descending_created_at() {
        let raw = RawQuery {
            sort_by: Some("unknownField".to_string()),
            ..Default::default()
        };
        let plan = build_plan(&raw);
        assert_eq!(plan.to_json()["sort"], json!({"createdAt": -1}));
    }

    #[test]
    fn test_limit_500_clamps_to_100() {
        let raw = RawQuery {
            limit: Some(500),
            page: Some(3),
            ..Default::default()
        };
        let plan = build_plan(&raw);
        assert_eq!(plan.pagination.limit, 100);
        assert_eq!(plan.pagination.offset, 200);
        assert_eq!(plan.pagination.page(), 3);
    }

    #[test]
    fn test_max_page_agrees_with_cache_params() {
        let raw: RawQuery =
            serde_json::from_value(json!({"page": "9223372036854775807", "limit": 100})).unwrap();
        let plan = build_plan(&raw);
        assert_eq!(plan.pagination.page(), crate::query::MAX_PAGE);
        assert_eq!(
            plan.cache_params()["page"],
            plan.pagination.page().to_string()
        );
    }

    #[test]
    fn test_absent_keys_produce_no_fragments() {
        let plan = build_plan(&RawQuery::default());
        assert!(plan.filter.is_empty());
        assert_eq!(plan.to_json()["filter"], json!({}));
    }

    #[test]
    fn test_half_open_date_range() {
        let raw = RawQuery {
            start_date: Some("2024-01-01".to_string()),
            ..Default::default()
        };
        let plan = build_plan(&raw);
        assert_eq!(
            plan.to_json()["filter"]["startDate"],
            json!({"$gte": "2024-01-01T00:00:00.000Z"})
        );

        let raw = RawQuery {
            start_date: Some("2024-01-01".to_string()),
            end_date: Some("2024-06-30".to_string()),
            ..Default::default()
        };
        let plan = build_plan(&raw);
        assert_eq!(
            plan.to_json()["filter"]["startDate"],
            json!({"$gte": "2024-01-01T00:00:00.000Z", "$lte": "2024-06-30T00:00:00.000Z"})
        );
    }

    #[test]
    fn test_all_filters_merge_into_one_map() {
        let raw = RawQuery {
            student_id: Some("s1".to_string()),
            status: Some("approved".to_string()),
            category: Some("sports".to_string()),
            end_date: Some("2024-12-31".to_string()),
            search: Some("relay".to_string()),
            ..Default::default()
        };
        let plan = build_plan(&raw);
        let keys: Vec<_> = plan.filter.iter().map(|(k, _)| k.as_str()).collect();
        assert_eq!(keys, vec!["$text", "category", "startDate", "status", "studentId"]);
        assert_eq!(plan.filter.get("$text"), Some(&Predicate::Text("relay".to_string())));
    }

    #[test]
    fn test_identical_input_identical_bytes() {
        let raw = RawQuery {
            status: Some("pending".to_string()),
            search: Some("chess club".to_string()),
            page: Some(4),
            ..Default::default()
        };
        let a = serde_json::to_string(&build_plan(&raw)).unwrap();
        let b = serde_json::to_string(&build_plan(&raw.clone())).unwrap();
        assert_eq!(a, b);
    }

    #[test]
    fn test_equivalent_inputs_share_cache_params() {
        let oversized = RawQuery {
            limit: Some(900),
            sort_by: Some("bogus".to_string()),
            ..Default::default()
        };
        let canonical = RawQuery {
            limit: Some(100),
            sort_by: Some("createdAt".to_string()),
            sort_order: Some("desc".to_string()),
            ..Default::default()
        };
        assert_eq!(
            build_plan(&oversized).cache_params(),
            build_plan(&canonical).cache_params()
        );
    }
}
