//! Raw request parameters and the single place they get defaulted
//!
//! Request handlers hand over whatever arrived in the query string. Nothing
//! here rejects input: unknown sort fields, garbage numbers and oversized
//! limits are all mapped onto documented defaults by [`normalize`].

use chrono::{DateTime, NaiveDate, Utc};
use serde::de::IgnoredAny;
use serde::{Deserialize, Deserializer, Serialize};

/// Page size when the caller gives none (or a non-positive one)
pub const DEFAULT_LIMIT: u64 = 10;

/// Hard ceiling on page size
pub const MAX_LIMIT: u64 = 100;

/// Highest page accepted; keeps `(page - 1) * limit` within `u64`
pub const MAX_PAGE: u64 = u64::MAX / MAX_LIMIT;

/// Fields a caller may sort by
pub const SORTABLE_FIELDS: &[&str] = &[
    "createdAt",
    "updatedAt",
    "title",
    "startDate",
    "endDate",
    "status",
];

/// Sort field used when the caller's choice is not whitelisted
pub const DEFAULT_SORT_FIELD: &str = "createdAt";

/// The only token that selects ascending order
pub const ASCENDING_TOKEN: &str = "asc";

/// Loosely-typed query parameters as received from a request
#[derive(Debug, Clone, Default, PartialEq, Deserialize, Serialize)]
#[serde(rename_all = "camelCase", default)]
pub struct RawQuery {
    pub student_id: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub start_date: Option<String>,
    pub end_date: Option<String>,
    pub search: Option<String>,
    #[serde(deserialize_with = "lenient_int")]
    pub page: Option<i64>,
    #[serde(deserialize_with = "lenient_int")]
    pub limit: Option<i64>,
    pub sort_by: Option<String>,
    pub sort_order: Option<String>,
}

/// Accept numbers, numeric strings, or anything else (mapped to `None`)
fn lenient_int<'de, D>(deserializer: D) -> Result<Option<i64>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum Loose {
        Int(i64),
        Float(f64),
        Text(String),
        Other(IgnoredAny),
    }

    Ok(match Option::<Loose>::deserialize(deserializer)? {
        Some(Loose::Int(n)) => Some(n),
        Some(Loose::Float(f)) if f.is_finite() && f.fract() == 0.0 => Some(f as i64),
        Some(Loose::Text(s)) => s.trim().parse().ok(),
        _ => None,
    })
}

/// Sort direction
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SortDirection {
    Asc,
    Desc,
}

impl SortDirection {
    /// Store-side representation (`1` / `-1`)
    pub fn as_i8(self) -> i8 {
        match self {
            SortDirection::Asc => 1,
            SortDirection::Desc => -1,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            SortDirection::Asc => "asc",
            SortDirection::Desc => "desc",
        }
    }
}

/// Query parameters after defaulting and clamping
#[derive(Debug, Clone, PartialEq)]
pub struct NormalizedQuery {
    /// 1-based page number
    pub page: u64,
    /// Page size in `1..=MAX_LIMIT`
    pub limit: u64,
    /// Always one of [`SORTABLE_FIELDS`]
    pub sort_field: &'static str,
    pub sort_direction: SortDirection,
    pub student_id: Option<String>,
    pub status: Option<String>,
    pub category: Option<String>,
    pub start_date: Option<DateTime<Utc>>,
    pub end_date: Option<DateTime<Utc>>,
    pub search: Option<String>,
}

impl NormalizedQuery {
    /// Rows skipped before the current page
    pub fn offset(&self) -> u64 {
        self.page.saturating_sub(1).saturating_mul(self.limit)
    }
}

/// Default, clamp and parse every raw parameter
///
/// Rules:
/// - `limit`: missing, zero, negative or unparsable → 10; above 100 → 100
/// - `page`: anything but a positive integer → 1 (offset 0); above [`MAX_PAGE`] → [`MAX_PAGE`]
/// - `sortBy`: not in [`SORTABLE_FIELDS`] → `createdAt`
/// - `sortOrder`: exactly `"asc"` → ascending, anything else → descending
/// - text filters: blank strings are treated as absent
/// - dates: RFC 3339 or `YYYY-MM-DD` (midnight UTC); anything else is dropped
pub fn normalize(raw: &RawQuery) -> NormalizedQuery {
    let limit = match raw.limit {
        Some(n) if n > 0 => (n as u64).min(MAX_LIMIT),
        _ => DEFAULT_LIMIT,
    };

    let page = match raw.page {
        Some(n) if n > 0 => (n as u64).min(MAX_PAGE),
        _ => 1,
    };

    let sort_field = raw
        .sort_by
        .as_deref()
        .and_then(|field| SORTABLE_FIELDS.iter().copied().find(|f| *f == field))
        .unwrap_or(DEFAULT_SORT_FIELD);

    let sort_direction = if raw.sort_order.as_deref() == Some(ASCENDING_TOKEN) {
        SortDirection::Asc
    } else {
        SortDirection::Desc
    };

    NormalizedQuery {
        page,
        limit,
        sort_field,
        sort_direction,
        student_id: non_blank(&raw.student_id),
        status: non_blank(&raw.status),
        category: non_blank(&raw.category),
        start_date: raw.start_date.as_deref().and_then(parse_date),
        end_date: raw.end_date.as_deref().and_then(parse_date),
        search: non_blank(&raw.search),
    }
}

fn non_blank(value: &Option<String>) -> Option<String> {
    value
        .as_deref()
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(str::to_string)
}

/// Parse an RFC 3339 timestamp or a bare `YYYY-MM-DD` date
pub fn parse_date(input: &str) -> Option<DateTime<Utc>> {
    let input = input.trim();
    if let Ok(ts) = DateTime::parse_from_rfc3339(input) {
        return Some(ts.with_timezone(&Utc));
    }
    NaiveDate::parse_from_str(input, "%Y-%m-%d")
        .ok()
        .and_then(|d| d.and_hms_opt(0, 0, 0))
        .map(|dt| dt.and_utc())
}
