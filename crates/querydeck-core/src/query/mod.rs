//! Query planning from untrusted request parameters
//!
//! [`params`] defaults and clamps raw input; [`plan`] turns the result into a
//! filter + sort + pagination description ready for a [`DocumentStore`](crate::store::DocumentStore).

pub mod params;
pub mod plan;

pub use params::{
    normalize, NormalizedQuery, RawQuery, SortDirection, DEFAULT_LIMIT, MAX_LIMIT, MAX_PAGE,
    SORTABLE_FIELDS,
};
pub use plan::{build_plan, Filter, Pagination, Predicate, QueryPlan, SortSpec};
