//! Deterministic cache keys
//!
//! `prefix:name:value|name:value|...` with parameter names sorted, so two
//! parameter sets holding the same pairs in a different insertion order
//! always address the same entry.

use std::fmt::Display;

/// Separator between rendered `name:value` pairs
pub const PARAM_SEPARATOR: &str = "|";

/// Derive a cache key from a namespace and a parameter set
///
/// Values are rendered with `Display`. Callers must pass the same parameter
/// shape used to build the underlying query, typically
/// [`QueryPlan::cache_params`](crate::query::QueryPlan::cache_params).
pub fn generate_key<I, K, V>(prefix: &str, params: I) -> String
where
    I: IntoIterator<Item = (K, V)>,
    K: AsRef<str>,
    V: Display,
{
    let mut rendered: Vec<(String, String)> = params
        .into_iter()
        .map(|(k, v)| (k.as_ref().to_string(), v.to_string()))
        .collect();
    rendered.sort();

    let body = rendered
        .iter()
        .map(|(k, v)| format!("{}:{}", k, v))
        .collect::<Vec<_>>()
        .join(PARAM_SEPARATOR);

    format!("{}:{}", prefix, body)
}

/// Namespace portion of keys produced by [`generate_key`] for `prefix`
pub fn namespace(prefix: &str) -> String {
    format!("{}:", prefix)
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::{BTreeMap, HashMap};

    #[test]
    fn test_key_order_invariance() {
        let forward = generate_key("activities", [("a", 1), ("b", 2)]);
        let backward = generate_key("activities", [("b", 2), ("a", 1)]);
        assert_eq!(forward, backward);
        assert_eq!(forward, "activities:a:1|b:2");
    }

    #[test]
    fn test_hashmap_and_btreemap_agree() {
        let mut hashed = HashMap::new();
        hashed.insert("status", "approved");
        hashed.insert("page", "2");
        hashed.insert("limit", "15");

        let ordered: BTreeMap<_, _> = hashed.iter().map(|(k, v)| (*k, *v)).collect();

        assert_eq!(
            generate_key("q", &hashed),
            generate_key("q", &ordered)
        );
    }

    #[test]
    fn test_prefix_separates_namespaces() {
        let params = [("page", 1)];
        assert_ne!(generate_key("users", params), generate_key("activities", params));
        assert!(generate_key("users", params).starts_with(&namespace("users")));
    }

    #[test]
    fn test_different_values_different_keys() {
        assert_ne!(
            generate_key("q", [("page", 1)]),
            generate_key("q", [("page", 2)])
        );
    }

    #[test]
    fn test_empty_params() {
        assert_eq!(generate_key("report", Vec::<(&str, u8)>::new()), "report:");
    }
}
