//! Cached query execution
//!
//! Ties the planner, cache, metrics and a [`DocumentStore`] together:
//! plan -> key -> cache lookup -> timed store call -> cache fill -> shape.

use crate::aggregation::build_report_pipeline;
use crate::cache::{generate_key, namespace, CacheStats, TtlCache};
use crate::config::{DeckConfig, MetricsConfig};
use crate::error::CoreError;
use crate::indexes::IndexCatalog;
use crate::metrics::MetricRegistry;
use crate::query::{build_plan, RawQuery};
use crate::shaper::{shape, ShapeOptions};
use crate::store::DocumentStore;
use serde_json::{json, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, warn};

/// Metric recorded for every cache hit
pub const CACHE_HIT_METRIC: &str = "cache.hit";

/// Metric recorded for every report execution
pub const REPORT_METRIC: &str = "query.report";

/// Cache namespace of the activity report
pub const REPORT_CACHE_PREFIX: &str = "report";

/// Collection the report pipeline runs on
const REPORT_COLLECTION: &str = "activities";

pub struct QueryService {
    store: Arc<dyn DocumentStore>,
    cache: Arc<TtlCache<Value>>,
    metrics: Arc<MetricRegistry>,
    config: MetricsConfig,
    collections: Vec<String>,
}

impl QueryService {
    pub fn new(
        store: Arc<dyn DocumentStore>,
        cache: Arc<TtlCache<Value>>,
        metrics: Arc<MetricRegistry>,
        config: MetricsConfig,
    ) -> Self {
        Self {
            store,
            cache,
            metrics,
            config,
            collections: IndexCatalog::collections(),
        }
    }

    /// Build the cache and registry from configuration
    pub fn from_config(store: Arc<dyn DocumentStore>, config: &DeckConfig) -> Self {
        Self::new(
            store,
            Arc::new(TtlCache::from_config(&config.cache)),
            Arc::new(MetricRegistry::new()),
            config.metrics.clone(),
        )
    }

    /// Restrict the collections `fetch` accepts
    pub fn with_collections<I, S>(mut self, collections: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.collections = collections.into_iter().map(Into::into).collect();
        self
    }

    pub fn store(&self) -> &Arc<dyn DocumentStore> {
        &self.store
    }

    pub fn metrics(&self) -> &Arc<MetricRegistry> {
        &self.metrics
    }

    pub fn cache(&self) -> &Arc<TtlCache<Value>> {
        &self.cache
    }

    pub fn cache_stats(&self) -> CacheStats {
        self.cache.stats()
    }

    pub fn collections(&self) -> &[String] {
        &self.collections
    }

    /// Run a list query with caching
    ///
    /// The cached value is the unshaped `{data, pagination}` payload, so one
    /// entry serves every field selection of the same query.
    pub fn fetch(
        &self,
        collection: &str,
        raw: &RawQuery,
        options: &ShapeOptions,
    ) -> Result<Value, CoreError> {
        if !self.collections.iter().any(|c| c == collection) {
            return Err(CoreError::CollectionNotFound {
                collection: collection.to_string(),
            });
        }

        let plan = build_plan(raw);
        let key = generate_key(collection, plan.cache_params());

        let hit_timer = self.metrics.start_scoped(CACHE_HIT_METRIC);
        if let Some(cached) = self.cache.get(&key) {
            self.metrics.end_scoped(&hit_timer);
            debug!(key = %key, "Cache hit");
            return Ok(shape_payload(cached, options));
        }
        self.metrics.cancel_scoped(&hit_timer);
        debug!(key = %key, "Cache miss");

        let timer = self.metrics.start_scoped(&format!("query.{}", collection));
        let result = self
            .store
            .find(collection, &plan)
            .and_then(|docs| Ok((docs, self.store.count(collection, &plan.filter)?)));
        let elapsed = self.metrics.end_scoped(&timer);
        let (docs, total) = result?;

        self.warn_if_slow(collection, elapsed);

        let payload = json!({
            "data": docs,
            "pagination": {
                "page": plan.pagination.page(),
                "limit": plan.pagination.limit,
                "offset": plan.pagination.offset,
                "total": total,
            },
        });

        self.cache.set(key, payload.clone());
        self.cache.maintain();

        Ok(shape_payload(payload, options))
    }

    /// Activity report rows, cached under their own namespace
    pub fn report(&self) -> Result<Value, CoreError> {
        let key = generate_key(REPORT_CACHE_PREFIX, std::iter::empty::<(&str, &str)>());
        if let Some(cached) = self.cache.get(&key) {
            debug!(key = %key, "Report cache hit");
            return Ok(cached);
        }

        let pipeline = build_report_pipeline();
        let timer = self.metrics.start_scoped(REPORT_METRIC);
        let result = self.store.aggregate(REPORT_COLLECTION, &pipeline);
        let elapsed = self.metrics.end_scoped(&timer);
        let rows = Value::Array(result?);

        self.warn_if_slow(REPORT_METRIC, elapsed);
        self.cache.set(key, rows.clone());
        self.cache.maintain();
        Ok(rows)
    }

    /// Drop every cached entry for a collection
    ///
    /// Invalidating the report's source collection drops the report too.
    pub fn invalidate(&self, collection: &str) -> usize {
        let mut removed = self.cache.delete_prefix(&namespace(collection));
        if collection == REPORT_COLLECTION {
            removed += self.cache.delete_prefix(&namespace(REPORT_CACHE_PREFIX));
        }
        debug!(collection, removed, "Cache invalidated");
        removed
    }

    pub fn clear_cache(&self) {
        self.cache.clear();
    }

    fn warn_if_slow(&self, operation: &str, elapsed: Option<Duration>) {
        if let Some(elapsed) = elapsed {
            let threshold = Duration::from_millis(self.config.slow_query_ms);
            if elapsed > threshold {
                warn!(
                    operation,
                    elapsed_ms = elapsed.as_millis() as u64,
                    threshold_ms = self.config.slow_query_ms,
                    "Slow query"
                );
            }
        }
    }
}

fn shape_payload(mut payload: Value, options: &ShapeOptions) -> Value {
    if options.is_passthrough() {
        return payload;
    }
    if let Some(data) = payload.get_mut("data") {
        *data = shape(data.take(), options);
    }
    payload
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::ManualClock;
    use crate::config::CacheConfig;
    use crate::store::MemoryStore;

    fn service() -> (QueryService, Arc<MemoryStore>) {
        let store = Arc::new(MemoryStore::new());
        store.insert(
            "activities",
            json!({"_id": "a1", "title": "Robotics", "status": "approved", "secret": "x",
                   "createdAt": "2024-01-01"}),
        );
        store.insert(
            "activities",
            json!({"_id": "a2", "title": "Chess", "status": "pending", "createdAt": "2024-01-02"}),
        );
        let service = QueryService::from_config(store.clone(), &DeckConfig::default());
        (service, store)
    }

    #[test]
    fn test_miss_then_hit() {
        let (service, store) = service();
        let raw = RawQuery::default();

        let first = service.fetch("activities", &raw, &ShapeOptions::new()).unwrap();
        assert_eq!(first["data"].as_array().unwrap().len(), 2);
        assert_eq!(first["pagination"]["total"], 2);

        // A new document is invisible until the cache entry goes away
        store.insert("activities", json!({"_id": "a3", "title": "Drama", "createdAt": "2024-01-03"}));
        let second = service.fetch("activities", &raw, &ShapeOptions::new()).unwrap();
        assert_eq!(first, second);

        let stats = service.cache_stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);

        let snapshot = service.metrics().snapshot();
        assert_eq!(snapshot["query.activities"].count, 1);
        assert_eq!(snapshot[CACHE_HIT_METRIC].count, 1);
    }

    #[test]
    fn test_shape_applies_to_cached_payload() {
        let (service, _) = service();
        let raw = RawQuery::default();
        service.fetch("activities", &raw, &ShapeOptions::new()).unwrap();

        let shaped = service
            .fetch("activities", &raw, &ShapeOptions::new().exclude(["secret"]))
            .unwrap();
        assert!(shaped["data"][0].get("secret").is_none() && shaped["data"][1].get("secret").is_none());
        assert_eq!(shaped["pagination"]["limit"], 10);
    }

    #[test]
    fn test_invalidate_forces_refetch() {
        let (service, store) = service();
        let raw = RawQuery::default();
        service.fetch("activities", &raw, &ShapeOptions::new()).unwrap();
        service.report().unwrap();

        store.insert("activities", json!({"_id": "a3", "title": "Drama", "createdAt": "2024-01-03"}));
        assert_eq!(service.invalidate("activities"), 2);

        let fresh = service.fetch("activities", &raw, &ShapeOptions::new()).unwrap();
        assert_eq!(fresh["pagination"]["total"], 3);
    }

    #[test]
    fn test_unknown_collection_rejected() {
        let (service, _) = service();
        let err = service
            .fetch("sessions", &RawQuery::default(), &ShapeOptions::new())
            .unwrap_err();
        assert!(matches!(err, CoreError::CollectionNotFound { .. }));
    }

    #[test]
    fn test_report_cached_and_timed() {
        let (service, _) = service();
        let first = service.report().unwrap();
        let second = service.report().unwrap();
        assert_eq!(first, second);
        assert_eq!(first.as_array().unwrap().len(), 2);
        assert_eq!(service.metrics().snapshot()[REPORT_METRIC].count, 1);
    }

    #[test]
    fn test_cached_entry_expires_with_ttl() {
        let clock = Arc::new(ManualClock::new());
        let store = Arc::new(MemoryStore::new());
        store.insert("users", json!({"_id": "u1", "name": "Ada", "createdAt": "2024-01-01"}));

        let config = CacheConfig {
            default_ttl_secs: 60,
            ..CacheConfig::default()
        };
        let service = QueryService::new(
            store.clone(),
            Arc::new(TtlCache::with_clock(&config, clock.clone())),
            Arc::new(MetricRegistry::with_clock(clock.clone())),
            MetricsConfig::default(),
        );

        let raw = RawQuery::default();
        service.fetch("users", &raw, &ShapeOptions::new()).unwrap();
        store.insert("users", json!({"_id": "u2", "name": "Grace", "createdAt": "2024-01-02"}));

        clock.advance(Duration::from_secs(60));
        let cached = service.fetch("users", &raw, &ShapeOptions::new()).unwrap();
        assert_eq!(cached["pagination"]["total"], 1);

        clock.advance(Duration::from_secs(1));
        let fresh = service.fetch("users", &raw, &ShapeOptions::new()).unwrap();
        assert_eq!(fresh["pagination"]["total"], 2);
    }
}
