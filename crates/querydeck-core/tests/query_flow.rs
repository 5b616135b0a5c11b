//! End-to-end query flow over the in-memory store

use querydeck_core::store::seed_demo;
use querydeck_core::{
    CacheConfig, DeckConfig, EvictionMode, MemoryStore, MetricRegistry, MetricsConfig,
    QueryService, RawQuery, ShapeOptions, TtlCache,
};
use serde_json::Value;
use std::sync::Arc;
use std::thread;

fn seeded_service(config: &DeckConfig) -> QueryService {
    let store = Arc::new(MemoryStore::new());
    seed_demo(&store, 20, 300);
    QueryService::from_config(store, config)
}

fn titles(payload: &Value) -> Vec<String> {
    payload["data"]
        .as_array()
        .map(|rows| {
            rows.iter()
                .filter_map(|r| r["title"].as_str().map(str::to_string))
                .collect()
        })
        .unwrap_or_default()
}

#[test]
fn test_student_page_sorted_by_title() {
    let service = seeded_service(&DeckConfig::default());
    let raw = RawQuery {
        student_id: Some("stu00003".to_string()),
        page: Some(2),
        limit: Some(5),
        sort_by: Some("title".to_string()),
        sort_order: Some("asc".to_string()),
        ..RawQuery::default()
    };

    let payload = service
        .fetch("activities", &raw, &ShapeOptions::new().essential())
        .unwrap();

    // 300 activities spread over 20 students
    assert_eq!(payload["pagination"]["total"], 15);
    assert_eq!(payload["pagination"]["page"], 2);
    assert_eq!(payload["pagination"]["offset"], 5);

    let page = titles(&payload);
    assert_eq!(page.len(), 5);
    let mut sorted = page.clone();
    sorted.sort();
    assert_eq!(page, sorted);

    let row = payload["data"][0].as_object().unwrap();
    assert!(row.contains_key("status") && !row.contains_key("studentId"));
}

#[test]
fn test_equivalent_requests_share_cache_entry() {
    let service = seeded_service(&DeckConfig::default());

    let explicit = RawQuery {
        page: Some(1),
        limit: Some(10),
        sort_by: Some("createdAt".to_string()),
        sort_order: Some("desc".to_string()),
        ..RawQuery::default()
    };
    let clamped = RawQuery {
        page: Some(-3),
        limit: Some(0),
        sort_by: Some("passwordHash".to_string()),
        ..RawQuery::default()
    };

    let a = service.fetch("activities", &explicit, &ShapeOptions::new()).unwrap();
    let b = service.fetch("activities", &clamped, &ShapeOptions::new()).unwrap();

    assert_eq!(a, b);
    assert_eq!(service.cache_stats().hits, 1);
    assert_eq!(service.cache_stats().entries, 1);
}

#[test]
fn test_filters_and_search() {
    let service = seeded_service(&DeckConfig::default());
    let raw = RawQuery {
        status: Some("approved".to_string()),
        category: Some("tech".to_string()),
        search: Some("robotics".to_string()),
        limit: Some(100),
        ..RawQuery::default()
    };

    let payload = service
        .fetch("activities", &raw, &ShapeOptions::new().include(["title", "status", "category"]))
        .unwrap();
    let rows = payload["data"].as_array().unwrap();
    assert!(!rows.is_empty());
    for row in rows {
        assert_eq!(row["status"], "approved");
        assert_eq!(row["category"], "tech");
        assert!(row["title"].as_str().unwrap().starts_with("Robotics Club"));
        assert_eq!(row.as_object().unwrap().len(), 3);
    }
}

#[test]
fn test_size_threshold_clears_cache() {
    let config = DeckConfig {
        cache: CacheConfig {
            max_entries: 5,
            ..CacheConfig::default()
        },
        ..DeckConfig::default()
    };
    let service = seeded_service(&config);

    for page in 1..=6 {
        let raw = RawQuery {
            page: Some(page),
            ..RawQuery::default()
        };
        service.fetch("activities", &raw, &ShapeOptions::new()).unwrap();
    }

    let stats = service.cache_stats();
    assert_eq!(stats.size_clears, 1);
    assert_eq!(stats.entries, 0);
}

#[test]
fn test_lru_policy_evicts_per_key() {
    let config = CacheConfig {
        max_entries: 5,
        eviction: EvictionMode::Lru,
        ..CacheConfig::default()
    };
    let store = Arc::new(MemoryStore::new());
    seed_demo(&store, 20, 300);
    let service = QueryService::new(
        store,
        Arc::new(TtlCache::from_config(&config)),
        Arc::new(MetricRegistry::new()),
        MetricsConfig::default(),
    );

    for page in 1..=20 {
        let raw = RawQuery {
            page: Some(page),
            ..RawQuery::default()
        };
        service.fetch("activities", &raw, &ShapeOptions::new()).unwrap();
    }

    let stats = service.cache_stats();
    assert_eq!(stats.size_clears, 0);
    assert!(stats.entries <= 5);
}

#[test]
fn test_concurrent_fetches_record_every_query() {
    let service = Arc::new(seeded_service(&DeckConfig::default()));

    thread::scope(|scope| {
        for worker in 0..8 {
            let service = Arc::clone(&service);
            scope.spawn(move || {
                let raw = RawQuery {
                    page: Some(worker + 1),
                    ..RawQuery::default()
                };
                service.fetch("activities", &raw, &ShapeOptions::new()).unwrap();
            });
        }
    });

    let snapshot = service.metrics().snapshot();
    assert_eq!(snapshot["query.activities"].count, 8);
    assert_eq!(service.metrics().active_timers(), 0);
}

#[test]
fn test_report_rows_carry_student() {
    let service = seeded_service(&DeckConfig::default());
    let rows = service.report().unwrap();
    let rows = rows.as_array().unwrap();

    // approved + pending out of the three rotating statuses
    assert_eq!(rows.len(), 200);
    for row in rows {
        let status = row["status"].as_str().unwrap();
        assert!(status == "approved" || status == "pending");
        assert!(row["student"]["email"].is_string());
        assert!(row["student"].get("passwordHash").is_none());
        assert!(row["description"].as_str().unwrap().chars().count() <= 100);
        assert!(row["attachmentCount"].is_u64());
    }
}
