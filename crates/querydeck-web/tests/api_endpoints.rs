//! Integration tests for the HTTP endpoints

use axum::body::Body;
use axum::http::{Method, Request, StatusCode};
use axum::Router;
use http_body_util::BodyExt;
use querydeck_core::store::seed_demo;
use querydeck_core::{DeckConfig, MemoryStore, QueryService};
use serde_json::Value;
use std::sync::Arc;
use tower::ServiceExt;

fn app() -> (Router, Arc<QueryService>) {
    let store = Arc::new(MemoryStore::new());
    seed_demo(&store, 10, 60);
    let service = Arc::new(QueryService::from_config(store, &DeckConfig::default()));
    (querydeck_web::create_router(service.clone()), service)
}

async fn send(router: &Router, method: Method, uri: &str) -> (StatusCode, Value) {
    let request = Request::builder()
        .method(method)
        .uri(uri)
        .body(Body::empty())
        .unwrap();
    let response = router.clone().oneshot(request).await.unwrap();
    let status = response.status();
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    let body = if bytes.is_empty() {
        Value::Null
    } else {
        serde_json::from_slice(&bytes).unwrap()
    };
    (status, body)
}

#[tokio::test]
async fn test_health() {
    let (router, _) = app();
    let (status, body) = send(&router, Method::GET, "/api/health").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["status"], "healthy");
    assert_eq!(body["collections"].as_array().unwrap().len(), 4);
}

#[tokio::test]
async fn test_query_with_string_params() {
    let (router, _) = app();
    let (status, body) = send(
        &router,
        Method::GET,
        "/api/activities?page=2&limit=15&sortBy=title&sortOrder=asc&essential=true",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["page"], 2);
    assert_eq!(body["pagination"]["limit"], 15);
    assert_eq!(body["pagination"]["offset"], 15);
    assert_eq!(body["pagination"]["total"], 60);

    let rows = body["data"].as_array().unwrap();
    assert_eq!(rows.len(), 15);
    assert!(rows.iter().all(|r| r.get("description").is_none()));
}

#[tokio::test]
async fn test_query_garbage_params_fall_back() {
    let (router, _) = app();
    let (status, body) = send(
        &router,
        Method::GET,
        "/api/activities?page=abc&limit=500&sortBy=passwordHash&fields=title",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["page"], 1);
    assert_eq!(body["pagination"]["limit"], 100);
    let first = body["data"][0].as_object().unwrap();
    assert_eq!(first.len(), 1);
    assert!(first.contains_key("title"));
}

#[tokio::test]
async fn test_huge_page_returns_empty_window() {
    let (router, _) = app();
    let (status, body) = send(
        &router,
        Method::GET,
        "/api/activities?page=9223372036854775807&limit=100",
    )
    .await;

    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["page"], querydeck_core::query::MAX_PAGE);
    assert_eq!(body["pagination"]["total"], 60);
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn test_repeated_params_last_wins() {
    let (router, _) = app();
    let (status, body) = send(&router, Method::GET, "/api/activities?page=1&limit=5&page=2").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["pagination"]["page"], 2);
    assert_eq!(body["pagination"]["offset"], 5);
}

#[tokio::test]
async fn test_essential_accepts_numeric_flag() {
    let (router, _) = app();
    let (status, body) = send(&router, Method::GET, "/api/activities?essential=1").await;
    assert_eq!(status, StatusCode::OK);
    let rows = body["data"].as_array().unwrap();
    assert!(!rows.is_empty());
    assert!(rows.iter().all(|r| r.get("description").is_none()));
}

#[tokio::test]
async fn test_unknown_collection_is_404() {
    let (router, _) = app();
    let (status, body) = send(&router, Method::GET, "/api/sessions").await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    assert!(body["error"].as_str().unwrap().contains("sessions"));
}

#[tokio::test]
async fn test_metrics_after_queries() {
    let (router, _) = app();
    send(&router, Method::GET, "/api/users").await;
    send(&router, Method::GET, "/api/users").await;

    let (status, body) = send(&router, Method::GET, "/api/metrics").await;
    assert_eq!(status, StatusCode::OK);

    let users = &body["operations"]["query.users"];
    for field in ["count", "average", "min", "max", "total"] {
        assert!(users.get(field).is_some(), "missing {}", field);
    }
    assert_eq!(users["count"], 1);
    assert_eq!(body["cache"]["hits"], 1);
}

#[tokio::test]
async fn test_report_endpoint() {
    let (router, _) = app();
    let (status, body) = send(&router, Method::GET, "/api/report").await;
    assert_eq!(status, StatusCode::OK);
    // 60 activities, statuses rotate approved/pending/rejected
    assert_eq!(body.as_array().unwrap().len(), 40);
}

#[tokio::test]
async fn test_cache_clear_and_invalidate() {
    let (router, service) = app();
    send(&router, Method::GET, "/api/activities").await;
    send(&router, Method::GET, "/api/users").await;
    assert_eq!(service.cache_stats().entries, 2);

    let (status, body) = send(&router, Method::DELETE, "/api/cache/users").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["removed"], 1);

    let (status, _) = send(&router, Method::DELETE, "/api/cache").await;
    assert_eq!(status, StatusCode::NO_CONTENT);
    assert_eq!(service.cache_stats().entries, 0);
}

#[tokio::test]
async fn test_storage_report() {
    let (router, _) = app();
    let (status, body) = send(&router, Method::GET, "/api/storage").await;
    assert_eq!(status, StatusCode::OK);
    assert_eq!(body["totalDocuments"], 14 + 60 + 60 + 10);
}
