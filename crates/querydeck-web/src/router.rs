//! Web router using Axum

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{delete, get},
    Json, Router,
};
use querydeck_core::{analyze, CoreError, QueryService, RawQuery, ShapeOptions};
use serde_json::{json, Map, Value};
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::error;

/// Create the web router
pub fn create_router(service: Arc<QueryService>) -> Router {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods(Any)
        .allow_headers(Any);

    Router::new()
        .route("/api/health", get(health_handler))
        .route("/api/metrics", get(metrics_handler))
        .route("/api/report", get(report_handler))
        .route("/api/storage", get(storage_handler))
        .route("/api/cache", delete(clear_cache_handler))
        .route("/api/cache/{collection}", delete(invalidate_handler))
        .route("/api/{collection}", get(query_handler))
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .with_state(service)
}

/// Query-string parameters of a list request
///
/// Repeated keys resolve to their last occurrence and no value is ever
/// rejected: unparseable parameters fall back like absent ones.
struct ListParams {
    params: Map<String, Value>,
}

impl ListParams {
    fn from_pairs(pairs: Vec<(String, String)>) -> Self {
        let mut params = Map::new();
        for (key, value) in pairs {
            params.insert(key, Value::String(value));
        }
        Self { params }
    }

    fn raw_query(&self) -> RawQuery {
        // Every RawQuery field accepts a string
        serde_json::from_value(Value::Object(self.params.clone())).unwrap_or_default()
    }

    fn text(&self, key: &str) -> Option<&str> {
        self.params.get(key).and_then(Value::as_str)
    }

    fn flag(&self, key: &str) -> bool {
        matches!(
            self.text(key).map(|v| v.trim().to_ascii_lowercase()).as_deref(),
            Some("true" | "1" | "yes" | "on")
        )
    }

    fn shape_options(&self) -> ShapeOptions {
        ShapeOptions::from_lists(
            self.text("fields"),
            self.text("exclude"),
            self.flag("essential"),
        )
    }
}

/// Core errors rendered as JSON responses
struct ApiError(CoreError);

impl From<CoreError> for ApiError {
    fn from(e: CoreError) -> Self {
        Self(e)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = match &self.0 {
            CoreError::CollectionNotFound { .. } => StatusCode::NOT_FOUND,
            CoreError::Store { .. } => StatusCode::BAD_GATEWAY,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        if status != StatusCode::NOT_FOUND {
            error!(error = %self.0, "Request failed");
        }
        (status, Json(json!({"error": self.0.to_string()}))).into_response()
    }
}

async fn query_handler(
    State(service): State<Arc<QueryService>>,
    Path(collection): Path<String>,
    Query(pairs): Query<Vec<(String, String)>>,
) -> Result<Json<Value>, ApiError> {
    let params = ListParams::from_pairs(pairs);
    let payload = service.fetch(&collection, &params.raw_query(), &params.shape_options())?;
    Ok(Json(payload))
}

async fn report_handler(State(service): State<Arc<QueryService>>) -> Result<Json<Value>, ApiError> {
    Ok(Json(service.report()?))
}

async fn metrics_handler(State(service): State<Arc<QueryService>>) -> Json<Value> {
    Json(json!({
        "operations": service.metrics().snapshot(),
        "cache": service.cache_stats(),
    }))
}

async fn storage_handler(State(service): State<Arc<QueryService>>) -> Response {
    match analyze(service.store().as_ref(), service.collections()) {
        Some(report) => Json(report).into_response(),
        None => (
            StatusCode::SERVICE_UNAVAILABLE,
            Json(json!({"error": "Storage analysis unavailable"})),
        )
            .into_response(),
    }
}

async fn clear_cache_handler(State(service): State<Arc<QueryService>>) -> StatusCode {
    service.clear_cache();
    StatusCode::NO_CONTENT
}

async fn invalidate_handler(
    State(service): State<Arc<QueryService>>,
    Path(collection): Path<String>,
) -> Json<Value> {
    let removed = service.invalidate(&collection);
    Json(json!({"collection": collection, "removed": removed}))
}

async fn health_handler(State(service): State<Arc<QueryService>>) -> Json<Value> {
    let metrics = service.metrics();
    Json(json!({
        "status": "healthy",
        "collections": service.collections(),
        "cache_entries": service.cache().len(),
        "active_timers": metrics.active_timers(),
    }))
}
