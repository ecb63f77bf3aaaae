//! Health checks, runtime metrics, API index and the JSON 404.

use axum::{extract::State, http::StatusCode};
use serde::Serialize;
use serde_json::{Value, json};

use crate::error::AppError;
use crate::extract::ApiJson;
use crate::state::AppState;

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub timestamp: chrono::DateTime<chrono::Utc>,
    /// Seconds since startup.
    pub uptime: u64,
    pub environment: String,
    pub version: &'static str,
    pub database: &'static str,
}

#[derive(Debug, Serialize)]
pub struct MetricsResponse {
    pub timestamp: chrono::DateTime<chrono::Utc>,
    pub uptime: u64,
    pub environment: String,
    pub version: &'static str,
    pub database: &'static str,
    pub catalog_cache_entries: u64,
}

/// `GET /api/health`
///
/// Liveness. Reports the database state but stays 200 when it is down.
pub async fn health(State(state): State<AppState>) -> ApiJson<HealthResponse> {
    ApiJson(HealthResponse {
        status: "ok",
        timestamp: chrono::Utc::now(),
        uptime: state.uptime_secs(),
        environment: environment(&state),
        version: env!("CARGO_PKG_VERSION"),
        database: database_state(&state).await,
    })
}

/// `GET /api/metrics`
pub async fn metrics(State(state): State<AppState>) -> ApiJson<MetricsResponse> {
    ApiJson(MetricsResponse {
        timestamp: chrono::Utc::now(),
        uptime: state.uptime_secs(),
        environment: environment(&state),
        version: env!("CARGO_PKG_VERSION"),
        database: database_state(&state).await,
        catalog_cache_entries: state.catalog().cached_entries(),
    })
}

async fn database_state(state: &AppState) -> &'static str {
    match state.repos().catalog.ping().await {
        Ok(()) => "connected",
        Err(e) => {
            tracing::warn!(error = %e, "Health check could not reach the database");
            "disconnected"
        }
    }
}

fn environment(state: &AppState) -> String {
    state
        .config()
        .sentry_environment
        .clone()
        .unwrap_or_else(|| "development".to_string())
}

/// `GET /api/health/ready`
///
/// Readiness. 503 when the database is unreachable.
pub async fn readiness(State(state): State<AppState>) -> (StatusCode, ApiJson<Value>) {
    match state.repos().catalog.ping().await {
        Ok(()) => (StatusCode::OK, ApiJson(json!({ "status": "ready" }))),
        Err(_) => (
            StatusCode::SERVICE_UNAVAILABLE,
            ApiJson(json!({ "status": "unavailable", "error": "Database unreachable" })),
        ),
    }
}

/// `GET /api/docs` - endpoint index.
pub async fn docs() -> ApiJson<Value> {
    ApiJson(json!({
        "name": "ChecklistPro API",
        "version": env!("CARGO_PKG_VERSION"),
        "endpoints": {
            "health": ["GET /api/health", "GET /api/health/ready", "GET /api/metrics"],
            "auth": [
                "POST /api/auth/register",
                "POST /api/auth/login",
                "POST /api/auth/logout",
                "GET /api/auth/me",
                "PUT /api/auth/me",
                "POST /api/auth/change-password"
            ],
            "products": [
                "GET /api/products",
                "GET /api/products/{slug}",
                "POST /api/products/{id}/view",
                "POST /api/products",
                "PUT /api/products/{id}",
                "DELETE /api/products/{id}",
                "GET /api/admin/products"
            ],
            "categories": [
                "GET /api/categories",
                "GET /api/categories/{slug}",
                "POST /api/categories",
                "PUT /api/categories/{id}",
                "DELETE /api/categories/{id}"
            ],
            "orders": [
                "POST /api/orders",
                "GET /api/orders",
                "GET /api/orders/{id}",
                "GET /api/orders/{id}/history",
                "PUT /api/orders/{id}/cancel",
                "PUT /api/orders/{id}/status",
                "GET /api/orders/{id}/downloads",
                "GET /api/orders/{id}/downloads/{product_id}/{format}"
            ],
            "downloads": ["GET /api/downloads"],
            "payments": [
                "GET /api/payments/methods",
                "POST /api/payments/create-intent",
                "POST /api/payments/webhook"
            ],
            "users": [
                "GET /api/users",
                "PUT /api/users/{id}/role",
                "PUT /api/users/{id}/active"
            ],
            "analytics": [
                "GET /api/analytics",
                "GET /api/analytics/revenue",
                "GET /api/analytics/products",
                "GET /api/analytics/users",
                "POST /api/analytics/events"
            ],
            "uploads": [
                "POST /api/uploads",
                "POST /api/uploads/multiple",
                "DELETE /api/uploads/{reference}"
            ]
        }
    }))
}

/// Fallback for unknown `/api` paths.
pub async fn not_found() -> AppError {
    AppError::NotFound("API endpoint not found".to_string())
}
