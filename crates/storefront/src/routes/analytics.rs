//! Admin analytics endpoints, plus the public client event log.

use axum::{body::Bytes, extract::State, http::StatusCode};
use serde::Deserialize;
use serde_json::Value;

use crate::error::Result;
use crate::extract::{ApiJson, ApiQuery};
use crate::middleware::RequireAdmin;
use crate::models::{DashboardSummary, ProductStats};
use crate::services::AnalyticsService;
use crate::services::analytics::{RevenueReport, UserReport};
use crate::state::AppState;

#[derive(Debug, Default, Deserialize)]
pub struct WindowQuery {
    /// Clamped to 1..=365, default 30.
    pub days: Option<u32>,
}

#[derive(Debug, Default, Deserialize)]
pub struct TopProductsQuery {
    pub limit: Option<u32>,
}

/// Longest accepted client event name.
pub const MAX_EVENT_NAME: usize = 100;

/// A client-side analytics event.
#[derive(Debug, Deserialize)]
pub struct TrackEventRequest {
    pub event: String,
    #[serde(default)]
    pub data: Value,
    pub timestamp: Option<chrono::DateTime<chrono::Utc>>,
}

/// `POST /api/analytics/events`
///
/// Fire and forget: events go to the log under the `client_events` target
/// and the response is 204 whatever the body holds.
pub async fn track_event(body: Bytes) -> StatusCode {
    match serde_json::from_slice::<TrackEventRequest>(&body) {
        Ok(event) if !event.event.trim().is_empty() && event.event.len() <= MAX_EVENT_NAME => {
            tracing::info!(
                target: "client_events",
                event = %event.event,
                data = %event.data,
                client_timestamp = ?event.timestamp,
                "Client event"
            );
        }
        Ok(event) => {
            tracing::debug!(len = event.event.len(), "Dropped client event with invalid name");
        }
        Err(e) => {
            tracing::debug!(error = %e, "Dropped malformed client event");
        }
    }
    StatusCode::NO_CONTENT
}

/// `GET /api/analytics`
pub async fn dashboard(
    State(state): State<AppState>,
    _admin: RequireAdmin,
) -> Result<ApiJson<DashboardSummary>> {
    let analytics = AnalyticsService::new(state.repos().analytics.as_ref());
    Ok(ApiJson(analytics.dashboard().await?))
}

/// `GET /api/analytics/revenue`
pub async fn revenue(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiQuery(query): ApiQuery<WindowQuery>,
) -> Result<ApiJson<RevenueReport>> {
    let analytics = AnalyticsService::new(state.repos().analytics.as_ref());
    Ok(ApiJson(analytics.revenue(query.days).await?))
}

/// `GET /api/analytics/products`
pub async fn products(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiQuery(query): ApiQuery<TopProductsQuery>,
) -> Result<ApiJson<Vec<ProductStats>>> {
    let analytics = AnalyticsService::new(state.repos().analytics.as_ref());
    Ok(ApiJson(analytics.top_products(query.limit).await?))
}

/// `GET /api/analytics/users`
pub async fn users(
    State(state): State<AppState>,
    _admin: RequireAdmin,
    ApiQuery(query): ApiQuery<WindowQuery>,
) -> Result<ApiJson<UserReport>> {
    let analytics = AnalyticsService::new(state.repos().analytics.as_ref());
    Ok(ApiJson(analytics.users(query.days).await?))
}
