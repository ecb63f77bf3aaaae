//! Payment route handlers: provider info, client-side intents and the
//! provider webhook.

use axum::{body::Bytes, extract::State, http::HeaderMap};
use secrecy::ExposeSecret;
use serde::{Deserialize, Serialize};
use serde_json::json;

use checklistpro_core::{CartSnapshot, CartSnapshotItem};

use crate::error::{AppError, Result};
use crate::extract::ApiJson;
use crate::middleware::RequireAuth;
use crate::services::OrderError;
use crate::services::payments::PaymentIntent;
use crate::services::payments::webhook::{parse_event, verify_stripe_signature};
use crate::state::AppState;

/// Header the provider signs webhook bodies with.
pub const SIGNATURE_HEADER: &str = "stripe-signature";

#[derive(Debug, Serialize)]
pub struct PaymentMethodsResponse {
    pub provider: &'static str,
    pub methods: Vec<&'static str>,
    pub currency: String,
}

/// Intent body. The amount is always computed server-side.
#[derive(Debug, Deserialize)]
pub struct CreateIntentRequest {
    pub items: Vec<CartSnapshotItem>,
}

/// `GET /api/payments/methods`
pub async fn methods(State(state): State<AppState>) -> ApiJson<PaymentMethodsResponse> {
    ApiJson(PaymentMethodsResponse {
        provider: state.orders().payment_provider(),
        methods: vec!["card"],
        currency: state.config().checkout.currency.clone(),
    })
}

/// `POST /api/payments/create-intent`
pub async fn create_intent(
    State(state): State<AppState>,
    RequireAuth(user): RequireAuth,
    ApiJson(body): ApiJson<CreateIntentRequest>,
) -> Result<ApiJson<PaymentIntent>> {
    let cart = CartSnapshot { items: body.items };
    let intent = state.orders().create_payment_intent(user.id, &cart).await?;
    Ok(ApiJson(intent))
}

/// `POST /api/payments/webhook`
///
/// Verifies the signature over the raw body before parsing. Events for
/// unknown orders are acknowledged so the provider stops retrying them.
pub async fn webhook(
    State(state): State<AppState>,
    headers: HeaderMap,
    body: Bytes,
) -> Result<ApiJson<serde_json::Value>> {
    let Some(secret) = state.config().payments.webhook_secret.as_ref() else {
        tracing::warn!("Webhook received but STRIPE_WEBHOOK_SECRET is not configured");
        return Err(AppError::NotFound("API endpoint not found".to_string()));
    };

    let signature = headers
        .get(SIGNATURE_HEADER)
        .and_then(|v| v.to_str().ok())
        .ok_or_else(|| AppError::BadRequest("Missing signature".to_string()))?;

    verify_stripe_signature(
        &body,
        signature,
        secret.expose_secret(),
        chrono::Utc::now().timestamp(),
    )
    .map_err(|e| {
        tracing::warn!(error = %e, "Rejected webhook");
        AppError::BadRequest("Invalid signature".to_string())
    })?;

    let event = parse_event(&body).map_err(|e| AppError::BadRequest(e.to_string()))?;

    match state.orders().apply_payment_event(event).await {
        Ok(()) => {}
        Err(OrderError::NotFound) => {
            tracing::warn!("Webhook for unknown order acknowledged");
        }
        Err(e) => return Err(e.into()),
    }

    Ok(ApiJson(json!({ "received": true })))
}
