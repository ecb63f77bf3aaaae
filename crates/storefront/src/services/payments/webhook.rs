//! Stripe webhook verification and event parsing.

use hmac::{Hmac, Mac};
use serde::Deserialize;
use sha2::Sha256;
use thiserror::Error;
use tracing::debug;

use checklistpro_core::OrderId;

/// Maximum age of a signed webhook, in seconds.
pub const SIGNATURE_TOLERANCE_SECS: i64 = 300;

#[derive(Debug, Error)]
pub enum WebhookError {
    #[error("invalid signature: {0}")]
    InvalidSignature(String),

    #[error("invalid payload: {0}")]
    InvalidPayload(String),
}

/// Payment events the storefront acts on.
///
/// `order_id` comes from the intent's metadata. Intents created without it
/// are matched to an order through `reference` instead.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PaymentEvent {
    Succeeded {
        order_id: Option<OrderId>,
        reference: String,
    },
    Failed {
        order_id: Option<OrderId>,
        reference: String,
        reason: String,
    },
    /// Anything else; acknowledged and dropped.
    Ignored { kind: String },
}

/// Verify a `Stripe-Signature` header against the raw request body.
///
/// The header looks like `t=1700000000,v1=<hex>,v1=<hex>`; any `v1` entry
/// may match.
///
/// # Errors
///
/// Returns `WebhookError::InvalidSignature` for a malformed header, a stale
/// timestamp or a signature mismatch.
pub fn verify_stripe_signature(
    payload: &[u8],
    header: &str,
    secret: &str,
    now: i64,
) -> Result<(), WebhookError> {
    let mut timestamp = None;
    let mut signatures = Vec::new();
    for part in header.split(',') {
        match part.trim().split_once('=') {
            Some(("t", value)) => timestamp = Some(value),
            Some(("v1", value)) => signatures.push(value),
            _ => {}
        }
    }

    let timestamp =
        timestamp.ok_or_else(|| WebhookError::InvalidSignature("missing timestamp".to_owned()))?;
    let ts: i64 = timestamp
        .parse()
        .map_err(|_| WebhookError::InvalidSignature("invalid timestamp".to_owned()))?;

    if now.abs_diff(ts) > SIGNATURE_TOLERANCE_SECS.unsigned_abs() {
        return Err(WebhookError::InvalidSignature(
            "timestamp outside tolerance".to_owned(),
        ));
    }

    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .map_err(|e| WebhookError::InvalidSignature(e.to_string()))?;
    mac.update(timestamp.as_bytes());
    mac.update(b".");
    mac.update(payload);
    let expected = hex::encode(mac.finalize().into_bytes());

    if !signatures
        .iter()
        .any(|candidate| constant_time_compare(&expected, candidate))
    {
        return Err(WebhookError::InvalidSignature(
            "signature mismatch".to_owned(),
        ));
    }

    debug!("Stripe signature verified");
    Ok(())
}

fn constant_time_compare(a: &str, b: &str) -> bool {
    if a.len() != b.len() {
        return false;
    }

    let mut result: u8 = 0;
    for (x, y) in a.bytes().zip(b.bytes()) {
        result |= x ^ y;
    }

    result == 0
}

#[derive(Deserialize)]
struct Event {
    #[serde(rename = "type")]
    kind: String,
    data: EventData,
}

#[derive(Deserialize)]
struct EventData {
    object: IntentObject,
}

#[derive(Deserialize)]
struct IntentObject {
    id: String,
    #[serde(default)]
    metadata: Metadata,
    #[serde(default)]
    last_payment_error: Option<LastError>,
}

#[derive(Deserialize, Default)]
struct Metadata {
    order_id: Option<String>,
}

#[derive(Deserialize)]
struct LastError {
    message: Option<String>,
}

/// Parse a verified webhook body.
///
/// # Errors
///
/// Returns `WebhookError::InvalidPayload` if the body is not an event, or a
/// payment event carries a `metadata.order_id` that is not numeric.
pub fn parse_event(payload: &[u8]) -> Result<PaymentEvent, WebhookError> {
    let value: serde_json::Value = serde_json::from_slice(payload)
        .map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
    let kind = value
        .get("type")
        .and_then(serde_json::Value::as_str)
        .ok_or_else(|| WebhookError::InvalidPayload("missing event type".to_owned()))?
        .to_owned();

    if kind != "payment_intent.succeeded" && kind != "payment_intent.payment_failed" {
        return Ok(PaymentEvent::Ignored { kind });
    }

    let event: Event =
        serde_json::from_value(value).map_err(|e| WebhookError::InvalidPayload(e.to_string()))?;
    let intent = event.data.object;
    let order_id = intent
        .metadata
        .order_id
        .as_deref()
        .map(|id| {
            id.parse()
                .map(OrderId::new)
                .map_err(|_| WebhookError::InvalidPayload(format!("invalid metadata.order_id: {id}")))
        })
        .transpose()?;

    Ok(if event.kind == "payment_intent.succeeded" {
        PaymentEvent::Succeeded {
            order_id,
            reference: intent.id,
        }
    } else {
        PaymentEvent::Failed {
            order_id,
            reference: intent.id,
            reason: intent
                .last_payment_error
                .and_then(|e| e.message)
                .unwrap_or_else(|| "payment failed".to_owned()),
        }
    })
}

/// Build a valid signature header. Used by tests and local tooling.
#[must_use]
pub fn sign_payload(payload: &[u8], secret: &str, timestamp: i64) -> String {
    let mut mac = Hmac::<Sha256>::new_from_slice(secret.as_bytes())
        .unwrap_or_else(|_| unreachable!("HMAC accepts keys of any length"));
    mac.update(timestamp.to_string().as_bytes());
    mac.update(b".");
    mac.update(payload);
    format!("t={timestamp},v1={}", hex::encode(mac.finalize().into_bytes()))
}
