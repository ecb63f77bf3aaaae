//! Payment capability.
//!
//! The order workflow talks to a [`PaymentGateway`]; which one is decided
//! once at startup from `PAYMENT_PROVIDER`.
//!
//! - [`StripeGateway`] - Stripe `PaymentIntents` over its REST API
//! - [`SandboxGateway`] - Deterministic local gateway for development and tests

mod sandbox;
mod stripe;
pub mod webhook;

pub use sandbox::SandboxGateway;
pub use stripe::StripeGateway;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;

use checklistpro_core::{Money, OrderId, UserId};

/// A synchronous charge for one order.
#[derive(Debug, Clone)]
pub struct ChargeRequest {
    pub order_id: OrderId,
    pub user_id: UserId,
    pub amount: Money,
    pub currency: String,
    /// Provider payment method token (`pm_...`).
    pub payment_method: String,
    /// Sent to the provider so a retried call never charges twice.
    pub idempotency_key: String,
}

/// Result of a charge the provider accepted and processed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChargeOutcome {
    /// Money captured.
    Succeeded { reference: String },
    /// Accepted but not final yet (e.g. 3-D Secure); a webhook settles it.
    Pending { reference: String },
    /// The card was declined.
    Declined {
        reason: String,
        reference: Option<String>,
    },
}

/// A client-side payment intent request.
#[derive(Debug, Clone)]
pub struct IntentRequest {
    pub user_id: UserId,
    pub amount: Money,
    pub currency: String,
}

/// A payment intent handed to the browser.
#[derive(Debug, Clone, Serialize)]
pub struct PaymentIntent {
    pub id: String,
    pub client_secret: Option<String>,
    pub amount: Money,
    pub currency: String,
    pub status: String,
}

/// Errors from the payment provider or the connection to it.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// HTTP request failed.
    #[error("HTTP error: {0}")]
    Transport(#[from] reqwest::Error),

    /// Provider rejected the request for a reason other than a decline.
    #[error("provider error ({status}): {message}")]
    Provider { status: u16, message: String },

    /// Provider answered with something we could not interpret.
    #[error("invalid provider response: {0}")]
    InvalidResponse(String),
}

/// Something that can take money.
#[async_trait]
pub trait PaymentGateway: Send + Sync {
    /// Short provider name for logs and `/payments/methods`.
    fn name(&self) -> &'static str;

    /// Charge and confirm in one call.
    ///
    /// A decline is an `Ok(ChargeOutcome::Declined)`; `Err` means the outcome
    /// is unknown and the order must be reconciled later.
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, PaymentError>;

    /// Create an unconfirmed intent for client-side confirmation.
    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, PaymentError>;
}
