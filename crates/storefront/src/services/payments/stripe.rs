//! Stripe `PaymentIntents` client.
//!
//! Uses the REST API directly with form-encoded bodies via `reqwest`.

use std::sync::Arc;

use async_trait::async_trait;
use secrecy::{ExposeSecret, SecretString};
use serde::Deserialize;
use tracing::{debug, instrument};

use super::{
    ChargeOutcome, ChargeRequest, IntentRequest, PaymentError, PaymentGateway, PaymentIntent,
};
use crate::config::StripeConfig;

#[derive(Debug, Deserialize)]
struct StripePaymentIntent {
    id: String,
    status: String,
    client_secret: Option<String>,
    last_payment_error: Option<StripeErrorBody>,
}

#[derive(Debug, Deserialize)]
struct StripeErrorEnvelope {
    error: StripeErrorBody,
}

#[derive(Debug, Deserialize)]
struct StripeErrorBody {
    #[serde(rename = "type", default)]
    kind: String,
    #[serde(default)]
    message: Option<String>,
    #[serde(default)]
    decline_code: Option<String>,
    #[serde(default)]
    payment_intent: Option<Box<StripeIntentRef>>,
}

#[derive(Debug, Deserialize)]
struct StripeIntentRef {
    id: String,
}

/// Stripe-backed [`PaymentGateway`].
#[derive(Clone)]
pub struct StripeGateway {
    inner: Arc<StripeGatewayInner>,
}

struct StripeGatewayInner {
    client: reqwest::Client,
    api_base: String,
    secret_key: SecretString,
}

impl StripeGateway {
    /// Create a new Stripe client.
    #[must_use]
    pub fn new(config: &StripeConfig) -> Self {
        Self {
            inner: Arc::new(StripeGatewayInner {
                client: reqwest::Client::new(),
                api_base: config.api_base.trim_end_matches('/').to_owned(),
                secret_key: config.secret_key.clone(),
            }),
        }
    }

    async fn post_intent(
        &self,
        form: &[(&str, String)],
        idempotency_key: Option<&str>,
    ) -> Result<Result<StripePaymentIntent, StripeErrorBody>, PaymentError> {
        let mut request = self
            .inner
            .client
            .post(format!("{}/v1/payment_intents", self.inner.api_base))
            .bearer_auth(self.inner.secret_key.expose_secret())
            .form(form);
        if let Some(key) = idempotency_key {
            request = request.header("Idempotency-Key", key);
        }

        let response = request.send().await?;
        let status = response.status();
        let body = response.text().await?;

        if status.is_success() {
            return serde_json::from_str(&body)
                .map(Ok)
                .map_err(|e| PaymentError::InvalidResponse(e.to_string()));
        }

        let envelope: StripeErrorEnvelope = serde_json::from_str(&body).map_err(|_| {
            PaymentError::Provider {
                status: status.as_u16(),
                message: body.chars().take(200).collect(),
            }
        })?;

        // Card errors are declines; everything else is a provider failure
        if status == reqwest::StatusCode::PAYMENT_REQUIRED || envelope.error.kind == "card_error" {
            return Ok(Err(envelope.error));
        }

        tracing::error!(
            status = %status,
            error_type = %envelope.error.kind,
            "Stripe API returned non-success status"
        );
        Err(PaymentError::Provider {
            status: status.as_u16(),
            message: envelope
                .error
                .message
                .unwrap_or_else(|| envelope.error.kind.clone()),
        })
    }
}

fn decline_reason(error: &StripeErrorBody) -> String {
    error
        .message
        .clone()
        .or_else(|| error.decline_code.clone())
        .unwrap_or_else(|| "Your card was declined.".to_owned())
}

#[async_trait]
impl PaymentGateway for StripeGateway {
    fn name(&self) -> &'static str {
        "stripe"
    }

    #[instrument(skip(self, request), fields(order_id = %request.order_id))]
    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, PaymentError> {
        let form = [
            ("amount", request.amount.to_cents().to_string()),
            ("currency", request.currency.to_lowercase()),
            ("payment_method", request.payment_method.clone()),
            ("confirm", "true".to_owned()),
            ("automatic_payment_methods[enabled]", "true".to_owned()),
            ("automatic_payment_methods[allow_redirects]", "never".to_owned()),
            ("metadata[order_id]", request.order_id.to_string()),
            ("metadata[user_id]", request.user_id.to_string()),
        ];

        let intent = match self
            .post_intent(&form, Some(&request.idempotency_key))
            .await?
        {
            Ok(intent) => intent,
            Err(decline) => {
                return Ok(ChargeOutcome::Declined {
                    reason: decline_reason(&decline),
                    reference: decline.payment_intent.map(|pi| pi.id),
                });
            }
        };

        debug!(intent_id = %intent.id, status = %intent.status, "Stripe charge result");

        match intent.status.as_str() {
            "succeeded" => Ok(ChargeOutcome::Succeeded {
                reference: intent.id,
            }),
            "processing" | "requires_action" | "requires_capture" => Ok(ChargeOutcome::Pending {
                reference: intent.id,
            }),
            "requires_payment_method" | "canceled" => Ok(ChargeOutcome::Declined {
                reason: intent
                    .last_payment_error
                    .as_ref()
                    .map_or_else(|| "Payment was not completed.".to_owned(), decline_reason),
                reference: Some(intent.id),
            }),
            other => Err(PaymentError::InvalidResponse(format!(
                "unexpected payment intent status: {other}"
            ))),
        }
    }

    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, PaymentError> {
        let form = [
            ("amount", request.amount.to_cents().to_string()),
            ("currency", request.currency.to_lowercase()),
            ("automatic_payment_methods[enabled]", "true".to_owned()),
            ("metadata[user_id]", request.user_id.to_string()),
        ];

        let intent = self
            .post_intent(&form, None)
            .await?
            .map_err(|e| PaymentError::Provider {
                status: 402,
                message: decline_reason(&e),
            })?;

        Ok(PaymentIntent {
            id: intent.id,
            client_secret: intent.client_secret,
            amount: request.amount,
            currency: request.currency.clone(),
            status: intent.status,
        })
    }
}
