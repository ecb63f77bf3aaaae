//! Deterministic in-process gateway.

use async_trait::async_trait;

use super::{
    ChargeOutcome, ChargeRequest, IntentRequest, PaymentError, PaymentGateway, PaymentIntent,
};

/// Payment method token that is always declined.
pub const DECLINED_METHOD: &str = "pm_card_declined";

/// Payment method token that always fails like a provider outage.
pub const ERROR_METHOD: &str = "pm_card_error";

/// Payment method token whose charge waits for customer authentication and
/// settles later through the webhook.
pub const PENDING_METHOD: &str = "pm_card_authenticationRequired";

/// Gateway that never leaves the process.
///
/// Every charge succeeds except [`DECLINED_METHOD`] (declined),
/// [`ERROR_METHOD`] (provider error) and [`PENDING_METHOD`] (left pending). References are derived from the order
/// id so repeated charges for one order are stable.
#[derive(Debug, Clone, Copy, Default)]
pub struct SandboxGateway;

#[async_trait]
impl PaymentGateway for SandboxGateway {
    fn name(&self) -> &'static str {
        "sandbox"
    }

    async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, PaymentError> {
        let reference = format!("sandbox_pi_{}", request.order_id);
        match request.payment_method.as_str() {
            DECLINED_METHOD => Ok(ChargeOutcome::Declined {
                reason: "Your card was declined.".to_owned(),
                reference: Some(reference),
            }),
            ERROR_METHOD => Err(PaymentError::Provider {
                status: 503,
                message: "sandbox provider unavailable".to_owned(),
            }),
            PENDING_METHOD => Ok(ChargeOutcome::Pending { reference }),
            _ => Ok(ChargeOutcome::Succeeded { reference }),
        }
    }

    async fn create_intent(&self, request: &IntentRequest) -> Result<PaymentIntent, PaymentError> {
        let id = format!("sandbox_pi_{}_{}", request.user_id, request.amount.to_cents());
        Ok(PaymentIntent {
            client_secret: Some(format!("{id}_secret")),
            id,
            amount: request.amount,
            currency: request.currency.clone(),
            status: "requires_payment_method".to_owned(),
        })
    }
}
