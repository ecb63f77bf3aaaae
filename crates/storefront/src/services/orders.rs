//! Order workflow.
//!
//! Checkout re-prices every cart line from the live catalog, persists a
//! `pending` order, logs the payment attempt, moves the order to
//! `processing` and charges. The charge outcome decides where it ends up:
//!
//! | Outcome            | Order status  | Caller sees            |
//! |--------------------|---------------|------------------------|
//! | succeeded          | `completed`   | the order              |
//! | pending (3-D Sec.) | `processing`  | the order              |
//! | declined           | `cancelled`   | `PaymentFailed` (402)  |
//! | provider error     | `processing`  | `CreationFailed` (500) |
//!
//! Orders stuck in `processing` after a provider error are settled by the
//! payment webhook or an administrator.

use std::collections::HashMap;
use std::sync::Arc;

use thiserror::Error;
use tracing::instrument;

use checklistpro_core::{
    CartError, CartSnapshot, InvalidTransition, OrderId, OrderStatus, OrderTotals, ProductId,
    TaxRate, UserId,
};

use super::payments::webhook::PaymentEvent;
use super::payments::{
    ChargeOutcome, ChargeRequest, IntentRequest, PaymentError, PaymentGateway, PaymentIntent,
};
use crate::db::{CatalogRepository, OrderRepository, RepositoryError};
use crate::models::{
    CurrentUser, LineItem, NewOrder, Order, OrderFilter, Page, Pagination, StatusChange,
    StatusEvent,
};

/// Errors from the order workflow.
#[derive(Debug, Error)]
pub enum OrderError {
    /// One or more cart lines reference products that cannot be bought.
    #[error("cart contains unavailable products")]
    InvalidCart(Vec<String>),

    #[error(transparent)]
    Cart(#[from] CartError),

    #[error("{0}")]
    Validation(String),

    #[error("order not found")]
    NotFound,

    #[error("not allowed to access this order")]
    Forbidden,

    #[error(transparent)]
    InvalidTransition(#[from] InvalidTransition),

    /// The order changed underneath a concurrent update.
    #[error("{0}")]
    Conflict(String),

    #[error("payment for order {order_id} failed: {reason}")]
    PaymentFailed { order_id: OrderId, reason: String },

    /// The provider could not be reached or failed; the order is left in
    /// `processing` for reconciliation.
    #[error("order {order_id} could not be completed")]
    CreationFailed { order_id: OrderId },

    #[error("payment provider error: {0}")]
    Payment(#[from] PaymentError),

    #[error("database error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for OrderError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::NotFound => Self::NotFound,
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Repository(other),
        }
    }
}

/// Checkout input.
#[derive(Debug, Clone)]
pub struct Checkout {
    pub cart: CartSnapshot,
    pub payment_method: String,
    /// Client token making retries safe; unique per user.
    pub idempotency_key: Option<String>,
}

/// A priced cart.
#[derive(Debug, Clone)]
pub struct Quote {
    pub items: Vec<LineItem>,
    pub totals: OrderTotals,
    pub currency: String,
}

/// Pricing settings.
#[derive(Debug, Clone)]
pub struct CheckoutSettings {
    pub tax_rate: TaxRate,
    pub currency: String,
}

/// Order listing request.
#[derive(Debug, Clone, Default)]
pub struct OrderListing {
    pub status: Option<OrderStatus>,
    /// Admins only: every user's orders.
    pub all_users: bool,
    pub page: Pagination,
}

/// The order workflow.
#[derive(Clone)]
pub struct OrderService {
    inner: Arc<OrderServiceInner>,
}

struct OrderServiceInner {
    orders: Arc<dyn OrderRepository>,
    catalog: Arc<dyn CatalogRepository>,
    gateway: Arc<dyn PaymentGateway>,
    settings: CheckoutSettings,
}

const MAX_IDEMPOTENCY_KEY_LENGTH: usize = 255;

impl OrderService {
    #[must_use]
    pub fn new(
        orders: Arc<dyn OrderRepository>,
        catalog: Arc<dyn CatalogRepository>,
        gateway: Arc<dyn PaymentGateway>,
        settings: CheckoutSettings,
    ) -> Self {
        Self {
            inner: Arc::new(OrderServiceInner {
                orders,
                catalog,
                gateway,
                settings,
            }),
        }
    }

    /// Name of the configured payment provider.
    #[must_use]
    pub fn payment_provider(&self) -> &'static str {
        self.inner.gateway.name()
    }

    // =========================================================================
    // Checkout
    // =========================================================================

    /// Price a cart snapshot against the live catalog.
    ///
    /// Client-supplied prices are ignored.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Cart` for an empty cart or out-of-range quantity
    /// and `OrderError::InvalidCart` naming every missing or disabled product.
    pub async fn quote(&self, cart: &CartSnapshot) -> Result<Quote, OrderError> {
        let lines = cart.normalized()?;
        let ids: Vec<ProductId> = lines.iter().map(|(id, _)| *id).collect();

        // Straight to the repository: a cached price could be stale
        let products: HashMap<ProductId, _> = self
            .inner
            .catalog
            .get_products(&ids)
            .await?
            .into_iter()
            .map(|p| (p.id, p))
            .collect();

        let mut problems = Vec::new();
        let mut items = Vec::with_capacity(lines.len());
        for (product_id, quantity) in lines {
            match products.get(&product_id) {
                Some(product) if product.enabled => items.push(LineItem {
                    product_id,
                    product_name: product.name.clone(),
                    quantity,
                    unit_price: product.price,
                }),
                Some(product) => {
                    problems.push(format!("{} is no longer available", product.name));
                }
                None => problems.push(format!("product {product_id} does not exist")),
            }
        }
        if !problems.is_empty() {
            return Err(OrderError::InvalidCart(problems));
        }

        let totals = OrderTotals::compute(
            items.iter().map(|i| (i.unit_price, i.quantity)),
            self.inner.settings.tax_rate,
        );

        Ok(Quote {
            items,
            totals,
            currency: self.inner.settings.currency.clone(),
        })
    }

    /// Create and pay for an order.
    ///
    /// Replaying the same idempotency key returns the original order and
    /// never charges again.
    ///
    /// # Errors
    ///
    /// See the module table, plus the [`OrderService::quote`] errors. Nothing
    /// is persisted when pricing fails.
    #[instrument(skip(self, checkout))]
    pub async fn create_order(
        &self,
        user_id: UserId,
        checkout: Checkout,
    ) -> Result<Order, OrderError> {
        let payment_method = checkout.payment_method.trim().to_owned();
        if payment_method.is_empty() {
            return Err(OrderError::Validation(
                "payment method is required".to_owned(),
            ));
        }
        let idempotency_key = checkout
            .idempotency_key
            .map(|k| k.trim().to_owned())
            .filter(|k| !k.is_empty());
        if idempotency_key
            .as_ref()
            .is_some_and(|k| k.len() > MAX_IDEMPOTENCY_KEY_LENGTH)
        {
            return Err(OrderError::Validation(format!(
                "idempotency key must be at most {MAX_IDEMPOTENCY_KEY_LENGTH} characters"
            )));
        }

        if let Some(key) = idempotency_key.as_deref()
            && let Some(existing) = self
                .inner
                .orders
                .find_by_idempotency_key(user_id, key)
                .await?
        {
            tracing::info!(order_id = %existing.id, "Idempotent replay, returning existing order");
            return Ok(existing);
        }

        let quote = self.quote(&checkout.cart).await?;

        let created = self
            .inner
            .orders
            .create_pending(NewOrder {
                user_id,
                items: quote.items,
                totals: quote.totals,
                currency: quote.currency,
                payment_method: payment_method.clone(),
                idempotency_key: idempotency_key.clone(),
            })
            .await;

        let order = match (created, idempotency_key.as_deref()) {
            // Lost a race with a concurrent request carrying the same key
            (Err(RepositoryError::Conflict(_)), Some(key)) => {
                return self
                    .inner
                    .orders
                    .find_by_idempotency_key(user_id, key)
                    .await?
                    .ok_or_else(|| OrderError::Conflict("duplicate idempotency key".to_owned()));
            }
            (result, _) => result?,
        };

        self.pay(order, payment_method).await
    }

    async fn pay(&self, order: Order, payment_method: String) -> Result<Order, OrderError> {
        tracing::info!(
            order_id = %order.id,
            user_id = %order.user_id,
            amount = %order.total,
            currency = %order.currency,
            provider = self.inner.gateway.name(),
            "Payment attempt"
        );

        let order = self
            .transition(&order, OrderStatus::Processing, None, None, None)
            .await?;

        let request = ChargeRequest {
            order_id: order.id,
            user_id: order.user_id,
            amount: order.total,
            currency: order.currency.clone(),
            payment_method,
            idempotency_key: format!("order-{}", order.id),
        };

        match self.inner.gateway.charge(&request).await {
            Ok(ChargeOutcome::Succeeded { reference }) => {
                let completed = self
                    .transition(&order, OrderStatus::Completed, None, None, Some(reference))
                    .await?;
                tracing::info!(order_id = %completed.id, "Order completed");
                Ok(completed)
            }
            Ok(ChargeOutcome::Pending { reference }) => {
                self.inner
                    .orders
                    .record_payment_reference(order.id, &reference)
                    .await?;
                tracing::info!(order_id = %order.id, %reference, "Payment pending confirmation");
                Ok(Order {
                    payment_reference: Some(reference),
                    ..order
                })
            }
            Ok(ChargeOutcome::Declined { reason, reference }) => {
                self.transition(
                    &order,
                    OrderStatus::Cancelled,
                    None,
                    Some(format!("payment declined: {reason}")),
                    reference,
                )
                .await?;
                tracing::warn!(order_id = %order.id, %reason, "Payment declined");
                Err(OrderError::PaymentFailed {
                    order_id: order.id,
                    reason,
                })
            }
            Err(e) => {
                tracing::error!(
                    order_id = %order.id,
                    user_id = %order.user_id,
                    amount = %order.total,
                    error = %e,
                    "Payment provider failure, order left in processing"
                );
                Err(OrderError::CreationFailed { order_id: order.id })
            }
        }
    }

    /// Create a client-side payment intent for a cart.
    ///
    /// # Errors
    ///
    /// Returns the [`OrderService::quote`] errors or `OrderError::Payment`.
    pub async fn create_payment_intent(
        &self,
        user_id: UserId,
        cart: &CartSnapshot,
    ) -> Result<PaymentIntent, OrderError> {
        let quote = self.quote(cart).await?;
        Ok(self
            .inner
            .gateway
            .create_intent(&IntentRequest {
                user_id,
                amount: quote.totals.total,
                currency: quote.currency,
            })
            .await?)
    }

    // =========================================================================
    // Reads
    // =========================================================================

    /// One order, visible to its owner and to admins.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` or `OrderError::Forbidden`.
    pub async fn get_order(&self, actor: &CurrentUser, id: OrderId) -> Result<Order, OrderError> {
        let order = self
            .inner
            .orders
            .get(id)
            .await?
            .ok_or(OrderError::NotFound)?;

        if order.user_id != actor.id && !actor.role.is_admin() {
            return Err(OrderError::Forbidden);
        }
        Ok(order)
    }

    /// The caller's orders, or everyone's for an admin asking for all.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::Forbidden` if a customer asks for all orders.
    pub async fn list_orders(
        &self,
        actor: &CurrentUser,
        listing: OrderListing,
    ) -> Result<Page<Order>, OrderError> {
        if listing.all_users && !actor.role.is_admin() {
            return Err(OrderError::Forbidden);
        }

        let filter = OrderFilter {
            user_id: (!listing.all_users).then_some(actor.id),
            status: listing.status,
            page: listing.page,
        };
        Ok(self.inner.orders.list(&filter).await?)
    }

    /// Audit trail of an order.
    ///
    /// # Errors
    ///
    /// Same as [`OrderService::get_order`].
    pub async fn history(
        &self,
        actor: &CurrentUser,
        id: OrderId,
    ) -> Result<Vec<StatusEvent>, OrderError> {
        self.get_order(actor, id).await?;
        Ok(self.inner.orders.status_history(id).await?)
    }

    // =========================================================================
    // Status changes
    // =========================================================================

    /// Cancel one of the caller's own orders.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::InvalidTransition` once the order is terminal.
    #[instrument(skip(self, actor), fields(user_id = %actor.id))]
    pub async fn cancel_order(&self, actor: &CurrentUser, id: OrderId) -> Result<Order, OrderError> {
        let order = self.get_order(actor, id).await?;
        let cancelled = self
            .transition(
                &order,
                OrderStatus::Cancelled,
                Some(actor.id),
                Some("cancelled by customer".to_owned()),
                None,
            )
            .await?;
        tracing::info!(order_id = %id, "Order cancelled");
        Ok(cancelled)
    }

    /// Administrative status change; always audited with the admin's id.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::InvalidTransition` for edges outside the state
    /// machine.
    #[instrument(skip(self, note))]
    pub async fn admin_update_status(
        &self,
        admin_id: UserId,
        id: OrderId,
        to: OrderStatus,
        note: Option<String>,
    ) -> Result<Order, OrderError> {
        let order = self
            .inner
            .orders
            .get(id)
            .await?
            .ok_or(OrderError::NotFound)?;

        let updated = self
            .transition(&order, to, Some(admin_id), note, None)
            .await?;
        tracing::info!(
            order_id = %id,
            %admin_id,
            from = %order.status,
            to = %updated.status,
            "Order status changed by admin"
        );
        Ok(updated)
    }

    /// Apply a verified payment webhook. Replays are no-ops.
    ///
    /// # Errors
    ///
    /// Returns `OrderError::NotFound` for an unknown order.
    #[instrument(skip(self))]
    pub async fn apply_payment_event(&self, event: PaymentEvent) -> Result<(), OrderError> {
        match event {
            PaymentEvent::Succeeded {
                order_id,
                reference,
            } => {
                let mut order = self.payment_event_order(order_id, &reference).await?;
                let order_id = order.id;

                if order.status == OrderStatus::Pending {
                    order = self
                        .transition(&order, OrderStatus::Processing, None, None, None)
                        .await?;
                }
                match order.status {
                    OrderStatus::Processing => {
                        self.transition(
                            &order,
                            OrderStatus::Completed,
                            None,
                            Some("payment confirmed by webhook".to_owned()),
                            Some(reference),
                        )
                        .await?;
                        tracing::info!(%order_id, "Order completed by webhook");
                    }
                    OrderStatus::Cancelled => {
                        tracing::warn!(
                            %order_id,
                            %reference,
                            "Payment succeeded for a cancelled order, needs manual refund"
                        );
                    }
                    _ => {}
                }
            }
            PaymentEvent::Failed {
                order_id,
                reference,
                reason,
            } => {
                let order = self.payment_event_order(order_id, &reference).await?;
                let order_id = order.id;

                if !order.status.is_terminal() {
                    self.transition(
                        &order,
                        OrderStatus::Cancelled,
                        None,
                        Some(format!("payment failed: {reason}")),
                        Some(reference),
                    )
                    .await?;
                    tracing::info!(%order_id, "Order cancelled by webhook");
                }
            }
            PaymentEvent::Ignored { kind } => {
                tracing::debug!(%kind, "Ignoring webhook event");
            }
        }
        Ok(())
    }

    /// The order a payment event refers to: by metadata id when present,
    /// otherwise by the provider reference recorded at checkout.
    async fn payment_event_order(
        &self,
        order_id: Option<OrderId>,
        reference: &str,
    ) -> Result<Order, OrderError> {
        let order = match order_id {
            Some(id) => self.inner.orders.get(id).await?,
            None => self.inner.orders.find_by_payment_reference(reference).await?,
        };
        order.ok_or(OrderError::NotFound)
    }

    /// Validate against the state machine, then compare-and-set in storage.
    async fn transition(
        &self,
        order: &Order,
        to: OrderStatus,
        actor: Option<UserId>,
        note: Option<String>,
        payment_reference: Option<String>,
    ) -> Result<Order, OrderError> {
        order.status.transition(to)?;
        Ok(self
            .inner
            .orders
            .transition_status(
                order.id,
                StatusChange {
                    from: order.status,
                    to,
                    actor,
                    note,
                    payment_reference,
                },
            )
            .await?)
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use checklistpro_core::{CartSnapshotItem, Email, Money, Slug, UserRole};

    use super::*;
    use crate::db::InMemoryStore;
    use crate::models::{NewProduct, ProductUpdate};
    use crate::services::payments::SandboxGateway;

    /// Sandbox gateway that counts charges.
    #[derive(Default)]
    struct CountingGateway {
        charges: AtomicUsize,
    }

    #[async_trait]
    impl PaymentGateway for CountingGateway {
        fn name(&self) -> &'static str {
            "counting"
        }

        async fn charge(&self, request: &ChargeRequest) -> Result<ChargeOutcome, PaymentError> {
            self.charges.fetch_add(1, Ordering::SeqCst);
            SandboxGateway.charge(request).await
        }

        async fn create_intent(
            &self,
            request: &IntentRequest,
        ) -> Result<PaymentIntent, PaymentError> {
            SandboxGateway.create_intent(request).await
        }
    }

    struct Fixture {
        store: Arc<InMemoryStore>,
        gateway: Arc<CountingGateway>,
        service: OrderService,
    }

    fn fixture() -> Fixture {
        let store = Arc::new(InMemoryStore::new());
        let gateway = Arc::new(CountingGateway::default());
        let service = OrderService::new(
            store.clone(),
            store.clone(),
            gateway.clone(),
            CheckoutSettings {
                tax_rate: TaxRate::default(),
                currency: "USD".to_owned(),
            },
        );
        Fixture {
            store,
            gateway,
            service,
        }
    }

    async fn product(store: &InMemoryStore, name: &str, cents: u32) -> ProductId {
        store
            .create_product(NewProduct {
                name: name.to_owned(),
                slug: Slug::from_name(name),
                description: String::new(),
                price: Money::from_cents(cents),
                original_price: None,
                category_id: None,
                features: vec![],
                tags: vec![],
                formats: BTreeMap::new(),
            })
            .await
            .unwrap()
            .id
    }

    fn customer(id: i32) -> CurrentUser {
        CurrentUser {
            id: UserId::new(id),
            email: Email::parse(&format!("user{id}@example.com")).unwrap(),
            role: UserRole::Customer,
        }
    }

    fn checkout(items: &[(ProductId, u32, Option<u32>)], method: &str) -> Checkout {
        Checkout {
            cart: CartSnapshot {
                items: items
                    .iter()
                    .map(|&(product_id, quantity, forged)| CartSnapshotItem {
                        product_id,
                        quantity,
                        unit_price: forged.map(Money::from_cents),
                    })
                    .collect(),
            },
            payment_method: method.to_owned(),
            idempotency_key: None,
        }
    }

    #[tokio::test]
    async fn test_totals_use_live_prices_and_tax() {
        let f = fixture();
        let p = product(&f.store, "HACCP Plan", 1000).await;

        // Client claims one cent; ignored
        let order = f
            .service
            .create_order(UserId::new(1), checkout(&[(p, 2, Some(1))], "pm_card_visa"))
            .await
            .unwrap();

        assert_eq!(order.subtotal.to_string(), "20.00");
        assert_eq!(order.tax.to_string(), "1.60");
        assert_eq!(order.total.to_string(), "21.60");
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.payment_reference.as_deref(), Some(&*format!("sandbox_pi_{}", order.id)));
    }

    #[tokio::test]
    async fn test_disabled_product_rejects_cart_and_persists_nothing() {
        let f = fixture();
        let p = product(&f.store, "Audit", 1000).await;
        f.store
            .update_product(
                p,
                ProductUpdate {
                    enabled: Some(false),
                    ..ProductUpdate::default()
                },
            )
            .await
            .unwrap();

        let err = f
            .service
            .create_order(UserId::new(1), checkout(&[(p, 1, None)], "pm_card_visa"))
            .await
            .unwrap_err();
        assert!(matches!(err, OrderError::InvalidCart(ref problems) if problems.len() == 1));

        let page = f
            .service
            .list_orders(&customer(1), OrderListing::default())
            .await
            .unwrap();
        assert_eq!(page.total, 0);
        assert_eq!(f.gateway.charges.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_decline_cancels_order() {
        let f = fixture();
        let p = product(&f.store, "Audit", 1000).await;

        let err = f
            .service
            .create_order(UserId::new(1), checkout(&[(p, 1, None)], "pm_card_declined"))
            .await
            .unwrap_err();
        let OrderError::PaymentFailed { order_id, .. } = err else {
            panic!("expected PaymentFailed, got {err:?}");
        };

        let order = f.service.get_order(&customer(1), order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Cancelled);
    }

    #[tokio::test]
    async fn test_provider_error_leaves_order_processing() {
        let f = fixture();
        let p = product(&f.store, "Audit", 1000).await;

        let err = f
            .service
            .create_order(UserId::new(1), checkout(&[(p, 1, None)], "pm_card_error"))
            .await
            .unwrap_err();
        let OrderError::CreationFailed { order_id } = err else {
            panic!("expected CreationFailed, got {err:?}");
        };

        let order = f.service.get_order(&customer(1), order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Processing);
    }

    #[tokio::test]
    async fn test_idempotent_replay_charges_once() {
        let f = fixture();
        let p = product(&f.store, "Audit", 1000).await;
        let mut request = checkout(&[(p, 1, None)], "pm_card_visa");
        request.idempotency_key = Some("abc-123".to_owned());

        let first = f
            .service
            .create_order(UserId::new(1), request.clone())
            .await
            .unwrap();
        let second = f
            .service
            .create_order(UserId::new(1), request)
            .await
            .unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(f.gateway.charges.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_other_user_is_forbidden() {
        let f = fixture();
        let p = product(&f.store, "Audit", 1000).await;
        let order = f
            .service
            .create_order(UserId::new(1), checkout(&[(p, 1, None)], "pm_card_visa"))
            .await
            .unwrap();

        assert!(matches!(
            f.service.get_order(&customer(2), order.id).await,
            Err(OrderError::Forbidden)
        ));
        assert!(matches!(
            f.service.get_order(&customer(1), OrderId::new(9999)).await,
            Err(OrderError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_terminal_orders_cannot_be_cancelled() {
        let f = fixture();
        let p = product(&f.store, "Audit", 1000).await;
        let order = f
            .service
            .create_order(UserId::new(1), checkout(&[(p, 1, None)], "pm_card_visa"))
            .await
            .unwrap();

        assert!(matches!(
            f.service.cancel_order(&customer(1), order.id).await,
            Err(OrderError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn test_admin_override_is_audited() {
        let f = fixture();
        let p = product(&f.store, "Audit", 1000).await;
        let err = f
            .service
            .create_order(UserId::new(1), checkout(&[(p, 1, None)], "pm_card_error"))
            .await
            .unwrap_err();
        let OrderError::CreationFailed { order_id } = err else {
            panic!("expected CreationFailed");
        };

        let admin = UserId::new(99);
        let order = f
            .service
            .admin_update_status(
                admin,
                order_id,
                OrderStatus::Completed,
                Some("settled by bank transfer".to_owned()),
            )
            .await
            .unwrap();
        assert_eq!(order.status, OrderStatus::Completed);

        let history = f.service.history(&customer(1), order_id).await.unwrap();
        let last = history.last().unwrap();
        assert_eq!(last.actor_id, Some(admin));
        assert_eq!(last.note.as_deref(), Some("settled by bank transfer"));

        assert!(matches!(
            f.service
                .admin_update_status(admin, order_id, OrderStatus::Pending, None)
                .await,
            Err(OrderError::InvalidTransition(_))
        ));
    }

    #[tokio::test]
    async fn test_webhook_completes_processing_order_once() {
        let f = fixture();
        let p = product(&f.store, "Audit", 1000).await;
        let Err(OrderError::CreationFailed { order_id }) = f
            .service
            .create_order(UserId::new(1), checkout(&[(p, 1, None)], "pm_card_error"))
            .await
        else {
            panic!("expected CreationFailed");
        };

        let event = PaymentEvent::Succeeded {
            order_id: Some(order_id),
            reference: "pi_late".to_owned(),
        };
        f.service.apply_payment_event(event.clone()).await.unwrap();
        f.service.apply_payment_event(event).await.unwrap();

        let order = f.service.get_order(&customer(1), order_id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.payment_reference.as_deref(), Some("pi_late"));
    }

    #[tokio::test]
    async fn test_webhook_without_metadata_matches_payment_reference() {
        let f = fixture();
        let p = product(&f.store, "Audit", 1000).await;
        let pending = f
            .service
            .create_order(
                UserId::new(1),
                checkout(&[(p, 1, None)], "pm_card_authenticationRequired"),
            )
            .await
            .unwrap();
        assert_eq!(pending.status, OrderStatus::Processing);
        let reference = pending.payment_reference.clone().unwrap();

        f.service
            .apply_payment_event(PaymentEvent::Succeeded {
                order_id: None,
                reference: reference.clone(),
            })
            .await
            .unwrap();
        let order = f.service.get_order(&customer(1), pending.id).await.unwrap();
        assert_eq!(order.status, OrderStatus::Completed);
        assert_eq!(order.payment_reference, Some(reference));

        assert!(matches!(
            f.service
                .apply_payment_event(PaymentEvent::Failed {
                    order_id: None,
                    reference: "pi_never_recorded".to_owned(),
                    reason: "card declined".to_owned(),
                })
                .await,
            Err(OrderError::NotFound)
        ));
    }

    #[tokio::test]
    async fn test_customer_cannot_list_all_orders() {
        let f = fixture();
        assert!(matches!(
            f.service
                .list_orders(
                    &customer(1),
                    OrderListing {
                        all_users: true,
                        ..OrderListing::default()
                    }
                )
                .await,
            Err(OrderError::Forbidden)
        ));
    }
}
