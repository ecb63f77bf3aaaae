//! Order domain types.

use chrono::{DateTime, Utc};
use serde::Serialize;

use checklistpro_core::{Money, OrderId, OrderStatus, OrderTotals, ProductId, UserId};

use super::catalog::Pagination;

/// One product line of an order, with its price captured at purchase time.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct LineItem {
    pub product_id: ProductId,
    /// Product name when the order was placed.
    pub product_name: String,
    pub quantity: u32,
    pub unit_price: Money,
}

impl LineItem {
    #[must_use]
    pub fn line_total(&self) -> Money {
        self.unit_price * self.quantity
    }
}

/// A persisted order.
#[derive(Debug, Clone, Serialize)]
pub struct Order {
    pub id: OrderId,
    pub user_id: UserId,
    pub items: Vec<LineItem>,
    pub subtotal: Money,
    pub tax: Money,
    pub total: Money,
    pub currency: String,
    pub status: OrderStatus,
    pub payment_method: String,
    pub payment_reference: Option<String>,
    pub idempotency_key: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Order {
    #[must_use]
    pub fn contains_product(&self, product_id: ProductId) -> bool {
        self.items.iter().any(|item| item.product_id == product_id)
    }
}

/// Input for persisting a new `pending` order.
#[derive(Debug, Clone)]
pub struct NewOrder {
    pub user_id: UserId,
    pub items: Vec<LineItem>,
    pub totals: OrderTotals,
    pub currency: String,
    pub payment_method: String,
    pub idempotency_key: Option<String>,
}

/// A status change to apply with compare-and-set semantics.
#[derive(Debug, Clone)]
pub struct StatusChange {
    /// Status the order must currently have.
    pub from: OrderStatus,
    pub to: OrderStatus,
    /// Who made the change; `None` for the system (checkout, webhooks).
    pub actor: Option<UserId>,
    pub note: Option<String>,
    /// Payment reference to record alongside the change.
    pub payment_reference: Option<String>,
}

/// An audit record of one status change.
#[derive(Debug, Clone, Serialize)]
pub struct StatusEvent {
    pub order_id: OrderId,
    pub from_status: Option<OrderStatus>,
    pub to_status: OrderStatus,
    pub actor_id: Option<UserId>,
    pub note: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Order listing filter.
#[derive(Debug, Clone, Default)]
pub struct OrderFilter {
    /// Restrict to one owner; `None` lists every user's orders.
    pub user_id: Option<UserId>,
    pub status: Option<OrderStatus>,
    pub page: Pagination,
}
