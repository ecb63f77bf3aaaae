//! Order repository: orders, line items and the status audit trail.

use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::{PgPool, Postgres, QueryBuilder};

use checklistpro_core::{Money, OrderId, OrderStatus, ProductId, UserId};

use super::{RepositoryError, conflict_on_unique};
use crate::models::{LineItem, NewOrder, Order, OrderFilter, Page, StatusChange, StatusEvent};

/// Storage for orders.
#[async_trait]
pub trait OrderRepository: Send + Sync {
    /// Persist a `pending` order, its line items and the initial audit event
    /// in one transaction.
    ///
    /// Returns `RepositoryError::Conflict` if the user already has an order
    /// with the same idempotency key.
    async fn create_pending(&self, order: NewOrder) -> Result<Order, RepositoryError>;

    async fn find_by_idempotency_key(
        &self,
        user_id: UserId,
        key: &str,
    ) -> Result<Option<Order>, RepositoryError>;

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError>;

    /// Orders, newest first.
    async fn list(&self, filter: &OrderFilter) -> Result<Page<Order>, RepositoryError>;

    /// Every completed order of a user, newest first.
    async fn list_completed_for_user(&self, user_id: UserId)
    -> Result<Vec<Order>, RepositoryError>;

    /// Apply `change` only if the order is still in `change.from`.
    ///
    /// Returns `RepositoryError::Conflict` when the order moved on in the
    /// meantime and `RepositoryError::NotFound` when it does not exist.
    async fn transition_status(
        &self,
        id: OrderId,
        change: StatusChange,
    ) -> Result<Order, RepositoryError>;

    async fn record_payment_reference(
        &self,
        id: OrderId,
        reference: &str,
    ) -> Result<(), RepositoryError>;

    async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Order>, RepositoryError>;

    /// Audit events for an order, oldest first.
    async fn status_history(&self, id: OrderId) -> Result<Vec<StatusEvent>, RepositoryError>;
}

// =============================================================================
// Row Types
// =============================================================================

const ORDER_COLUMNS: &str = "id, user_id, status, subtotal, tax, total, currency, payment_method, \
     payment_reference, idempotency_key, created_at, updated_at";

#[derive(sqlx::FromRow)]
struct OrderRow {
    id: i32,
    user_id: i32,
    status: String,
    subtotal: Decimal,
    tax: Decimal,
    total: Decimal,
    currency: String,
    payment_method: String,
    payment_reference: Option<String>,
    idempotency_key: Option<String>,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

#[derive(sqlx::FromRow)]
struct LineItemRow {
    order_id: i32,
    product_id: i32,
    product_name: String,
    quantity: i32,
    unit_price: Decimal,
}

#[derive(sqlx::FromRow)]
struct StatusEventRow {
    order_id: i32,
    from_status: Option<String>,
    to_status: String,
    actor_id: Option<i32>,
    note: Option<String>,
    created_at: DateTime<Utc>,
}

fn corrupt(what: &str, err: impl std::fmt::Display) -> RepositoryError {
    RepositoryError::DataCorruption(format!("invalid {what} in database: {err}"))
}

fn money(value: Decimal, what: &str) -> Result<Money, RepositoryError> {
    Money::new(value).map_err(|e| corrupt(what, e))
}

fn status(value: &str) -> Result<OrderStatus, RepositoryError> {
    value.parse().map_err(|e| corrupt("order status", e))
}

impl TryFrom<LineItemRow> for LineItem {
    type Error = RepositoryError;

    fn try_from(row: LineItemRow) -> Result<Self, Self::Error> {
        Ok(Self {
            product_id: ProductId::new(row.product_id),
            product_name: row.product_name,
            quantity: u32::try_from(row.quantity).map_err(|e| corrupt("quantity", e))?,
            unit_price: money(row.unit_price, "unit price")?,
        })
    }
}

impl TryFrom<StatusEventRow> for StatusEvent {
    type Error = RepositoryError;

    fn try_from(row: StatusEventRow) -> Result<Self, Self::Error> {
        Ok(Self {
            order_id: OrderId::new(row.order_id),
            from_status: row.from_status.as_deref().map(status).transpose()?,
            to_status: status(&row.to_status)?,
            actor_id: row.actor_id.map(UserId::new),
            note: row.note,
            created_at: row.created_at,
        })
    }
}

fn order_from_row(row: OrderRow, items: Vec<LineItem>) -> Result<Order, RepositoryError> {
    Ok(Order {
        id: OrderId::new(row.id),
        user_id: UserId::new(row.user_id),
        items,
        subtotal: money(row.subtotal, "subtotal")?,
        tax: money(row.tax, "tax")?,
        total: money(row.total, "total")?,
        currency: row.currency,
        status: status(&row.status)?,
        payment_method: row.payment_method,
        payment_reference: row.payment_reference,
        idempotency_key: row.idempotency_key,
        created_at: row.created_at,
        updated_at: row.updated_at,
    })
}

// =============================================================================
// PostgreSQL
// =============================================================================

/// `PostgreSQL`-backed [`OrderRepository`].
#[derive(Clone)]
pub struct PgOrderRepository {
    pool: PgPool,
}

impl PgOrderRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Attach line items to a batch of order rows with one extra query.
    async fn hydrate(&self, rows: Vec<OrderRow>) -> Result<Vec<Order>, RepositoryError> {
        if rows.is_empty() {
            return Ok(Vec::new());
        }

        let ids: Vec<i32> = rows.iter().map(|r| r.id).collect();
        let item_rows = sqlx::query_as::<_, LineItemRow>(
            "SELECT order_id, product_id, product_name, quantity, unit_price \
             FROM order_items WHERE order_id = ANY($1) ORDER BY order_id, position",
        )
        .bind(&ids)
        .fetch_all(&self.pool)
        .await?;

        let mut items: HashMap<i32, Vec<LineItem>> =
            HashMap::with_capacity(rows.len());
        for row in item_rows {
            items
                .entry(row.order_id)
                .or_default()
                .push(LineItem::try_from(row)?);
        }

        rows.into_iter()
            .map(|row| {
                let lines = items.remove(&row.id).unwrap_or_default();
                order_from_row(row, lines)
            })
            .collect()
    }

    async fn hydrate_one(&self, row: Option<OrderRow>) -> Result<Option<Order>, RepositoryError> {
        match row {
            Some(row) => Ok(self.hydrate(vec![row]).await?.pop()),
            None => Ok(None),
        }
    }
}

fn push_order_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &OrderFilter) {
    qb.push(" WHERE TRUE");
    if let Some(user_id) = filter.user_id {
        qb.push(" AND user_id = ").push_bind(user_id.as_i32());
    }
    if let Some(status) = filter.status {
        qb.push(" AND status = ").push_bind(status.as_str());
    }
}

#[async_trait]
impl OrderRepository for PgOrderRepository {
    async fn create_pending(&self, order: NewOrder) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "INSERT INTO orders \
                 (user_id, status, subtotal, tax, total, currency, payment_method, idempotency_key) \
             VALUES ($1, 'pending', $2, $3, $4, $5, $6, $7) \
             RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(order.user_id.as_i32())
            .bind(order.totals.subtotal.amount())
            .bind(order.totals.tax.amount())
            .bind(order.totals.total.amount())
            .bind(&order.currency)
            .bind(&order.payment_method)
            .bind(order.idempotency_key.as_deref())
            .fetch_one(&mut *tx)
            .await
            .map_err(|e| conflict_on_unique(e, "duplicate idempotency key"))?;

        for (position, item) in order.items.iter().enumerate() {
            sqlx::query(
                "INSERT INTO order_items \
                     (order_id, position, product_id, product_name, quantity, unit_price) \
                 VALUES ($1, $2, $3, $4, $5, $6)",
            )
            .bind(row.id)
            .bind(i32::try_from(position).unwrap_or(i32::MAX))
            .bind(item.product_id.as_i32())
            .bind(&item.product_name)
            .bind(i32::try_from(item.quantity).unwrap_or(i32::MAX))
            .bind(item.unit_price.amount())
            .execute(&mut *tx)
            .await?;
        }

        sqlx::query(
            "INSERT INTO order_status_events (order_id, from_status, to_status) \
             VALUES ($1, NULL, 'pending')",
        )
        .bind(row.id)
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        order_from_row(row, order.items)
    }

    async fn find_by_idempotency_key(
        &self,
        user_id: UserId,
        key: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let sql =
            format!("SELECT {ORDER_COLUMNS} FROM orders WHERE user_id = $1 AND idempotency_key = $2");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(user_id.as_i32())
            .bind(key)
            .fetch_optional(&self.pool)
            .await?;
        self.hydrate_one(row).await
    }

    async fn get(&self, id: OrderId) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE id = $1");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id.as_i32())
            .fetch_optional(&self.pool)
            .await?;
        self.hydrate_one(row).await
    }

    async fn list(&self, filter: &OrderFilter) -> Result<Page<Order>, RepositoryError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM orders");
        push_order_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {ORDER_COLUMNS} FROM orders"));
        push_order_filters(&mut query, filter);
        query
            .push(" ORDER BY created_at DESC, id DESC LIMIT ")
            .push_bind(i64::from(filter.page.limit))
            .push(" OFFSET ")
            .push_bind(filter.page.offset());

        let rows = query
            .build_query_as::<OrderRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(
            self.hydrate(rows).await?,
            filter.page,
            u64::try_from(total).unwrap_or_default(),
        ))
    }

    async fn list_completed_for_user(
        &self,
        user_id: UserId,
    ) -> Result<Vec<Order>, RepositoryError> {
        let sql = format!(
            "SELECT {ORDER_COLUMNS} FROM orders \
             WHERE user_id = $1 AND status = 'completed' \
             ORDER BY created_at DESC, id DESC"
        );
        let rows = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(user_id.as_i32())
            .fetch_all(&self.pool)
            .await?;
        self.hydrate(rows).await
    }

    async fn transition_status(
        &self,
        id: OrderId,
        change: StatusChange,
    ) -> Result<Order, RepositoryError> {
        let mut tx = self.pool.begin().await?;

        let sql = format!(
            "UPDATE orders SET \
                 status = $3, \
                 payment_reference = COALESCE($4, payment_reference), \
                 updated_at = now() \
             WHERE id = $1 AND status = $2 \
             RETURNING {ORDER_COLUMNS}"
        );
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(id.as_i32())
            .bind(change.from.as_str())
            .bind(change.to.as_str())
            .bind(change.payment_reference.as_deref())
            .fetch_optional(&mut *tx)
            .await?;

        let Some(row) = row else {
            let exists: Option<i32> = sqlx::query_scalar("SELECT id FROM orders WHERE id = $1")
                .bind(id.as_i32())
                .fetch_optional(&mut *tx)
                .await?;
            return Err(match exists {
                Some(_) => RepositoryError::Conflict(format!(
                    "order {id} is no longer {}",
                    change.from
                )),
                None => RepositoryError::NotFound,
            });
        };

        sqlx::query(
            "INSERT INTO order_status_events (order_id, from_status, to_status, actor_id, note) \
             VALUES ($1, $2, $3, $4, $5)",
        )
        .bind(id.as_i32())
        .bind(change.from.as_str())
        .bind(change.to.as_str())
        .bind(change.actor.map(|a| a.as_i32()))
        .bind(change.note.as_deref())
        .execute(&mut *tx)
        .await?;

        tx.commit().await?;

        self.hydrate_one(Some(row))
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn record_payment_reference(
        &self,
        id: OrderId,
        reference: &str,
    ) -> Result<(), RepositoryError> {
        let result = sqlx::query(
            "UPDATE orders SET payment_reference = $2, updated_at = now() WHERE id = $1",
        )
        .bind(id.as_i32())
        .bind(reference)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn find_by_payment_reference(
        &self,
        reference: &str,
    ) -> Result<Option<Order>, RepositoryError> {
        let sql = format!("SELECT {ORDER_COLUMNS} FROM orders WHERE payment_reference = $1");
        let row = sqlx::query_as::<_, OrderRow>(&sql)
            .bind(reference)
            .fetch_optional(&self.pool)
            .await?;
        self.hydrate_one(row).await
    }

    async fn status_history(&self, id: OrderId) -> Result<Vec<StatusEvent>, RepositoryError> {
        sqlx::query_as::<_, StatusEventRow>(
            "SELECT order_id, from_status, to_status, actor_id, note, created_at \
             FROM order_status_events WHERE order_id = $1 ORDER BY id",
        )
        .bind(id.as_i32())
        .fetch_all(&self.pool)
        .await?
        .into_iter()
        .map(StatusEvent::try_from)
        .collect()
    }
}
