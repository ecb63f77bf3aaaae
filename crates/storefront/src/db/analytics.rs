//! Read-only aggregate queries for the admin dashboard.

use async_trait::async_trait;
use chrono::NaiveDate;
use rust_decimal::Decimal;
use sqlx::PgPool;

use checklistpro_core::{Money, ProductId, Slug};

use super::RepositoryError;
use crate::models::{DailyRevenue, DashboardSummary, ProductStats, StatusCounts, UserStats};

/// Aggregates over orders, products and users.
#[async_trait]
pub trait AnalyticsRepository: Send + Sync {
    async fn dashboard(&self) -> Result<DashboardSummary, RepositoryError>;

    /// Completed-order revenue per day for the last `days` days, oldest first.
    /// Days without orders are omitted.
    async fn daily_revenue(&self, days: u32) -> Result<Vec<DailyRevenue>, RepositoryError>;

    /// Products by download count, most downloaded first.
    async fn top_products(&self, limit: u32) -> Result<Vec<ProductStats>, RepositoryError>;

    /// Account counts; `new_users` covers the last `days` days.
    async fn user_stats(&self, days: u32) -> Result<UserStats, RepositoryError>;
}

fn count(value: i64) -> u64 {
    u64::try_from(value).unwrap_or_default()
}

fn money(value: Decimal) -> Result<Money, RepositoryError> {
    Money::new(value)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid aggregate amount: {e}")))
}

#[derive(sqlx::FromRow)]
struct DashboardRow {
    pending: i64,
    processing: i64,
    completed: i64,
    cancelled: i64,
    total_revenue: Decimal,
    total_users: i64,
    total_products: i64,
    enabled_products: i64,
    total_downloads: i64,
    total_views: i64,
}

#[derive(sqlx::FromRow)]
struct DailyRevenueRow {
    day: NaiveDate,
    orders: i64,
    revenue: Decimal,
}

#[derive(sqlx::FromRow)]
struct ProductStatsRow {
    id: i32,
    name: String,
    slug: String,
    enabled: bool,
    download_count: i64,
    view_count: i64,
    units_sold: i64,
    revenue: Decimal,
}

#[derive(sqlx::FromRow)]
struct UserStatsRow {
    total: i64,
    customers: i64,
    admins: i64,
    active: i64,
    new_users: i64,
}

/// `PostgreSQL`-backed [`AnalyticsRepository`].
#[derive(Clone)]
pub struct PgAnalyticsRepository {
    pool: PgPool,
}

impl PgAnalyticsRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

#[async_trait]
impl AnalyticsRepository for PgAnalyticsRepository {
    async fn dashboard(&self) -> Result<DashboardSummary, RepositoryError> {
        let row = sqlx::query_as::<_, DashboardRow>(
            "SELECT \
                 (SELECT COUNT(*) FROM orders WHERE status = 'pending') AS pending, \
                 (SELECT COUNT(*) FROM orders WHERE status = 'processing') AS processing, \
                 (SELECT COUNT(*) FROM orders WHERE status = 'completed') AS completed, \
                 (SELECT COUNT(*) FROM orders WHERE status = 'cancelled') AS cancelled, \
                 (SELECT COALESCE(SUM(total), 0) FROM orders WHERE status = 'completed') \
                     AS total_revenue, \
                 (SELECT COUNT(*) FROM users) AS total_users, \
                 (SELECT COUNT(*) FROM products) AS total_products, \
                 (SELECT COUNT(*) FROM products WHERE enabled) AS enabled_products, \
                 (SELECT COALESCE(SUM(download_count), 0)::BIGINT FROM products) \
                     AS total_downloads, \
                 (SELECT COALESCE(SUM(view_count), 0)::BIGINT FROM products) AS total_views",
        )
        .fetch_one(&self.pool)
        .await?;

        let orders_by_status = StatusCounts {
            pending: count(row.pending),
            processing: count(row.processing),
            completed: count(row.completed),
            cancelled: count(row.cancelled),
        };

        Ok(DashboardSummary {
            total_orders: orders_by_status.pending
                + orders_by_status.processing
                + orders_by_status.completed
                + orders_by_status.cancelled,
            orders_by_status,
            total_revenue: money(row.total_revenue)?,
            total_users: count(row.total_users),
            total_products: count(row.total_products),
            enabled_products: count(row.enabled_products),
            total_downloads: row.total_downloads,
            total_views: row.total_views,
        })
    }

    async fn daily_revenue(&self, days: u32) -> Result<Vec<DailyRevenue>, RepositoryError> {
        let rows = sqlx::query_as::<_, DailyRevenueRow>(
            "SELECT (created_at AT TIME ZONE 'UTC')::DATE AS day, \
                    COUNT(*) AS orders, \
                    COALESCE(SUM(total), 0) AS revenue \
             FROM orders \
             WHERE status = 'completed' \
               AND created_at >= now() - make_interval(days => $1) \
             GROUP BY day \
             ORDER BY day",
        )
        .bind(i32::try_from(days).unwrap_or(i32::MAX))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(DailyRevenue {
                    date: row.day,
                    orders: count(row.orders),
                    revenue: money(row.revenue)?,
                })
            })
            .collect()
    }

    async fn top_products(&self, limit: u32) -> Result<Vec<ProductStats>, RepositoryError> {
        let rows = sqlx::query_as::<_, ProductStatsRow>(
            "SELECT p.id, p.name, p.slug, p.enabled, p.download_count, p.view_count, \
                    COALESCE(SUM(i.quantity) FILTER (WHERE o.status = 'completed'), 0)::BIGINT \
                        AS units_sold, \
                    COALESCE(SUM(i.quantity * i.unit_price) FILTER (WHERE o.status = 'completed'), 0) \
                        AS revenue \
             FROM products p \
             LEFT JOIN order_items i ON i.product_id = p.id \
             LEFT JOIN orders o ON o.id = i.order_id \
             GROUP BY p.id \
             ORDER BY p.download_count DESC, p.id \
             LIMIT $1",
        )
        .bind(i64::from(limit))
        .fetch_all(&self.pool)
        .await?;

        rows.into_iter()
            .map(|row| {
                Ok(ProductStats {
                    product_id: ProductId::new(row.id),
                    slug: Slug::parse(&row.slug).map_err(|e| {
                        RepositoryError::DataCorruption(format!("invalid slug in database: {e}"))
                    })?,
                    name: row.name,
                    enabled: row.enabled,
                    downloads: row.download_count,
                    views: row.view_count,
                    units_sold: count(row.units_sold),
                    revenue: money(row.revenue)?,
                })
            })
            .collect()
    }

    async fn user_stats(&self, days: u32) -> Result<UserStats, RepositoryError> {
        let row = sqlx::query_as::<_, UserStatsRow>(
            "SELECT COUNT(*) AS total, \
                    COUNT(*) FILTER (WHERE role = 'customer') AS customers, \
                    COUNT(*) FILTER (WHERE role = 'admin') AS admins, \
                    COUNT(*) FILTER (WHERE active) AS active, \
                    COUNT(*) FILTER (WHERE created_at >= now() - make_interval(days => $1)) \
                        AS new_users \
             FROM users",
        )
        .bind(i32::try_from(days).unwrap_or(i32::MAX))
        .fetch_one(&self.pool)
        .await?;

        Ok(UserStats {
            total: count(row.total),
            customers: count(row.customers),
            admins: count(row.admins),
            active: count(row.active),
            new_users: count(row.new_users),
        })
    }
}
