//! Read-only aggregates for the admin dashboard.

use chrono::NaiveDate;
use serde::Serialize;

use checklistpro_core::{Money, ProductId, Slug};

/// Order counts per status.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct StatusCounts {
    pub pending: u64,
    pub processing: u64,
    pub completed: u64,
    pub cancelled: u64,
}

/// Headline numbers.
#[derive(Debug, Clone, Serialize)]
pub struct DashboardSummary {
    pub total_orders: u64,
    pub orders_by_status: StatusCounts,
    /// Sum of completed order totals.
    pub total_revenue: Money,
    pub total_users: u64,
    pub total_products: u64,
    pub enabled_products: u64,
    pub total_downloads: i64,
    pub total_views: i64,
}

/// Completed-order revenue for one day.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct DailyRevenue {
    pub date: NaiveDate,
    pub orders: u64,
    pub revenue: Money,
}

/// Per-product engagement and sales.
#[derive(Debug, Clone, Serialize)]
pub struct ProductStats {
    pub product_id: ProductId,
    pub name: String,
    pub slug: Slug,
    pub enabled: bool,
    pub downloads: i64,
    pub views: i64,
    /// Units across completed orders.
    pub units_sold: u64,
    /// Line revenue across completed orders, before tax.
    pub revenue: Money,
}

/// Account counts.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct UserStats {
    pub total: u64,
    pub customers: u64,
    pub admins: u64,
    pub active: u64,
    /// Accounts created inside the requested window.
    pub new_users: u64,
}
