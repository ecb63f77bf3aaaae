//! Admin dashboard aggregates.

use serde::Serialize;

use checklistpro_core::Money;

use crate::db::{AnalyticsRepository, RepositoryError};
use crate::models::{DailyRevenue, DashboardSummary, ProductStats, UserStats};

/// Default reporting window in days.
pub const DEFAULT_WINDOW_DAYS: u32 = 30;
/// Longest reporting window in days.
pub const MAX_WINDOW_DAYS: u32 = 365;

const DEFAULT_TOP_PRODUCTS: u32 = 10;
const MAX_TOP_PRODUCTS: u32 = 100;

/// Revenue over a window.
#[derive(Debug, Clone, Serialize)]
pub struct RevenueReport {
    pub days: u32,
    pub total: Money,
    pub orders: u64,
    pub daily: Vec<DailyRevenue>,
}

/// User counts over a window.
#[derive(Debug, Clone, Serialize)]
pub struct UserReport {
    pub days: u32,
    #[serde(flatten)]
    pub stats: UserStats,
}

/// Read-only analytics for administrators.
pub struct AnalyticsService<'a> {
    repo: &'a dyn AnalyticsRepository,
}

impl<'a> AnalyticsService<'a> {
    #[must_use]
    pub const fn new(repo: &'a dyn AnalyticsRepository) -> Self {
        Self { repo }
    }

    /// # Errors
    ///
    /// Returns `RepositoryError` on storage failures.
    pub async fn dashboard(&self) -> Result<DashboardSummary, RepositoryError> {
        self.repo.dashboard().await
    }

    /// Daily completed-order revenue for the last `days` days.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` on storage failures.
    pub async fn revenue(&self, days: Option<u32>) -> Result<RevenueReport, RepositoryError> {
        let days = window(days);
        let daily = self.repo.daily_revenue(days).await?;

        Ok(RevenueReport {
            days,
            total: daily.iter().map(|d| d.revenue).sum(),
            orders: daily.iter().map(|d| d.orders).sum(),
            daily,
        })
    }

    /// Most downloaded products.
    ///
    /// # Errors
    ///
    /// Returns `RepositoryError` on storage failures.
    pub async fn top_products(&self, limit: Option<u32>) -> Result<Vec<ProductStats>, RepositoryError> {
        let limit = limit
            .unwrap_or(DEFAULT_TOP_PRODUCTS)
            .clamp(1, MAX_TOP_PRODUCTS);
        self.repo.top_products(limit).await
    }

    /// # Errors
    ///
    /// Returns `RepositoryError` on storage failures.
    pub async fn users(&self, days: Option<u32>) -> Result<UserReport, RepositoryError> {
        let days = window(days);
        Ok(UserReport {
            days,
            stats: self.repo.user_stats(days).await?,
        })
    }
}

fn window(days: Option<u32>) -> u32 {
    days.unwrap_or(DEFAULT_WINDOW_DAYS).clamp(1, MAX_WINDOW_DAYS)
}
