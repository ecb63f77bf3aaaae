//! Application state shared across handlers.

use std::sync::Arc;
use std::time::Instant;

use crate::config::StorefrontConfig;
use crate::db::Repositories;
use crate::services::orders::CheckoutSettings;
use crate::services::{CatalogService, DownloadService, OrderService, PaymentGateway};

/// Application state shared across all handlers.
///
/// This struct is cheaply cloneable via `Arc` and provides access to
/// shared resources like repositories, services and configuration.
#[derive(Clone)]
pub struct AppState {
    inner: Arc<AppStateInner>,
}

struct AppStateInner {
    config: StorefrontConfig,
    repos: Repositories,
    catalog: CatalogService,
    orders: OrderService,
    downloads: DownloadService,
    started_at: Instant,
}

impl AppState {
    /// Create a new application state.
    ///
    /// # Arguments
    ///
    /// * `config` - Storefront configuration
    /// * `repos` - Repository set (`PostgreSQL` in production, in-memory in tests)
    /// * `gateway` - Payment gateway used at checkout
    #[must_use]
    pub fn new(
        config: StorefrontConfig,
        repos: Repositories,
        gateway: Arc<dyn PaymentGateway>,
    ) -> Self {
        let catalog = CatalogService::new(repos.catalog.clone());
        let orders = OrderService::new(
            repos.orders.clone(),
            repos.catalog.clone(),
            gateway,
            CheckoutSettings {
                tax_rate: config.checkout.tax_rate,
                currency: config.checkout.currency.clone(),
            },
        );
        let downloads = DownloadService::new(
            repos.orders.clone(),
            repos.catalog.clone(),
            config.downloads_dir.clone(),
        );

        Self {
            inner: Arc::new(AppStateInner {
                config,
                repos,
                catalog,
                orders,
                downloads,
                started_at: Instant::now(),
            }),
        }
    }

    /// Get a reference to the storefront configuration.
    #[must_use]
    pub fn config(&self) -> &StorefrontConfig {
        &self.inner.config
    }

    #[must_use]
    pub fn repos(&self) -> &Repositories {
        &self.inner.repos
    }

    #[must_use]
    pub fn catalog(&self) -> &CatalogService {
        &self.inner.catalog
    }

    #[must_use]
    pub fn orders(&self) -> &OrderService {
        &self.inner.orders
    }

    #[must_use]
    pub fn downloads(&self) -> &DownloadService {
        &self.inner.downloads
    }

    /// Seconds since the state was built.
    #[must_use]
    pub fn uptime_secs(&self) -> u64 {
        self.inner.started_at.elapsed().as_secs()
    }
}
