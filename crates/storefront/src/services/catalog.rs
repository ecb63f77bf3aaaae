//! Catalog service: product and category reads, admin writes and the
//! best-effort view tracker.
//!
//! Public reads by slug go through a `moka` cache (5-minute TTL). Every admin
//! write clears it. Checkout never reads through this cache; it asks the
//! repository directly so prices are always live.

use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use thiserror::Error;
use tracing::{debug, instrument};

use checklistpro_core::{CategoryId, Money, ProductId};

use crate::db::{CatalogRepository, RepositoryError};
use crate::models::{
    Category, CategoryUpdate, NewCategory, NewProduct, Page, Pagination, Product, ProductFilter,
    ProductSort, ProductUpdate,
};

/// Errors from catalog operations.
#[derive(Debug, Error)]
pub enum CatalogError {
    #[error("{0} not found")]
    NotFound(&'static str),

    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    Conflict(String),

    #[error("database error: {0}")]
    Repository(RepositoryError),
}

impl From<RepositoryError> for CatalogError {
    fn from(err: RepositoryError) -> Self {
        match err {
            RepositoryError::Conflict(msg) => Self::Conflict(msg),
            other => Self::Repository(other),
        }
    }
}

/// Public product listing request, before category resolution.
#[derive(Debug, Clone, Default)]
pub struct ProductQuery {
    /// Category id or slug.
    pub category: Option<String>,
    pub search: Option<String>,
    pub sort: ProductSort,
    pub include_disabled: bool,
    pub page: Pagination,
}

#[derive(Debug, Clone, Hash, PartialEq, Eq)]
enum CacheKey {
    Product(String),
    Categories,
    Category(String),
}

#[derive(Debug, Clone)]
enum CacheValue {
    Product(Box<Product>),
    Categories(Vec<Category>),
    Category(Box<Category>),
}

/// Catalog reads and writes.
#[derive(Clone)]
pub struct CatalogService {
    inner: Arc<CatalogServiceInner>,
}

struct CatalogServiceInner {
    repo: Arc<dyn CatalogRepository>,
    cache: Cache<CacheKey, CacheValue>,
}

impl CatalogService {
    #[must_use]
    pub fn new(repo: Arc<dyn CatalogRepository>) -> Self {
        let cache = Cache::builder()
            .max_capacity(1000)
            .time_to_live(Duration::from_secs(300)) // 5 minutes
            .build();

        Self {
            inner: Arc::new(CatalogServiceInner { repo, cache }),
        }
    }

    // =========================================================================
    // Products
    // =========================================================================

    /// List products.
    ///
    /// A category given as a number is taken as an id; anything else is a
    /// slug. An unknown slug yields an empty page rather than an error.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if the query fails.
    #[instrument(skip(self))]
    pub async fn list_products(&self, query: ProductQuery) -> Result<Page<Product>, CatalogError> {
        let category_id = match query.category.as_deref().map(str::trim) {
            None | Some("") => None,
            Some(reference) => match reference.parse::<i32>() {
                Ok(id) => Some(CategoryId::new(id)),
                Err(_) => match self.get_category(reference).await {
                    Ok(category) => Some(category.id),
                    Err(CatalogError::NotFound(_)) => {
                        return Ok(Page::new(Vec::new(), query.page, 0));
                    }
                    Err(e) => return Err(e),
                },
            },
        };

        let filter = ProductFilter {
            category_id,
            search: query
                .search
                .map(|s| s.trim().to_owned())
                .filter(|s| !s.is_empty()),
            sort: query.sort,
            include_disabled: query.include_disabled,
            page: query.page,
        };

        Ok(self.inner.repo.list_products(&filter).await?)
    }

    /// An enabled product by slug.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if no enabled product has that slug.
    pub async fn get_product(&self, slug: &str) -> Result<Product, CatalogError> {
        let cache_key = CacheKey::Product(slug.to_owned());

        if let Some(CacheValue::Product(product)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for product");
            return Ok(*product);
        }

        let product = self
            .inner
            .repo
            .get_product_by_slug(slug)
            .await?
            .ok_or(CatalogError::NotFound("product"))?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Product(Box::new(product.clone())))
            .await;

        Ok(product)
    }

    /// A product by id, including disabled ones.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if the product does not exist.
    pub async fn get_product_by_id(&self, id: ProductId) -> Result<Product, CatalogError> {
        self.inner
            .repo
            .get_product(id)
            .await?
            .ok_or(CatalogError::NotFound("product"))
    }

    /// Create a product.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Validation` for an empty name, a price above
    /// [`Money::MAX_PRICE`] or an unknown category, and
    /// `CatalogError::Conflict` for a taken slug.
    #[instrument(skip(self, product), fields(slug = %product.slug))]
    pub async fn create_product(&self, product: NewProduct) -> Result<Product, CatalogError> {
        if product.name.trim().is_empty() {
            return Err(CatalogError::Validation("name is required".to_owned()));
        }
        check_price(Some(product.price))?;
        check_price(product.original_price)?;
        if let Some(category_id) = product.category_id {
            self.require_category(category_id).await?;
        }

        let created = self.inner.repo.create_product(product).await?;
        self.invalidate().await;

        tracing::info!(product_id = %created.id, "Product created");
        Ok(created)
    }

    /// Apply a partial update.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if the product does not exist.
    #[instrument(skip(self, update))]
    pub async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, CatalogError> {
        if update.name.as_deref().is_some_and(|n| n.trim().is_empty()) {
            return Err(CatalogError::Validation("name cannot be empty".to_owned()));
        }
        check_price(update.price)?;
        check_price(update.original_price.flatten())?;
        if let Some(Some(category_id)) = update.category_id {
            self.require_category(category_id).await?;
        }

        let updated = self
            .inner
            .repo
            .update_product(id, update)
            .await
            .map_err(|e| not_found_as(e, "product"))?;
        self.invalidate().await;
        Ok(updated)
    }

    /// Soft-delete: the product disappears from the catalog but stays
    /// resolvable by id so existing entitlements keep working.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if the product does not exist.
    pub async fn disable_product(&self, id: ProductId) -> Result<Product, CatalogError> {
        let product = self
            .update_product(
                id,
                ProductUpdate {
                    enabled: Some(false),
                    ..ProductUpdate::default()
                },
            )
            .await?;
        tracing::info!(product_id = %id, "Product disabled");
        Ok(product)
    }

    /// Count a product view without making the caller wait or fail.
    pub fn track_view(&self, id: ProductId) {
        let repo = Arc::clone(&self.inner.repo);
        tokio::spawn(async move {
            if let Err(e) = repo.increment_views(id).await {
                tracing::warn!(product_id = %id, error = %e, "Failed to record product view");
            }
        });
    }

    // =========================================================================
    // Categories
    // =========================================================================

    /// All categories, by name.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::Repository` if the query fails.
    pub async fn list_categories(&self) -> Result<Vec<Category>, CatalogError> {
        if let Some(CacheValue::Categories(categories)) =
            self.inner.cache.get(&CacheKey::Categories).await
        {
            debug!("Cache hit for categories");
            return Ok(categories);
        }

        let categories = self.inner.repo.list_categories().await?;
        self.inner
            .cache
            .insert(
                CacheKey::Categories,
                CacheValue::Categories(categories.clone()),
            )
            .await;
        Ok(categories)
    }

    /// A category by slug.
    ///
    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if no category has that slug.
    pub async fn get_category(&self, slug: &str) -> Result<Category, CatalogError> {
        let cache_key = CacheKey::Category(slug.to_owned());

        if let Some(CacheValue::Category(category)) = self.inner.cache.get(&cache_key).await {
            debug!("Cache hit for category");
            return Ok(*category);
        }

        let category = self
            .inner
            .repo
            .get_category_by_slug(slug)
            .await?
            .ok_or(CatalogError::NotFound("category"))?;

        self.inner
            .cache
            .insert(cache_key, CacheValue::Category(Box::new(category.clone())))
            .await;
        Ok(category)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::Conflict` for a taken slug.
    pub async fn create_category(&self, category: NewCategory) -> Result<Category, CatalogError> {
        if category.name.trim().is_empty() {
            return Err(CatalogError::Validation("name is required".to_owned()));
        }
        let created = self.inner.repo.create_category(category).await?;
        self.invalidate().await;
        Ok(created)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::NotFound` if the category does not exist.
    pub async fn update_category(
        &self,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> Result<Category, CatalogError> {
        let updated = self
            .inner
            .repo
            .update_category(id, update)
            .await
            .map_err(|e| not_found_as(e, "category"))?;
        self.invalidate().await;
        Ok(updated)
    }

    /// # Errors
    ///
    /// Returns `CatalogError::Conflict` while products still reference the
    /// category.
    pub async fn delete_category(&self, id: CategoryId) -> Result<(), CatalogError> {
        self.inner
            .repo
            .delete_category(id)
            .await
            .map_err(|e| not_found_as(e, "category"))?;
        self.invalidate().await;
        Ok(())
    }

    async fn require_category(&self, id: CategoryId) -> Result<(), CatalogError> {
        if self.inner.repo.get_category(id).await?.is_none() {
            return Err(CatalogError::Validation(format!("unknown category {id}")));
        }
        Ok(())
    }

    /// Number of cached catalog reads.
    #[must_use]
    pub fn cached_entries(&self) -> u64 {
        self.inner.cache.entry_count()
    }

    /// Clear every cached read.
    async fn invalidate(&self) {
        self.inner.cache.invalidate_all();
        self.inner.cache.run_pending_tasks().await;
    }
}

fn check_price(price: Option<Money>) -> Result<(), CatalogError> {
    match price {
        Some(price) if price > Money::MAX_PRICE => Err(CatalogError::Validation(format!(
            "price cannot exceed {}",
            Money::MAX_PRICE
        ))),
        _ => Ok(()),
    }
}

fn not_found_as(err: RepositoryError, what: &'static str) -> CatalogError {
    match err {
        RepositoryError::NotFound => CatalogError::NotFound(what),
        other => other.into(),
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::collections::BTreeMap;

    use checklistpro_core::Slug;

    use super::*;
    use crate::db::InMemoryStore;

    fn service() -> (Arc<InMemoryStore>, CatalogService) {
        let store = Arc::new(InMemoryStore::new());
        (store.clone(), CatalogService::new(store))
    }

    fn product(name: &str, category_id: Option<CategoryId>) -> NewProduct {
        NewProduct {
            name: name.to_owned(),
            slug: Slug::from_name(name),
            description: String::new(),
            price: Money::from_cents(1999),
            original_price: None,
            category_id,
            features: vec![],
            tags: vec![],
            formats: BTreeMap::new(),
        }
    }

    async fn category(service: &CatalogService, name: &str) -> Category {
        service
            .create_category(NewCategory {
                name: name.to_owned(),
                slug: Slug::from_name(name),
                description: String::new(),
                icon: String::new(),
            })
            .await
            .unwrap()
    }

    #[tokio::test]
    async fn test_list_by_category_slug_or_id() {
        let (_, service) = service();
        let retail = category(&service, "Retail").await;
        service
            .create_product(product("Shelf Audit", Some(retail.id)))
            .await
            .unwrap();
        service.create_product(product("Other", None)).await.unwrap();

        for reference in ["retail".to_owned(), retail.id.to_string()] {
            let page = service
                .list_products(ProductQuery {
                    category: Some(reference),
                    ..ProductQuery::default()
                })
                .await
                .unwrap();
            assert_eq!(page.total, 1);
        }

        let unknown = service
            .list_products(ProductQuery {
                category: Some("no-such-category".to_owned()),
                ..ProductQuery::default()
            })
            .await
            .unwrap();
        assert!(unknown.items.is_empty());
    }

    #[tokio::test]
    async fn test_disable_hides_from_catalog_and_clears_cache() {
        let (_, service) = service();
        let created = service.create_product(product("Audit", None)).await.unwrap();

        // Warm the cache
        service.get_product("audit").await.unwrap();
        service.disable_product(created.id).await.unwrap();

        assert!(matches!(
            service.get_product("audit").await,
            Err(CatalogError::NotFound("product"))
        ));
        assert!(!service.get_product_by_id(created.id).await.unwrap().enabled);
    }

    #[tokio::test]
    async fn test_create_product_with_unknown_category() {
        let (_, service) = service();
        assert!(matches!(
            service
                .create_product(product("Audit", Some(CategoryId::new(999))))
                .await,
            Err(CatalogError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_prices_above_column_range_are_rejected() {
        let (_, service) = service();
        let too_much = Money::new("100000000.00".parse().unwrap()).unwrap();

        let mut oversized = product("Audit", None);
        oversized.price = too_much;
        assert!(matches!(
            service.create_product(oversized).await,
            Err(CatalogError::Validation(_))
        ));

        let mut ceiling = product("Ceiling", None);
        ceiling.price = Money::MAX_PRICE;
        let created = service.create_product(ceiling).await.unwrap();

        let update = ProductUpdate {
            original_price: Some(Some(too_much)),
            ..ProductUpdate::default()
        };
        assert!(matches!(
            service.update_product(created.id, update).await,
            Err(CatalogError::Validation(_))
        ));
    }

    #[tokio::test]
    async fn test_track_view_is_fire_and_forget() {
        let (store, service) = service();
        let created = service.create_product(product("Audit", None)).await.unwrap();

        service.track_view(created.id);
        // Unknown products are logged, never surfaced
        service.track_view(ProductId::new(12345));

        for _ in 0..50 {
            tokio::task::yield_now().await;
        }
        let product = store.get_product(created.id).await.unwrap().unwrap();
        assert_eq!(product.view_count, 1);
    }
}
