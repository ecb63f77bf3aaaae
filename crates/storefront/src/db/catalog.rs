//! Catalog repository: products and categories.

use std::collections::BTreeMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sqlx::types::Json;
use sqlx::{PgPool, Postgres, QueryBuilder};

use checklistpro_core::{CategoryId, Money, ProductId, Slug};

use super::{RepositoryError, conflict_on_unique};
use crate::models::{
    Category, CategoryUpdate, NewCategory, NewProduct, Page, Product, ProductFilter, ProductSort,
    ProductUpdate, Rating,
};

/// Storage for the product catalog.
///
/// Lookups by id return disabled products too; listings and slug lookups do
/// not unless asked.
#[async_trait]
pub trait CatalogRepository: Send + Sync {
    async fn list_products(&self, filter: &ProductFilter) -> Result<Page<Product>, RepositoryError>;

    /// Enabled product by slug.
    async fn get_product_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError>;

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError>;

    /// Every product whose id is in `ids`, in no particular order.
    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError>;

    async fn create_product(&self, product: NewProduct) -> Result<Product, RepositoryError>;

    async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, RepositoryError>;

    /// Atomically add one to the view counter.
    async fn increment_views(&self, id: ProductId) -> Result<(), RepositoryError>;

    /// Atomically add one to the download counter.
    async fn increment_downloads(&self, id: ProductId) -> Result<(), RepositoryError>;

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError>;

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError>;

    async fn get_category_by_slug(&self, slug: &str) -> Result<Option<Category>, RepositoryError>;

    async fn create_category(&self, category: NewCategory) -> Result<Category, RepositoryError>;

    async fn update_category(
        &self,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> Result<Category, RepositoryError>;

    /// Returns `RepositoryError::Conflict` while any product references it.
    async fn delete_category(&self, id: CategoryId) -> Result<(), RepositoryError>;

    /// Cheap connectivity check for readiness checks.
    async fn ping(&self) -> Result<(), RepositoryError>;
}

// =============================================================================
// Row Types
// =============================================================================

const PRODUCT_COLUMNS: &str = "id, name, slug, description, price, original_price, category_id, \
     features, tags, formats, rating, download_count, view_count, enabled, created_at, updated_at";

const CATEGORY_SELECT: &str = "SELECT c.id, c.name, c.slug, c.description, c.icon, \
     (SELECT COUNT(*) FROM products p WHERE p.category_id = c.id AND p.enabled) AS product_count, \
     c.created_at, c.updated_at \
     FROM categories c";

#[derive(sqlx::FromRow)]
struct ProductRow {
    id: i32,
    name: String,
    slug: String,
    description: String,
    price: Decimal,
    original_price: Option<Decimal>,
    category_id: Option<i32>,
    features: Vec<String>,
    tags: Vec<String>,
    formats: Json<BTreeMap<String, String>>,
    rating: Json<Rating>,
    download_count: i64,
    view_count: i64,
    enabled: bool,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

fn money(value: Decimal, column: &str) -> Result<Money, RepositoryError> {
    Money::new(value)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid {column} in database: {e}")))
}

fn slug(value: &str) -> Result<Slug, RepositoryError> {
    Slug::parse(value)
        .map_err(|e| RepositoryError::DataCorruption(format!("invalid slug in database: {e}")))
}

impl TryFrom<ProductRow> for Product {
    type Error = RepositoryError;

    fn try_from(row: ProductRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: ProductId::new(row.id),
            slug: slug(&row.slug)?,
            name: row.name,
            description: row.description,
            price: money(row.price, "price")?,
            original_price: row
                .original_price
                .map(|p| money(p, "original_price"))
                .transpose()?,
            category_id: row.category_id.map(CategoryId::new),
            features: row.features,
            tags: row.tags,
            formats: row.formats.0,
            rating: row.rating.0,
            download_count: row.download_count,
            view_count: row.view_count,
            enabled: row.enabled,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

#[derive(sqlx::FromRow)]
struct CategoryRow {
    id: i32,
    name: String,
    slug: String,
    description: String,
    icon: String,
    product_count: i64,
    created_at: DateTime<Utc>,
    updated_at: DateTime<Utc>,
}

impl TryFrom<CategoryRow> for Category {
    type Error = RepositoryError;

    fn try_from(row: CategoryRow) -> Result<Self, Self::Error> {
        Ok(Self {
            id: CategoryId::new(row.id),
            slug: slug(&row.slug)?,
            name: row.name,
            description: row.description,
            icon: row.icon,
            product_count: row.product_count,
            created_at: row.created_at,
            updated_at: row.updated_at,
        })
    }
}

fn products_from_rows(rows: Vec<ProductRow>) -> Result<Vec<Product>, RepositoryError> {
    rows.into_iter().map(Product::try_from).collect()
}

/// Escape `%`, `_` and `\` for use inside an `ILIKE` pattern.
fn like_pattern(search: &str) -> String {
    let mut escaped = String::with_capacity(search.len() + 2);
    escaped.push('%');
    for c in search.chars() {
        if matches!(c, '%' | '_' | '\\') {
            escaped.push('\\');
        }
        escaped.push(c);
    }
    escaped.push('%');
    escaped
}

const fn order_by(sort: ProductSort) -> &'static str {
    match sort {
        ProductSort::Newest => "created_at DESC, id DESC",
        ProductSort::Popular => "download_count DESC, id DESC",
        ProductSort::PriceAsc => "price ASC, id ASC",
        ProductSort::PriceDesc => "price DESC, id DESC",
        ProductSort::Name => "name ASC, id ASC",
    }
}

fn push_product_filters(qb: &mut QueryBuilder<'_, Postgres>, filter: &ProductFilter) {
    qb.push(" WHERE TRUE");
    if !filter.include_disabled {
        qb.push(" AND enabled");
    }
    if let Some(category_id) = filter.category_id {
        qb.push(" AND category_id = ").push_bind(category_id.as_i32());
    }
    if let Some(search) = filter.search.as_deref() {
        let pattern = like_pattern(search);
        qb.push(" AND (name ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR description ILIKE ")
            .push_bind(pattern.clone())
            .push(" OR EXISTS (SELECT 1 FROM unnest(tags) AS tag WHERE tag ILIKE ")
            .push_bind(pattern)
            .push("))");
    }
}

// =============================================================================
// PostgreSQL
// =============================================================================

/// `PostgreSQL`-backed [`CatalogRepository`].
#[derive(Clone)]
pub struct PgCatalogRepository {
    pool: PgPool,
}

impl PgCatalogRepository {
    #[must_use]
    pub const fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    async fn increment(&self, column: &str, id: ProductId) -> Result<(), RepositoryError> {
        // Single-statement increment; concurrent callers never lose updates
        let sql = format!("UPDATE products SET {column} = {column} + 1 WHERE id = $1");
        let result = sqlx::query(&sql)
            .bind(id.as_i32())
            .execute(&self.pool)
            .await?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }
}

#[async_trait]
impl CatalogRepository for PgCatalogRepository {
    async fn list_products(&self, filter: &ProductFilter) -> Result<Page<Product>, RepositoryError> {
        let mut count = QueryBuilder::<Postgres>::new("SELECT COUNT(*) FROM products");
        push_product_filters(&mut count, filter);
        let total: i64 = count.build_query_scalar().fetch_one(&self.pool).await?;

        let mut query = QueryBuilder::<Postgres>::new(format!("SELECT {PRODUCT_COLUMNS} FROM products"));
        push_product_filters(&mut query, filter);
        query
            .push(" ORDER BY ")
            .push(order_by(filter.sort))
            .push(" LIMIT ")
            .push_bind(i64::from(filter.page.limit))
            .push(" OFFSET ")
            .push_bind(filter.page.offset());

        let rows = query
            .build_query_as::<ProductRow>()
            .fetch_all(&self.pool)
            .await?;

        Ok(Page::new(
            products_from_rows(rows)?,
            filter.page,
            u64::try_from(total).unwrap_or_default(),
        ))
    }

    async fn get_product_by_slug(&self, slug: &str) -> Result<Option<Product>, RepositoryError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE slug = $1 AND enabled");
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    async fn get_product(&self, id: ProductId) -> Result<Option<Product>, RepositoryError> {
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = $1");
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id.as_i32())
            .fetch_optional(&self.pool)
            .await?
            .map(Product::try_from)
            .transpose()
    }

    async fn get_products(&self, ids: &[ProductId]) -> Result<Vec<Product>, RepositoryError> {
        let ids: Vec<i32> = ids.iter().map(ProductId::as_i32).collect();
        let sql = format!("SELECT {PRODUCT_COLUMNS} FROM products WHERE id = ANY($1)");
        let rows = sqlx::query_as::<_, ProductRow>(&sql)
            .bind(&ids)
            .fetch_all(&self.pool)
            .await?;
        products_from_rows(rows)
    }

    async fn create_product(&self, product: NewProduct) -> Result<Product, RepositoryError> {
        let sql = format!(
            "INSERT INTO products \
                 (name, slug, description, price, original_price, category_id, features, tags, formats) \
             VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9) \
             RETURNING {PRODUCT_COLUMNS}"
        );
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(&product.name)
            .bind(product.slug.as_str())
            .bind(&product.description)
            .bind(product.price.amount())
            .bind(product.original_price.map(|p| p.amount()))
            .bind(product.category_id.map(|c| c.as_i32()))
            .bind(&product.features)
            .bind(&product.tags)
            .bind(Json(&product.formats))
            .fetch_one(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "product slug already exists"))?
            .try_into()
    }

    async fn update_product(
        &self,
        id: ProductId,
        update: ProductUpdate,
    ) -> Result<Product, RepositoryError> {
        // Nullable columns carry an explicit "was provided" flag so that
        // `Some(None)` clears them while `None` keeps them.
        let sql = format!(
            "UPDATE products SET \
                 name = COALESCE($2, name), \
                 slug = COALESCE($3, slug), \
                 description = COALESCE($4, description), \
                 price = COALESCE($5, price), \
                 original_price = CASE WHEN $6 THEN $7 ELSE original_price END, \
                 category_id = CASE WHEN $8 THEN $9 ELSE category_id END, \
                 features = COALESCE($10, features), \
                 tags = COALESCE($11, tags), \
                 formats = COALESCE($12, formats), \
                 enabled = COALESCE($13, enabled), \
                 updated_at = now() \
             WHERE id = $1 \
             RETURNING {PRODUCT_COLUMNS}"
        );
        sqlx::query_as::<_, ProductRow>(&sql)
            .bind(id.as_i32())
            .bind(update.name)
            .bind(update.slug.map(String::from))
            .bind(update.description)
            .bind(update.price.map(|p| p.amount()))
            .bind(update.original_price.is_some())
            .bind(update.original_price.flatten().map(|p| p.amount()))
            .bind(update.category_id.is_some())
            .bind(update.category_id.flatten().map(|c| c.as_i32()))
            .bind(update.features)
            .bind(update.tags)
            .bind(update.formats.map(Json))
            .bind(update.enabled)
            .fetch_optional(&self.pool)
            .await
            .map_err(|e| conflict_on_unique(e, "product slug already exists"))?
            .ok_or(RepositoryError::NotFound)?
            .try_into()
    }

    async fn increment_views(&self, id: ProductId) -> Result<(), RepositoryError> {
        self.increment("view_count", id).await
    }

    async fn increment_downloads(&self, id: ProductId) -> Result<(), RepositoryError> {
        self.increment("download_count", id).await
    }

    async fn list_categories(&self) -> Result<Vec<Category>, RepositoryError> {
        let sql = format!("{CATEGORY_SELECT} ORDER BY c.name ASC");
        sqlx::query_as::<_, CategoryRow>(&sql)
            .fetch_all(&self.pool)
            .await?
            .into_iter()
            .map(Category::try_from)
            .collect()
    }

    async fn get_category(&self, id: CategoryId) -> Result<Option<Category>, RepositoryError> {
        let sql = format!("{CATEGORY_SELECT} WHERE c.id = $1");
        sqlx::query_as::<_, CategoryRow>(&sql)
            .bind(id.as_i32())
            .fetch_optional(&self.pool)
            .await?
            .map(Category::try_from)
            .transpose()
    }

    async fn get_category_by_slug(&self, slug: &str) -> Result<Option<Category>, RepositoryError> {
        let sql = format!("{CATEGORY_SELECT} WHERE c.slug = $1");
        sqlx::query_as::<_, CategoryRow>(&sql)
            .bind(slug)
            .fetch_optional(&self.pool)
            .await?
            .map(Category::try_from)
            .transpose()
    }

    async fn create_category(&self, category: NewCategory) -> Result<Category, RepositoryError> {
        let id: i32 = sqlx::query_scalar(
            "INSERT INTO categories (name, slug, description, icon) \
             VALUES ($1, $2, $3, $4) RETURNING id",
        )
        .bind(&category.name)
        .bind(category.slug.as_str())
        .bind(&category.description)
        .bind(&category.icon)
        .fetch_one(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "category slug already exists"))?;

        self.get_category(CategoryId::new(id))
            .await?
            .ok_or(RepositoryError::NotFound)
    }

    async fn update_category(
        &self,
        id: CategoryId,
        update: CategoryUpdate,
    ) -> Result<Category, RepositoryError> {
        let result = sqlx::query(
            "UPDATE categories SET \
                 name = COALESCE($2, name), \
                 slug = COALESCE($3, slug), \
                 description = COALESCE($4, description), \
                 icon = COALESCE($5, icon), \
                 updated_at = now() \
             WHERE id = $1",
        )
        .bind(id.as_i32())
        .bind(update.name)
        .bind(update.slug.map(String::from))
        .bind(update.description)
        .bind(update.icon)
        .execute(&self.pool)
        .await
        .map_err(|e| conflict_on_unique(e, "category slug already exists"))?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }

        self.get_category(id).await?.ok_or(RepositoryError::NotFound)
    }

    async fn delete_category(&self, id: CategoryId) -> Result<(), RepositoryError> {
        let result = sqlx::query("DELETE FROM categories WHERE id = $1")
            .bind(id.as_i32())
            .execute(&self.pool)
            .await
            .map_err(|e| {
                if let sqlx::Error::Database(ref db_err) = e
                    && db_err.is_foreign_key_violation()
                {
                    return RepositoryError::Conflict(
                        "category still has products".to_owned(),
                    );
                }
                RepositoryError::Database(e)
            })?;

        if result.rows_affected() == 0 {
            return Err(RepositoryError::NotFound);
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), RepositoryError> {
        sqlx::query("SELECT 1").execute(&self.pool).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_like_pattern_escapes_wildcards() {
        assert_eq!(like_pattern("haccp"), "%haccp%");
        assert_eq!(like_pattern("100%_done\\"), "%100\\%\\_done\\\\%");
    }

    #[test]
    fn test_order_by_is_deterministic() {
        for sort in [
            ProductSort::Newest,
            ProductSort::Popular,
            ProductSort::PriceAsc,
            ProductSort::PriceDesc,
            ProductSort::Name,
        ] {
            assert!(order_by(sort).contains("id"));
        }
    }
}
